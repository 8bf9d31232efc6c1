use clap::Parser;
use shared::{Command, ParseError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Relays stdin lines to the server and prints every server line.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:4321")]
    server: String,
    /// Username sent when the server asks to register
    #[clap(short, long)]
    username: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    println!("Connected to {}", stream.peer_addr()?);
    let (read_half, mut write_half) = stream.into_split();

    let mut server_lines = BufReader::new(read_half).lines();
    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = server_lines.next_line() => {
                let Some(line) = line? else {
                    println!("Server closed the connection");
                    break;
                };
                println!("< {}", line);

                if line == "REGISTER" {
                    if let Some(name) = &args.username {
                        write_half.write_all(format!("USERNAME {}\n", name).as_bytes()).await?;
                    }
                }
            },

            line = stdin_lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                // Usage hints locally; unknown keywords still go through.
                if let Err(err @ ParseError::Usage(_)) = Command::parse(&line) {
                    println!("! {}", err);
                    continue;
                }
                write_half.write_all(format!("{}\n", line).as_bytes()).await?;
            },
        }
    }

    Ok(())
}
