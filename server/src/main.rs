use clap::Parser;
use log::info;
use server::config::{ServerConfig, DEFAULT_MAX_CLIENTS, DEFAULT_PORT, DEFAULT_SAVE_DIR};
use server::network::Server;
use std::path::PathBuf;

/// Main-method of the application.
/// Parses command-line arguments, then runs the server until it stops or Ctrl+C.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Maximum number of connected clients
        #[clap(short, long, default_value_t = DEFAULT_MAX_CLIENTS)]
        max_clients: usize,
        /// Directory saved games are written to
        #[clap(short, long, default_value = DEFAULT_SAVE_DIR)]
        save_dir: PathBuf,
    }

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        max_clients: args.max_clients,
        save_dir: args.save_dir,
        ..ServerConfig::default()
    };

    let mut server = Server::new(config).await?;

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
