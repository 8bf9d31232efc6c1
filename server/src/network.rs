//! Server network layer handling TCP connections and line dispatch

use crate::client_manager::ClientId;
use crate::config::ServerConfig;
use crate::dispatcher::ServerState;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    LineReceived { client_id: ClientId, line: String },
    ClientDisconnected { client_id: ClientId },
}

/// Main server owning the listener and all session and game state
pub struct Server {
    listener: TcpListener,
    state: ServerState,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(config.addr()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            state: ServerState::new(config),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Registers an accepted stream and spawns its reader and writer tasks
    fn handle_accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        let (read_half, write_half) = stream.into_split();
        let (line_tx, line_rx) = mpsc::unbounded_channel();

        let Some(client_id) = self.state.handle_connect(addr, line_tx) else {
            warn!("Refusing connection from {}: server full", addr);
            return;
        };

        tokio::spawn(Self::run_writer(client_id, write_half, line_rx));
        let reader = tokio::spawn(Self::run_reader(
            client_id,
            read_half,
            self.state.config().max_line_len,
            self.server_tx.clone(),
        ));
        self.state.attach_reader(client_id, reader.abort_handle());
    }

    /// Turns socket input into line events until end-of-stream or an error
    async fn run_reader(
        client_id: ClientId,
        read_half: OwnedReadHalf,
        max_line_len: usize,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        let mut reader = BufReader::new(read_half);

        loop {
            match read_line(&mut reader, max_line_len).await {
                Ok(Some(line)) => {
                    if server_tx
                        .send(ServerMessage::LineReceived { client_id, line })
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Client {} closed its connection", client_id);
                    break;
                }
                Err(e) => {
                    debug!("Read error from client {}: {}", client_id, e);
                    break;
                }
            }
        }

        if let Err(e) = server_tx.send(ServerMessage::ClientDisconnected { client_id }) {
            error!("Failed to report disconnect of client {}: {}", client_id, e);
        }
    }

    /// Writes queued lines until the queue closes, then shuts the socket down
    async fn run_writer(
        client_id: ClientId,
        mut write_half: OwnedWriteHalf,
        mut line_rx: mpsc::UnboundedReceiver<String>,
    ) {
        while let Some(line) = line_rx.recv().await {
            let mut data = line.into_bytes();
            data.push(b'\n');
            if let Err(e) = write_half.write_all(&data).await {
                debug!("Write error to client {}: {}", client_id, e);
                return;
            }
        }

        if let Err(e) = write_half.shutdown().await {
            debug!("Failed to shut down client {} socket: {}", client_id, e);
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Server started successfully");

        loop {
            tokio::select! {
                // Accept only while below capacity
                accepted = self.listener.accept(), if self.state.has_capacity() => {
                    match accepted {
                        Ok((stream, addr)) => self.handle_accept(stream, addr),
                        Err(e) => warn!("Failed to accept connection: {}", e),
                    }
                },

                // Handle connection events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::LineReceived { client_id, line }) => {
                            self.state.handle_line(client_id, &line);
                        },
                        Some(ServerMessage::ClientDisconnected { client_id }) => {
                            self.state.handle_disconnect(client_id);
                        },
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

/// Reads one newline-terminated line of at most `max_len` bytes. A longer
/// line is cut at `max_len` and its remainder read as the next line. Returns
/// None at end-of-stream.
pub async fn read_line<R>(reader: &mut R, max_len: usize) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buffer = Vec::new();
    let read = (&mut *reader)
        .take(max_len as u64)
        .read_until(b'\n', &mut buffer)
        .await?;
    if read == 0 {
        return Ok(None);
    }

    while matches!(buffer.last(), Some(b'\n' | b'\r')) {
        buffer.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buffer).into_owned()))
}
