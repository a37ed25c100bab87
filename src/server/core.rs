use log::{error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::config::ServerConfig;
use crate::protocol::responses::{SERVICE_UNAVAILABLE, format_response};
use crate::server::session::ClientSession;

pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    active_clients: Arc<AtomicUsize>,
}

/// Decrements the client count when a session ends, however it ends.
struct ClientSlot(Arc<AtomicUsize>);

impl Drop for ClientSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Server {
    /// Binds the control port and makes sure the server root exists.
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let socket = config.control_socket();
        let listener = match TcpListener::bind(&socket).await {
            Ok(listener) => {
                info!("Server bound to {}", listener.local_addr()?);
                listener
            }
            Err(e) => {
                error!("Failed to bind to {}: {}", socket, e);
                return Err(e);
            }
        };

        if let Err(e) = std::fs::create_dir_all(&config.server_root) {
            warn!("Failed to create server root directory: {}", e);
        } else {
            info!("Server root directory: {}", config.server_root);
        }

        Ok(Self {
            listener,
            config: Arc::new(config),
            active_clients: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn active_clients(&self) -> usize {
        self.active_clients.load(Ordering::SeqCst)
    }

    /// Accepts clients until the task is dropped.
    pub async fn run(&self) -> io::Result<()> {
        info!(
            "Starting netftp server on {} (max {} clients)",
            self.local_addr()?,
            self.config.max_clients
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let config = Arc::clone(&self.config);
                    let active = Arc::clone(&self.active_clients);

                    // Spawn a task for each client so accept loop doesn't block
                    tokio::spawn(async move {
                        if let Err(e) = handle_new_client(stream, addr, config, active).await {
                            warn!("Failed to handle client {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

/// Admits a client (or turns it away with 421) and serves it on the
/// blocking pool.
async fn handle_new_client(
    mut stream: TcpStream,
    addr: SocketAddr,
    config: Arc<ServerConfig>,
    active: Arc<AtomicUsize>,
) -> io::Result<()> {
    // 1. Capacity
    let count = active.fetch_add(1, Ordering::SeqCst) + 1;
    let slot = ClientSlot(active);
    if count > config.max_clients {
        warn!("Rejecting {}: {} clients connected", addr, count - 1);
        let reply = format_response(SERVICE_UNAVAILABLE, "Too many connections. Try again later.");
        stream.write_all(reply.as_bytes()).await?;
        stream.flush().await?;
        return Ok(());
    }
    info!("New client {} ({}/{} clients)", addr, count, config.max_clients);

    // 2. Sessions are synchronous: hand the socket to a blocking thread
    let stream = stream.into_std()?;
    stream.set_nonblocking(false)?;

    let joined = tokio::task::spawn_blocking(move || {
        let _slot = slot;
        ClientSession::new(stream, config)?.run()
    })
    .await;

    match joined {
        Ok(result) => result,
        Err(e) => Err(io::Error::other(e)),
    }
}
