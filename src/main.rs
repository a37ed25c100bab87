//! netftpd - Entry Point
//!
//! FTP server speaking RFC 959 with the RFC 2428/1639 address extensions.

use log::{error, info};

use netftp::config::{DEFAULT_CONFIG_PATH, ServerConfig};
use netftp::server::Server;

#[tokio::main]
async fn main() {
    // Initialize the logger (env_logger picks up RUST_LOG environment variable)
    env_logger::init();

    let config = match ServerConfig::load(DEFAULT_CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    info!("Launching FTP server...");

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Server startup failed: {}", e);
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down ({} clients connected)", server.active_clients());
        }
    }
}
