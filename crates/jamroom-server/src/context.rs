use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use jamroom_store::SessionDirectory;

use crate::config::ServerConfig;
use crate::gateway::ConnectionGateway;
use crate::relay::{RelayConfig, SignalingRelay};

/// Service context built once at startup and handed to every handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub directory: SessionDirectory,
    pub gateway: Arc<ConnectionGateway>,
    pub relay: Arc<SignalingRelay>,
    /// Cancelled when the server begins shutting down.
    pub shutdown: CancellationToken,
}

impl AppContext {
    pub fn new(config: ServerConfig, relay_config: RelayConfig, directory: SessionDirectory) -> Self {
        let gateway = Arc::new(ConnectionGateway::new(config.send_queue_capacity()));
        let relay = Arc::new(SignalingRelay::new(Arc::clone(&gateway), relay_config));
        Self {
            config: Arc::new(config),
            directory,
            gateway,
            relay,
            shutdown: CancellationToken::new(),
        }
    }
}
