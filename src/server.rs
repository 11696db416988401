use std::{io::Result, net::SocketAddr};

use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
};

use crate::{
    handshake::upgrade_limited,
    http::Request,
    hub::{self, Hub, HubHandle},
    ws,
};

/// Transport of every connection accepted by [`WebSocketServer`].
pub type ServerTransport = BufReader<TcpStream>;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub port: u16,
    /// Pending hub events before producers wait.
    pub hub_capacity: usize,
    /// Largest accepted frame payload, bounded only by `usize` when `None`.
    pub max_payload: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1".to_owned(),
            port: 8888,
            hub_capacity: hub::DEFAULT_CAPACITY,
            max_payload: Some(crate::DEFAULT_MAX_PAYLOAD),
        }
    }
}

pub struct WebSocketServer {
    listener: TcpListener,
    config: ServerConfig,
}

impl WebSocketServer {
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind((config.addr.as_str(), config.port)).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening");
        Ok(Self { listener, config })
    }

    pub fn addr(&self) -> Result<SocketAddr> { self.listener.local_addr() }

    /// Starts a hub and accepts connections forever.
    pub async fn run(self) -> Result<()> {
        let hub = Hub::spawn(self.config.hub_capacity);
        self.run_with(hub).await
    }

    /// Accepts connections forever, wiring each one through `hub`.
    pub async fn run_with(self, hub: HubHandle<ServerTransport>) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(x) => x,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept connection");
                    continue;
                }
            };
            tracing::debug!(%peer, "accepted");
            tokio::spawn(handle_stream(stream, hub.clone(), self.config.max_payload));
        }
    }
}

async fn handle_stream(
    stream: TcpStream,
    hub: HubHandle<ServerTransport>,
    max_payload: Option<usize>,
) {
    let mut request = match Request::read(stream).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read request");
            return;
        }
    };

    match upgrade_limited(&mut request, max_payload).await {
        Ok(conn) => ws::serve(conn, hub).await,
        Err(e) => {
            tracing::warn!(error = %e, path = request.path(), "websocket upgrade failed");
            if let Err(e) = request.reject(&e).await {
                tracing::debug!(error = %e, "failed to send rejection");
            }
        }
    }
}
