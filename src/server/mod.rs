//! HTTP server module
//!
//! Accepts connections with `hyper` on `tokio` and runs every request through
//! the shared [`SigV4Proxy`].
//!
//! # Example
//!
//! ```no_run
//! use sigv4_relay::config::Config;
//! use sigv4_relay::server::ProxyServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let server = ProxyServer::new(config).await?;
//! println!("Listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{Config, ConfigError};
use crate::forward::RequestForwarder;
use crate::proxy::SigV4Proxy;
use crate::signing::{CredentialsError, SigningSecret};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

pub mod dispatch;
pub mod error_response;

pub use dispatch::handle_request;
pub use error_response::{error_response, ErrorBody};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credentials error: {0}")]
    Credentials(#[from] CredentialsError),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// SigV4 re-signing proxy server
pub struct ProxyServer {
    proxy: Arc<SigV4Proxy>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ProxyServer {
    /// Build the proxy from `config` and bind the listener.
    ///
    /// Port 0 lets the OS pick; see [`ProxyServer::local_addr`].
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let addr = config.server.socket_addr()?;
        let secret = Arc::new(SigningSecret::from_config(&config.credentials)?);
        let forwarder = RequestForwarder::from_config(&config)?;

        info!(
            backend = %forwarder.endpoint(),
            service = %forwarder.service(),
            strict_chunk_framing = config.proxy.strict_chunk_framing,
            "Proxy configured"
        );

        Self::bind(addr, SigV4Proxy::new(secret, forwarder)).await
    }

    /// Bind `addr` for an already built proxy
    pub async fn bind(addr: SocketAddr, proxy: SigV4Proxy) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);

        Ok(Self {
            proxy: Arc::new(proxy),
            listener,
            local_addr,
        })
    }

    /// Address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `shutdown` completes.
    ///
    /// Each connection runs in its own task; connections already accepted
    /// are left to finish.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!("Starting proxy server on {}", self.local_addr);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    info!("Shutting down server");
                    return Ok(());
                }
            };

            let proxy = Arc::clone(&self.proxy);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let proxy = Arc::clone(&proxy);
                    async move { handle_request(req, proxy).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, CredentialsConfig, ProxyConfig, ServerConfig};

    fn test_config() -> Config {
        Config {
            server: ServerConfig {
                address: "127.0.0.1:0".into(),
            },
            backend: BackendConfig {
                endpoint: "http://127.0.0.1:9000".into(),
                service: "s3".into(),
                timeout_seconds: 5,
            },
            credentials: CredentialsConfig {
                access_key_id: "AKID".into(),
                secret_access_key: "secret".into(),
            },
            proxy: ProxyConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_server_binds_ephemeral_port() {
        let server = ProxyServer::new(test_config()).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_server_invalid_address() {
        let mut config = test_config();
        config.server.address = "invalid".into();
        let result = ProxyServer::new(config).await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_server_rejects_empty_credentials() {
        let mut config = test_config();
        config.credentials.secret_access_key = String::new();
        let result = ProxyServer::new(config).await;
        assert!(matches!(result, Err(ServerError::Credentials(_))));
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let server = ProxyServer::new(test_config()).await.unwrap();
        server.run_until(async {}).await.unwrap();
    }
}
