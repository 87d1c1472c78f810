//! SigV4 Relay Library
//!
//! Authenticating re-signing proxy for S3-compatible storage.
//!
//! # Features
//!
//! - **SigV4 Verification**: Header and presigned-URL signatures, checked in constant time
//! - **Re-signing**: Verified requests are signed again for the backend endpoint
//! - **Streaming Uploads**: `aws-chunked` bodies are decoded before forwarding
//! - **HEAD Adaptation**: Works around backends that refuse `HEAD` for some file types
//!
//! # Example
//!
//! ```no_run
//! use sigv4_relay::{config::Config, server::ProxyServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = ProxyServer::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod chunked;
pub mod config;
pub mod forward;
pub mod proxy;
pub mod server;
pub mod signing;

// Re-export commonly used types
pub use config::Config;
pub use proxy::{ErrorKind, ProxyError, SigV4Proxy};
pub use server::ProxyServer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
