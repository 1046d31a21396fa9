//! # Portward - TCP/UDP Port Forwarder
//!
//! Portward forwards traffic arriving on a local address to a fixed remote
//! destination, for both TCP and UDP. The TCP path is a plain byte pipe.
//! The UDP path emulates sessions over the sessionless transport: each
//! distinct client address gets its own upstream socket and replies are
//! routed back to the right client through the shared listener socket.
//! Sessions idle past a timeout are reclaimed.
//!
//! ## Features
//!
//! - **Dual Transport**: TCP and UDP forwarding on the same listen address
//! - **UDP Session Emulation**: Per-client upstream sockets with reply routing
//! - **Idle Reclamation**: A janitor task evicts sessions after inactivity
//! - **Lifecycle Hooks**: Observer trait for session connect/disconnect events
//! - **Loopback Aware**: Loopback destinations are dialed from loopback
//!
//! ## Usage
//!
//! ```rust,ignore
//! use portward::config::load_config;
//! use portward::forwarder::run_forwarder;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_forwarder(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! One UDP listener socket serves every client. The first datagram from a
//! new source address registers a session and its dispatch task becomes the
//! session's relay worker, opening the upstream socket and owning the
//! return direction. Later datagrams from the same source are forwarded
//! over the established session.
//!
//! ```text
//! Client -> Portward listener -> per-session upstream socket -> Destination
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod forwarder;
pub mod observer;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::PortwardError;
pub use forwarder::{run_forwarder, Forwarder};
pub use observer::SessionObserver;

/// Version of the Portward library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
