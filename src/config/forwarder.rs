//! Forwarder configuration types
//!
//! Defines the main configuration structures for the port forwarder.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default listen address
fn default_listen_addr() -> String {
    "0.0.0.0:13658".to_string()
}

/// Default forward address
fn default_forward_addr() -> String {
    "127.0.0.1:13659".to_string()
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Forwarder configuration
    #[serde(default)]
    pub forwarder: ForwarderConfig,
}

/// Forwarder configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ForwarderConfig {
    /// Local address to listen on (e.g., "0.0.0.0:13658")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Destination address to forward to (e.g., "127.0.0.1:13659")
    #[serde(default = "default_forward_addr")]
    pub forward_addr: String,

    /// UDP session configuration
    #[serde(default)]
    pub udp: UdpConfig,

    /// TCP socket configuration
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        ForwarderConfig {
            listen_addr: default_listen_addr(),
            forward_addr: default_forward_addr(),
            udp: UdpConfig::default(),
            tcp: TcpConfig::default(),
        }
    }
}

impl ForwarderConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.is_empty() {
            return Err("listen_addr must not be empty".to_string());
        }
        if self.forward_addr.is_empty() {
            return Err("forward_addr must not be empty".to_string());
        }
        if self.udp.idle_timeout_secs == 0 {
            return Err("udp.idle_timeout_secs must be greater than zero".to_string());
        }
        if self.udp.max_pending_dials == 0 {
            return Err("udp.max_pending_dials must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Default UDP session idle timeout in seconds
fn default_idle_timeout_secs() -> u64 {
    300
}

/// Default cap on concurrent upstream dials
fn default_max_pending_dials() -> usize {
    64
}

/// UDP session configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UdpConfig {
    /// Seconds of inactivity after which a session is evicted
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Maximum number of upstream sockets being opened at once
    #[serde(default = "default_max_pending_dials")]
    pub max_pending_dials: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        UdpConfig {
            idle_timeout_secs: default_idle_timeout_secs(),
            max_pending_dials: default_max_pending_dials(),
        }
    }
}

impl UdpConfig {
    /// Idle timeout as a [`Duration`]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Default keepalive seconds
fn default_keepalive_secs() -> u64 {
    20
}

/// Default keepalive interval
fn default_keepalive_interval() -> u64 {
    8
}

/// TCP socket configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TcpConfig {
    /// Enable TCP_NODELAY
    #[serde(default)]
    pub nodelay: bool,

    /// TCP keepalive timeout in seconds
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// TCP keepalive interval in seconds
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            nodelay: true,
            keepalive_secs: default_keepalive_secs(),
            keepalive_interval: default_keepalive_interval(),
        }
    }
}
