//! Test utilities for Portward
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use portward::observer::SessionObserver;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;

/// Spawn a UDP echo server on an ephemeral loopback port
pub async fn spawn_udp_echo() -> (SocketAddr, JoinHandle<()>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        loop {
            let (n, peer) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(_) => return,
            };
            let _ = socket.send_to(&buf[..n], peer).await;
        }
    });

    (addr, handle)
}

/// Spawn a TCP echo server on an ephemeral loopback port
pub async fn spawn_tcp_echo() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });

    (addr, handle)
}

/// Session observer that counts lifecycle events
#[derive(Debug, Default)]
pub struct CountingObserver {
    /// Number of connect events delivered
    pub connects: AtomicUsize,
    /// Number of disconnect events delivered
    pub disconnects: AtomicUsize,
}

#[async_trait::async_trait]
impl SessionObserver for CountingObserver {
    async fn on_connect(&self, _identity: &str) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_disconnect(&self, _identity: &str) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Test configuration builder
pub struct TestConfigBuilder {
    listen_addr: String,
    forward_addr: String,
    idle_timeout_secs: u64,
    max_pending_dials: usize,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        TestConfigBuilder {
            listen_addr: "127.0.0.1:0".to_string(),
            forward_addr: "127.0.0.1:13659".to_string(),
            idle_timeout_secs: 300,
            max_pending_dials: 64,
        }
    }
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listen address
    pub fn listen_addr(mut self, addr: &str) -> Self {
        self.listen_addr = addr.to_string();
        self
    }

    /// Set the forward address
    pub fn forward_addr(mut self, addr: &str) -> Self {
        self.forward_addr = addr.to_string();
        self
    }

    /// Set the UDP session idle timeout
    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    /// Set the concurrent upstream dial cap
    pub fn max_pending_dials(mut self, cap: usize) -> Self {
        self.max_pending_dials = cap;
        self
    }

    /// Build the configuration
    pub fn build(self) -> portward::config::Config {
        portward::config::Config {
            forwarder: portward::config::ForwarderConfig {
                listen_addr: self.listen_addr,
                forward_addr: self.forward_addr,
                udp: portward::config::UdpConfig {
                    idle_timeout_secs: self.idle_timeout_secs,
                    max_pending_dials: self.max_pending_dials,
                },
                tcp: portward::config::TcpConfig::default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_udp_echo() {
        let (addr, server) = spawn_udp_echo().await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"ping", addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from, addr);

        server.abort();
    }

    #[tokio::test]
    async fn test_spawn_tcp_echo() {
        let (addr, server) = spawn_tcp_echo().await;

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"hello").await.unwrap();

        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        server.abort();
    }

    #[test]
    fn test_config_builder() {
        let config = TestConfigBuilder::new()
            .listen_addr("127.0.0.1:18000")
            .forward_addr("127.0.0.1:18001")
            .idle_timeout_secs(5)
            .max_pending_dials(8)
            .build();

        assert_eq!(config.forwarder.listen_addr, "127.0.0.1:18000");
        assert_eq!(config.forwarder.forward_addr, "127.0.0.1:18001");
        assert_eq!(config.forwarder.udp.idle_timeout_secs, 5);
        assert_eq!(config.forwarder.udp.max_pending_dials, 8);
    }
}
