//! Forwarder orchestration
//!
//! Builds the TCP and UDP halves from configuration and runs them
//! concurrently. The halves are independent once started: one of them
//! failing mid-stream leaves the other running. Only a shutdown signal,
//! or both halves being gone, ends the forwarder.

pub mod addr;
pub mod tcp;
pub mod udp;

pub use addr::ForwardAddr;
pub use tcp::{SocketOpts, TcpForwarder};
pub use udp::UdpForwarder;

use crate::config::{Config, ForwarderConfig};
use crate::error::PortwardError;
use crate::observer::{LogObserver, SessionObserver};
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinError;
use tracing::{error, info};

/// Run the forwarder with the given configuration
///
/// Convenience entry point used by the binary: binds both listeners,
/// attaches the logging observer and runs until shutdown.
pub async fn run_forwarder(config: Config, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let forwarder = Forwarder::new(&config.forwarder)
        .await?
        .with_observer(Arc::new(LogObserver));

    forwarder.run(shutdown_rx).await
}

/// Combined TCP and UDP forwarder
pub struct Forwarder {
    tcp: TcpForwarder,
    udp: UdpForwarder,
}

impl Forwarder {
    /// Validate the configuration and bind both listeners
    ///
    /// Either bind failing aborts startup.
    pub async fn new(config: &ForwarderConfig) -> Result<Self> {
        config.validate().map_err(PortwardError::Config)?;

        let forward_addr = ForwardAddr::new(&config.forward_addr);
        let socket_opts = SocketOpts::from_tcp_config(&config.tcp);

        let tcp =
            TcpForwarder::bind(&config.listen_addr, forward_addr.clone(), socket_opts).await?;
        let udp = UdpForwarder::bind(&config.listen_addr, forward_addr, &config.udp).await?;

        Ok(Forwarder { tcp, udp })
    }

    /// Attach a session observer to the UDP half
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.udp = self.udp.with_observer(observer);
        self
    }

    /// Local address of the TCP listener
    pub fn tcp_local_addr(&self) -> Result<SocketAddr> {
        self.tcp.local_addr()
    }

    /// Local address of the UDP listener
    pub fn udp_local_addr(&self) -> Result<SocketAddr> {
        self.udp.local_addr()
    }

    /// Run both halves until shutdown
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        let tcp = Arc::new(self.tcp);
        let udp = Arc::new(self.udp);

        let mut tcp_task = tokio::spawn(tcp.run());
        let mut udp_task = tokio::spawn(udp.clone().run());

        let mut tcp_done = false;
        let mut udp_done = false;

        loop {
            tokio::select! {
                result = &mut tcp_task, if !tcp_done => {
                    tcp_done = true;
                    log_half_exit("TCP", result);
                }
                result = &mut udp_task, if !udp_done => {
                    udp_done = true;
                    log_half_exit("UDP", result);
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping forwarder");
                    break;
                }
            }

            if tcp_done && udp_done {
                udp.shutdown();
                anyhow::bail!("All forwarder listeners terminated");
            }
        }

        udp.shutdown();
        if !tcp_done {
            tcp_task.abort();
        }
        if !udp_done {
            udp_task.abort();
        }

        info!("Forwarder stopped");
        Ok(())
    }
}

fn log_half_exit(name: &str, result: Result<Result<()>, JoinError>) {
    match result {
        Ok(Ok(())) => info!("{} forwarder terminated", name),
        Ok(Err(e)) => error!("{} forwarder failed: {:#}", name, e),
        Err(e) => error!("{} forwarder task panicked: {}", name, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TcpConfig, UdpConfig};
    use std::time::Duration;

    fn ephemeral_config() -> ForwarderConfig {
        ForwarderConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            forward_addr: "127.0.0.1:13659".to_string(),
            udp: UdpConfig::default(),
            tcp: TcpConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_new_binds_both_listeners() {
        let forwarder = Forwarder::new(&ephemeral_config()).await.unwrap();
        assert_ne!(forwarder.tcp_local_addr().unwrap().port(), 0);
        assert_ne!(forwarder.udp_local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let config = ForwarderConfig {
            listen_addr: String::new(),
            ..ephemeral_config()
        };
        assert!(Forwarder::new(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal() {
        let forwarder = Forwarder::new(&ephemeral_config()).await.unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(forwarder.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("forwarder should stop on signal")
            .unwrap();
        assert!(result.is_ok());
    }
}
