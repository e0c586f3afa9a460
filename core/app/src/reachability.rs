//! Network reachability probing.
//!
//! Reachability only shapes user-facing messages. It never gates a sync
//! pass or a cloud write; those simply fail and are reconciled later.

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::config::ReachabilityConfig;

/// Tells whether the network is currently available.
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Probes reachability by opening a TCP connection.
#[derive(Debug, Clone)]
pub struct TcpReachability {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpReachability {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    pub fn from_config(config: &ReachabilityConfig) -> Self {
        Self::new(
            config.host.clone(),
            config.port,
            Duration::from_millis(config.timeout_ms),
        )
    }
}

#[async_trait]
impl Reachability for TcpReachability {
    async fn is_reachable(&self) -> bool {
        let address = (self.host.as_str(), self.port);
        let reachable = matches!(
            timeout(self.timeout, TcpStream::connect(address)).await,
            Ok(Ok(_))
        );
        debug!("Reachability {}:{}: {}", self.host, self.port, reachable);
        reachable
    }
}

/// Fixed answer, for tests and offline demos.
#[derive(Debug, Clone, Copy)]
pub struct StaticReachability(pub bool);

#[async_trait]
impl Reachability for StaticReachability {
    async fn is_reachable(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_probe_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpReachability::new("127.0.0.1", port, Duration::from_secs(2));
        assert!(probe.is_reachable().await);
    }

    #[tokio::test]
    async fn test_tcp_probe_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TcpReachability::new("127.0.0.1", port, Duration::from_secs(2));
        assert!(!probe.is_reachable().await);
    }
}
