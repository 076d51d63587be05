//! Common test helpers for castline tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - [`MockConnector`]: a scripted in-process transport with a call log
//! - [`MockObsServer`]: a real WebSocket server speaking obs-websocket 5.x

use std::time::{Duration, Instant};

pub mod mock_connector;
pub mod obs_server;

pub use mock_connector::{MockConnection, MockConnector, MockReceiver, MockReply};
pub use obs_server::{MockObsServer, ObsServerConfig, ServerResponse};

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Port Allocation
// ============================================================================

/// Find an available TCP port for testing
pub async fn find_available_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// A `ws://` URL on a port nothing listens on
pub async fn unreachable_url() -> String {
    format!("ws://127.0.0.1:{}", find_available_port().await)
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Wait for a synchronous predicate with the default interval
pub async fn wait_until<F>(check: F, max_wait: Duration) -> bool
where
    F: Fn() -> bool,
{
    wait_for(|| std::future::ready(check()), DEFAULT_CHECK_INTERVAL, max_wait).await
}
