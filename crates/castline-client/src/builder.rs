//! Session manager builder

use crate::classifier::{Classifier, VendorClassifier};
use crate::session::SessionManager;
use castline_transport::{Connector, WebSocketConnector};
use std::sync::Arc;
use std::time::Duration;

/// Tunables for a [`SessionManager`]
///
/// Nothing is bounded by default: a call that never completes keeps its
/// caller waiting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deadline for each request, including the version query
    pub request_timeout: Option<Duration>,
    /// Deadline for each connect attempt, fallback included separately
    pub connect_timeout: Option<Duration>,
}

/// Builder for [`SessionManager`]
pub struct SessionManagerBuilder<C: Connector = WebSocketConnector> {
    connector: C,
    config: SessionConfig,
    classifier: Arc<dyn Classifier>,
}

impl SessionManagerBuilder<WebSocketConnector> {
    /// Create a new builder over obs-websocket
    pub fn new() -> Self {
        Self::with_connector(WebSocketConnector::new())
    }
}

impl Default for SessionManagerBuilder<WebSocketConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> SessionManagerBuilder<C> {
    pub fn with_connector(connector: C) -> Self {
        Self {
            connector,
            config: SessionConfig::default(),
            classifier: Arc::new(VendorClassifier::default()),
        }
    }

    /// Swap the transport
    pub fn connector<D: Connector>(self, connector: D) -> SessionManagerBuilder<D> {
        SessionManagerBuilder {
            connector,
            config: self.config,
            classifier: self.classifier,
        }
    }

    /// Set per-request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Set per-attempt connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the vendor-string heuristic
    pub fn classifier<K: Classifier + 'static>(mut self, classifier: K) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn build(self) -> SessionManager<C> {
        SessionManager::from_parts(self.connector, self.config, self.classifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_unbounded() {
        let config = SessionConfig::default();
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.connect_timeout, None);
    }

    #[test]
    fn test_builder_sets_timeouts() {
        let manager = SessionManagerBuilder::new()
            .request_timeout(Duration::from_secs(2))
            .connect_timeout(Duration::from_secs(5))
            .build();

        assert_eq!(manager.config().request_timeout, Some(Duration::from_secs(2)));
        assert_eq!(manager.config().connect_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_config_replaces_both() {
        let manager = SessionManagerBuilder::new()
            .request_timeout(Duration::from_secs(2))
            .config(SessionConfig {
                request_timeout: None,
                connect_timeout: Some(Duration::from_millis(250)),
            })
            .build();

        assert_eq!(manager.config().request_timeout, None);
        assert_eq!(
            manager.config().connect_timeout,
            Some(Duration::from_millis(250))
        );
    }
}
