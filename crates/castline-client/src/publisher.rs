//! Observable session state
//!
//! One writer (the session manager), any number of subscribers. Subscribers
//! see the latest value; rapid intermediate states may be coalesced.

use castline_core::SessionState;
use std::time::Duration;
use tokio::sync::watch;

/// Write side of the published [`SessionState`]
#[derive(Debug)]
pub struct StatePublisher {
    tx: watch::Sender<SessionState>,
}

impl StatePublisher {
    /// Starts out `Disconnected`
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Disconnected);
        Self { tx }
    }

    /// Returns whether the value changed; subscribers are only woken if so
    pub(crate) fn publish(&self, state: SessionState) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        })
    }

    pub fn current(&self) -> SessionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> StateSubscriber {
        StateSubscriber {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for StatePublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only handle on the published [`SessionState`]
#[derive(Debug, Clone)]
pub struct StateSubscriber {
    rx: watch::Receiver<SessionState>,
}

impl StateSubscriber {
    pub fn current(&self) -> SessionState {
        *self.rx.borrow()
    }

    /// Wait for the next change. `None` once the publisher is gone.
    pub async fn changed(&mut self) -> Option<SessionState> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// Wait until the published state equals `target`
    pub async fn wait_for_state(&mut self, target: SessionState, max_wait: Duration) -> bool {
        matches!(
            tokio::time::timeout(max_wait, self.rx.wait_for(|s| *s == target)).await,
            Ok(Ok(_))
        )
    }
}
