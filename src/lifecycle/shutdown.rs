//! Shutdown coordination for the supervisor.

use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Wraps the root cancellation token that all long-running tasks derive
/// their own tokens from.
#[derive(Debug, Clone)]
pub struct Shutdown {
    root: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
        }
    }

    /// The root token itself.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// A child token, cancelled with the root but cancellable on its own.
    pub fn subscribe(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.root.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.root.is_cancelled()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
