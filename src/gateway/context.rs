//! Cancellation and deadline propagation for gateway calls.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Context carried into a command send.
///
/// Clones share the same cancellation state, so one task can cancel a call
/// another task is awaiting. A deadline bounds a single send attempt; it is
/// not a retry budget.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Duration>,
}

impl CallContext {
    /// A context with no deadline and no cancellation.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose send must complete within `deadline`.
    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// The deadline bound, if any.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Cancel the context; any in-flight call observing it is aborted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the context is cancelled.
    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_context_is_not_cancelled() {
        let ctx = CallContext::background();
        assert!(!ctx.is_cancelled());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn clones_share_cancellation() {
        let ctx = CallContext::with_deadline(Duration::from_secs(5));
        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.deadline(), Some(Duration::from_secs(5)));
    }
}
