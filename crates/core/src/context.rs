//! Deadline context handed to every shutdown action.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Advisory deadline for a shutdown action.
///
/// The executor never aborts an action that ignores it. Actions that do
/// bounded work (draining a listener, flushing a buffer) should race their
/// work against [`ShutdownContext::expired`].
#[derive(Debug, Clone)]
pub struct ShutdownContext {
    deadline: Instant,
    token: CancellationToken,
}

impl ShutdownContext {
    pub(crate) fn new(deadline: Instant, token: CancellationToken) -> Self {
        Self { deadline, token }
    }

    /// Build a context that expires `timeout` from now. Must be called from
    /// within a Tokio runtime.
    ///
    /// The returned token is cancelled once the deadline passes; cancel it
    /// earlier to release any action still waiting on [`Self::expired`].
    pub fn with_timeout(timeout: Duration) -> (Self, CancellationToken) {
        let deadline = Instant::now() + timeout;
        let token = CancellationToken::new();

        let timer = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => timer.cancel(),
                _ = timer.cancelled() => {}
            }
        });

        (Self::new(deadline, token.clone()), token)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Resolves when the deadline passes or the shutdown walk has ended.
    pub async fn expired(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep_until(self.deadline) => {}
        }
    }
}
