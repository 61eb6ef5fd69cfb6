//! Termination signal handling.
//!
//! The first termination request triggers the shutdown walk; every later one
//! while the walk is running force-stops the waiter.
//!
//! On Unix, SIGINT and SIGTERM are handled. Elsewhere only Ctrl-C is.

use crate::error::Result;
use crate::shutdown::Shutdown;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A stream of termination requests.
#[async_trait]
pub trait SignalSource: Send + 'static {
    /// Wait for the next request. `None` means the source is closed.
    async fn recv(&mut self) -> Option<String>;
}

/// Process termination signals.
pub struct OsSignals {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl OsSignals {
    /// Install the handlers. Must be called from within a Tokio runtime.
    #[cfg(unix)]
    pub fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn new() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn next_signal(&mut self) -> Option<String> {
        tokio::select! {
            received = self.sigint.recv() => received.map(|_| "SIGINT".to_string()),
            received = self.sigterm.recv() => received.map(|_| "SIGTERM".to_string()),
        }
    }

    #[cfg(not(unix))]
    async fn next_signal(&mut self) -> Option<String> {
        tokio::signal::ctrl_c().await.ok().map(|_| "ctrl-c".to_string())
    }
}

#[async_trait]
impl SignalSource for OsSignals {
    async fn recv(&mut self) -> Option<String> {
        self.next_signal().await
    }
}

/// Lets tests and in-process callers (an admin endpoint, a supervisor)
/// stand in for OS signals.
#[async_trait]
impl SignalSource for mpsc::UnboundedReceiver<String> {
    async fn recv(&mut self) -> Option<String> {
        mpsc::UnboundedReceiver::recv(self).await
    }
}

impl Shutdown {
    /// Trigger on the first SIGINT/SIGTERM, force stop on any later one.
    pub fn listen_for_signals(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        let signals = OsSignals::new()?;
        Ok(self.listen(signals))
    }

    /// Drive this orchestrator from an arbitrary [`SignalSource`].
    pub fn listen<S: SignalSource>(self: &Arc<Self>, mut source: S) -> JoinHandle<()> {
        let shutdown = Arc::clone(self);

        tokio::spawn(async move {
            let Some(signal) = source.recv().await else {
                return;
            };
            tracing::info!(%signal, "termination requested, starting graceful shutdown");

            shutdown.begin();

            while let Some(signal) = source.recv().await {
                tracing::warn!(%signal, "termination requested again, forcing stop");
                shutdown.force_stop();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShutdownConfig;
    use crate::shutdown::{Phase, ShutdownOutcome};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_first_signal_triggers() {
        let shutdown = Arc::new(Shutdown::new());
        let ran = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&ran);
        shutdown.must_add(
            "server",
            move |_ctx| async move { flag.store(true, Ordering::SeqCst) },
            &[],
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let _listener = shutdown.listen(rx);
        tx.send("SIGTERM".to_string()).unwrap();

        assert_eq!(shutdown.wait().await, ShutdownOutcome::Completed);
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(shutdown.phase(), Phase::Done);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_signal_forces_stop() {
        let shutdown = Arc::new(Shutdown::with_config(
            ShutdownConfig::default().with_timeout(Duration::from_secs(10)),
        ));
        shutdown.must_add(
            "slow",
            |_ctx| async { tokio::time::sleep(Duration::from_secs(5)).await },
            &[],
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let _listener = shutdown.listen(rx);
        tx.send("SIGINT".to_string()).unwrap();

        let sender = tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            sender.send("SIGINT".to_string()).unwrap();
        });

        assert_eq!(shutdown.wait().await, ShutdownOutcome::ForceStopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_back_to_back_signals_force_stop() {
        let shutdown = Arc::new(Shutdown::new());
        shutdown.must_add(
            "slow",
            |_ctx| async { tokio::time::sleep(Duration::from_secs(2)).await },
            &[],
        );

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("SIGINT".to_string()).unwrap();
        tx.send("SIGINT".to_string()).unwrap();
        let _listener = shutdown.listen(rx);

        assert_eq!(shutdown.wait().await, ShutdownOutcome::ForceStopped);
    }

    #[tokio::test]
    async fn test_closed_source_never_triggers() {
        let shutdown = Arc::new(Shutdown::new());

        let (tx, rx) = mpsc::unbounded_channel::<String>();
        drop(tx);
        shutdown.listen(rx).await.unwrap();

        assert_eq!(shutdown.phase(), Phase::Building);
    }
}
