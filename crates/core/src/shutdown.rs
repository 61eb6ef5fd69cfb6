use crate::config::ShutdownConfig;
use crate::context::ShutdownContext;
use crate::error::{Result, ShutdownError};
use crate::graph::DependencyGraph;
use crate::node::{boxed_action, Node};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a [`Shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Accepting registrations.
    Building,
    /// The walk is running; `deadline` is when `wait` gives up.
    Started { deadline: Instant },
    /// Every action has returned.
    Done,
}

/// What a caller of [`Shutdown::wait`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Completed,
    TimedOut,
    ForceStopped,
}

impl ShutdownOutcome {
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Completed => Ok(()),
            Self::TimedOut => Err(ShutdownError::Timeout),
            Self::ForceStopped => Err(ShutdownError::ForceStopped),
        }
    }
}

/// Keeps track of the application's close/shutdown dependencies and runs
/// them in dependency order exactly once.
pub struct Shutdown {
    config: ShutdownConfig,
    graph: Mutex<Option<DependencyGraph>>,
    triggered: AtomicBool,
    phase: Arc<watch::Sender<Phase>>,
    force_stop: CancellationToken,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Create an orchestrator with the default 5 second timeout.
    pub fn new() -> Self {
        Self::with_config(ShutdownConfig::default())
    }

    pub fn with_config(config: ShutdownConfig) -> Self {
        let (phase, _) = watch::channel(Phase::Building);

        Self {
            config,
            graph: Mutex::new(Some(DependencyGraph::new())),
            triggered: AtomicBool::new(false),
            phase: Arc::new(phase),
            force_stop: CancellationToken::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Register a shutdown action.
    ///
    /// `dependencies` name nodes that must already be registered; this action
    /// runs before any of them. Fails with [`ShutdownError::NodeExists`],
    /// [`ShutdownError::NodeNotFound`], or [`ShutdownError::AlreadyStarted`]
    /// once [`Shutdown::trigger`] has taken the graph.
    pub fn add<F, Fut>(&self, name: impl Into<String>, action: F, dependencies: &[&str]) -> Result<()>
    where
        F: FnOnce(ShutdownContext) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let mut graph = self.lock_graph();
        let graph = graph.as_mut().ok_or(ShutdownError::AlreadyStarted)?;

        graph.add(name.clone(), boxed_action(action), dependencies)?;
        tracing::debug!(node = %name, ?dependencies, "registered shutdown action");

        Ok(())
    }

    /// Like [`Shutdown::add`], but panics on a registration error.
    pub fn must_add<F, Fut>(&self, name: impl Into<String>, action: F, dependencies: &[&str])
    where
        F: FnOnce(ShutdownContext) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Err(e) = self.add(name, action, dependencies) {
            panic!("failed to register shutdown action: {}", e);
        }
    }

    /// Names of every registered node. Empty once the walk has started.
    pub fn node_names(&self) -> BTreeSet<String> {
        self.lock_graph()
            .as_ref()
            .map(DependencyGraph::names)
            .unwrap_or_default()
    }

    /// Declared parents of `name`; `None` if unknown or the walk has started.
    pub fn dependencies(&self, name: &str) -> Option<BTreeSet<String>> {
        self.lock_graph().as_ref()?.dependencies(name)
    }

    /// Nodes that named `name` as a parent and so close before it.
    pub fn dependents(&self, name: &str) -> Option<BTreeSet<String>> {
        self.lock_graph().as_ref()?.dependents(name)
    }

    /// Nodes registered without parents. They run last.
    pub fn roots(&self) -> BTreeSet<String> {
        self.lock_graph()
            .as_ref()
            .map(DependencyGraph::roots)
            .unwrap_or_default()
    }

    /// Run every registered action in dependency order.
    ///
    /// Only the first call starts the walk. Every call returns once it has
    /// finished, regardless of the configured timeout.
    pub async fn trigger(&self) {
        self.begin();

        let mut phase = self.phase.subscribe();
        let _ = phase.wait_for(|p| *p == Phase::Done).await;
    }

    /// Start the walk without waiting for it. No-op after the first call.
    pub(crate) fn begin(&self) {
        if !self.triggered.swap(true, Ordering::AcqRel) {
            self.start();
        }
    }

    fn start(&self) {
        let timeout = self.config.timeout();
        let (ctx, expiry) = ShutdownContext::with_timeout(timeout);

        // Last read of the graph; later registrations are rejected.
        let graph = self.lock_graph().take().unwrap_or_default();

        tracing::info!(
            nodes = graph.len(),
            timeout_ms = timeout.as_millis() as u64,
            "graceful shutdown started"
        );
        self.phase.send_replace(Phase::Started {
            deadline: ctx.deadline(),
        });
        let nodes = Arc::new(graph.into_nodes());

        let phase = Arc::clone(&self.phase);
        tokio::spawn(async move {
            let started = Instant::now();

            let handles: Vec<_> = nodes
                .iter()
                .enumerate()
                .filter(|(_, node)| node.is_root())
                .filter_map(|(index, _)| Node::launch(&nodes, index, ctx.clone()))
                .collect();

            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "shutdown branch failed");
                }
            }

            expiry.cancel();
            drop(nodes);

            tracing::info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "graceful shutdown finished"
            );
            phase.send_replace(Phase::Done);
        });
    }

    /// Wait for a triggered shutdown to finish, time out, or be forced.
    ///
    /// Blocks until [`Shutdown::trigger`] has been called. Timing out or
    /// being forced leaves in-flight actions running.
    pub async fn wait(&self) -> ShutdownOutcome {
        let mut phase = self.phase.subscribe();

        let current = phase
            .wait_for(|p| *p != Phase::Building)
            .await
            .map(|p| *p)
            .unwrap_or(Phase::Done);

        let deadline = match current {
            Phase::Started { deadline } => deadline,
            _ => return ShutdownOutcome::Completed,
        };

        let outcome = tokio::select! {
            biased;
            _ = phase.wait_for(|p| *p == Phase::Done) => ShutdownOutcome::Completed,
            _ = self.force_stop.cancelled() => ShutdownOutcome::ForceStopped,
            _ = tokio::time::sleep_until(deadline) => ShutdownOutcome::TimedOut,
        };

        match outcome {
            ShutdownOutcome::Completed => tracing::debug!("shutdown wait completed"),
            ShutdownOutcome::TimedOut => tracing::warn!(
                timeout_ms = self.config.timeout_ms,
                "graceful shutdown timed out, actions may still be running"
            ),
            ShutdownOutcome::ForceStopped => {
                tracing::warn!("graceful shutdown force stopped, actions may still be running")
            }
        }

        outcome
    }

    /// Report [`ShutdownOutcome::ForceStopped`] to every current and later
    /// [`Shutdown::wait`] on a running walk.
    ///
    /// Ignored before [`Shutdown::trigger`]: only a request that arrives
    /// while the walk is running forces a stop. A walk that already finished
    /// still reports [`ShutdownOutcome::Completed`].
    pub fn force_stop(&self) {
        if !self.triggered.load(Ordering::Acquire) {
            tracing::debug!("force stop ignored, shutdown not started");
            return;
        }

        self.force_stop.cancel();
    }

    fn lock_graph(&self) -> MutexGuard<'_, Option<DependencyGraph>> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
