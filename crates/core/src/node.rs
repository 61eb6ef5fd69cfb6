use crate::context::ShutdownContext;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Type-erased shutdown action.
pub type BoxedAction = Box<dyn FnOnce(ShutdownContext) -> BoxFuture<'static, ()> + Send>;

/// Erase the concrete closure and future types of an action.
pub fn boxed_action<F, Fut>(action: F) -> BoxedAction
where
    F: FnOnce(ShutdownContext) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move |ctx| action(ctx).boxed())
}

/// One shutdown action inside an execution plan.
///
/// Nodes address each other by their index in the plan. `dependents` must
/// all finish before this node's action runs; `dependencies` are released
/// once it has.
pub(crate) struct Node {
    name: String,
    action: Mutex<Option<BoxedAction>>,
    dependencies: Vec<usize>,
    dependents: Vec<usize>,
    pending_dependents: AtomicUsize,
    released: Notify,
    launched: AtomicBool,
    ran: AtomicBool,
}

impl Node {
    pub(crate) fn new(
        name: String,
        action: BoxedAction,
        dependencies: Vec<usize>,
        dependents: Vec<usize>,
    ) -> Self {
        let pending = dependents.len();
        Self {
            name,
            action: Mutex::new(Some(action)),
            dependencies,
            dependents,
            pending_dependents: AtomicUsize::new(pending),
            released: Notify::new(),
            launched: AtomicBool::new(false),
            ran: AtomicBool::new(false),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_root(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub(crate) fn pending_dependents(&self) -> usize {
        self.pending_dependents.load(Ordering::Acquire)
    }

    /// Spawn the run of `nodes[index]` unless some path already launched it.
    pub(crate) fn launch(
        nodes: &Arc<Vec<Node>>,
        index: usize,
        ctx: ShutdownContext,
    ) -> Option<JoinHandle<()>> {
        if nodes[index].launched.swap(true, Ordering::AcqRel) {
            return None;
        }

        tracing::trace!(node = %nodes[index].name(), "launching shutdown node");

        Some(tokio::spawn(Node::run(Arc::clone(nodes), index, ctx)))
    }

    /// Fan out to every dependent, wait for all of them, run the action,
    /// then release every dependency.
    fn run(nodes: Arc<Vec<Node>>, index: usize, ctx: ShutdownContext) -> BoxFuture<'static, ()> {
        async move {
            let node = &nodes[index];

            for &dependent in &node.dependents {
                // Detached: completion is observed through the countdown.
                let _ = Node::launch(&nodes, dependent, ctx.clone());
            }

            node.wait_for_dependents().await;
            node.execute(ctx).await;

            for &dependency in &node.dependencies {
                nodes[dependency].release_one();
            }
        }
        .boxed()
    }

    async fn wait_for_dependents(&self) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending_dependents() == 0 {
                return;
            }

            notified.await;
        }
    }

    async fn execute(&self, ctx: ShutdownContext) {
        if self
            .ran
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let action = self
            .action
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(action) = action else {
            return;
        };

        tracing::debug!(node = %self.name, "running shutdown action");
        let started = Instant::now();

        if let Err(panic) = AssertUnwindSafe(action(ctx)).catch_unwind().await {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(node = %self.name, panic = %message, "shutdown action panicked");
        }

        tracing::debug!(
            node = %self.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "shutdown action finished"
        );
    }

    fn release_one(&self) {
        let previous = self.pending_dependents.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "node {} released too many times", self.name);

        if previous == 1 {
            self.released.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn context() -> ShutdownContext {
        ShutdownContext::with_timeout(Duration::from_secs(5)).0
    }

    fn counting(counter: &Arc<AtomicUsize>) -> BoxedAction {
        let counter = Arc::clone(counter);
        boxed_action(move |_ctx| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_launch_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let nodes = Arc::new(vec![Node::new(
            "db".into(),
            counting(&counter),
            vec![],
            vec![],
        )]);

        let first = Node::launch(&nodes, 0, context()).unwrap();
        assert!(Node::launch(&nodes, 0, context()).is_none());
        first.await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_parent_waits_for_child() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let record = |name: &'static str| {
            let order = Arc::clone(&order);
            boxed_action(move |_ctx| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                order.lock().unwrap().push(name);
            })
        };

        // index 0 = parent, index 1 = child depending on it
        let nodes = Arc::new(vec![
            Node::new("parent".into(), record("parent"), vec![], vec![1]),
            Node::new("child".into(), record("child"), vec![0], vec![]),
        ]);
        assert_eq!(nodes[0].pending_dependents(), 1);
        assert!(nodes[0].is_root());
        assert!(!nodes[1].is_root());

        Node::launch(&nodes, 0, context()).unwrap().await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["child", "parent"]);
        assert_eq!(nodes[0].pending_dependents(), 0);
    }

    #[tokio::test]
    async fn test_panicking_action_still_releases_parent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let nodes = Arc::new(vec![
            Node::new("parent".into(), counting(&counter), vec![], vec![1]),
            Node::new(
                "child".into(),
                boxed_action(|_ctx| async { panic!("boom") }),
                vec![0],
                vec![],
            ),
        ]);

        Node::launch(&nodes, 0, context()).unwrap().await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(nodes[1].name(), "child");
    }
}
