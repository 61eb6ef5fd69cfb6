//! Error types for shutdown registration and execution.

/// Result type for shutdown operations.
pub type Result<T> = std::result::Result<T, ShutdownError>;

/// Errors surfaced by the shutdown graph.
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// A node with this name is already registered.
    #[error("node already exists: {0}")]
    NodeExists(String),

    /// A declared dependency has not been registered yet.
    #[error("parent node not found: {0}")]
    NodeNotFound(String),

    /// The graph was already handed to the executor.
    #[error("shutdown already started, registration rejected")]
    AlreadyStarted,

    /// The walk did not finish within the configured timeout.
    #[error("shutdown timeout stopped")]
    Timeout,

    /// A second termination request arrived while waiting.
    #[error("shutdown force stopped")]
    ForceStopped,

    /// The shared instance was used before `init_global`.
    #[error("global shutdown is not initialized")]
    NotInitialized,

    /// Installing an OS signal handler failed.
    #[error("signal handler error: {0}")]
    Signal(#[from] std::io::Error),
}
