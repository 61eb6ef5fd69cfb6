// Dependency-ordered graceful shutdown for Hush

pub mod config;
pub mod context;
pub mod error;
pub mod global;
mod graph;
mod node;
pub mod shutdown;
pub mod signals;

pub use config::ShutdownConfig;
pub use context::ShutdownContext;
pub use error::{Result, ShutdownError};
pub use node::{boxed_action, BoxedAction};
pub use shutdown::{Phase, Shutdown, ShutdownOutcome};
pub use signals::{OsSignals, SignalSource};
