//! Process-wide shared [`Shutdown`].
//!
//! Prefer constructing a [`Shutdown`] and passing it to the components that
//! register actions. This facade exists for call sites that cannot be handed
//! one. It has an explicit lifecycle: nothing works before [`init_global`],
//! and [`reset_global`] detaches the shared instance again.

use crate::config::ShutdownConfig;
use crate::context::ShutdownContext;
use crate::error::{Result, ShutdownError};
use crate::shutdown::{Shutdown, ShutdownOutcome};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::task::JoinHandle;

static GLOBAL: RwLock<Option<Arc<Shutdown>>> = RwLock::new(None);

/// Install a fresh shared instance, replacing any previous one.
pub fn init_global(config: ShutdownConfig) -> Arc<Shutdown> {
    let shutdown = Arc::new(Shutdown::with_config(config));
    *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&shutdown));

    tracing::debug!(timeout_ms = shutdown.timeout().as_millis() as u64, "global shutdown initialized");
    shutdown
}

/// Detach the shared instance and return it.
pub fn reset_global() -> Option<Arc<Shutdown>> {
    GLOBAL.write().unwrap_or_else(PoisonError::into_inner).take()
}

/// The shared instance.
pub fn global() -> Result<Arc<Shutdown>> {
    GLOBAL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(ShutdownError::NotInitialized)
}

/// See [`Shutdown::add`].
pub fn add<F, Fut>(name: impl Into<String>, action: F, dependencies: &[&str]) -> Result<()>
where
    F: FnOnce(ShutdownContext) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    global()?.add(name, action, dependencies)
}

/// See [`Shutdown::must_add`]. Also panics if the shared instance is missing.
pub fn must_add<F, Fut>(name: impl Into<String>, action: F, dependencies: &[&str])
where
    F: FnOnce(ShutdownContext) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = add(name, action, dependencies) {
        panic!("failed to register shutdown action: {}", e);
    }
}

pub fn node_names() -> Result<BTreeSet<String>> {
    Ok(global()?.node_names())
}

pub async fn trigger() -> Result<()> {
    global()?.trigger().await;
    Ok(())
}

pub async fn wait() -> Result<ShutdownOutcome> {
    Ok(global()?.wait().await)
}

pub fn force_stop() -> Result<()> {
    global()?.force_stop();
    Ok(())
}

pub fn listen_for_signals() -> Result<JoinHandle<()>> {
    global()?.listen_for_signals()
}
