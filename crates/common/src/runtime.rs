use std::{future::Future, sync::OnceLock};

use tokio::{runtime::Handle, task::JoinHandle};

static RUNTIME: OnceLock<Handle> = OnceLock::new();

/// Registers the current runtime so tasks can be spawned from threads that don't own one.
/// Must be called from within the main runtime
pub fn init_runtime() {
    let _ = RUNTIME.set(Handle::current());
}

pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match RUNTIME.get() {
        Some(handle) => handle.spawn(future),
        None => tokio::spawn(future),
    }
}
