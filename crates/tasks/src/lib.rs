//! Task spawning with a shared shutdown signal and critical-task panic reporting.
//!
//! A [`TaskManager`] owns the shutdown [`Signal`] and receives panics from tasks
//! spawned with [`TaskExecutor::spawn_critical`]. Executors are cheap to clone and
//! hand out the paired [`Shutdown`] future to long-running loops.

mod metrics;
pub mod shutdown;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::metrics::TaskExecutorMetrics;
pub use crate::shutdown::{Shutdown, Signal, signal};

/// A critical task panicked.
#[derive(Debug, thiserror::Error)]
#[error("critical task `{task_name}` panicked: `{error}`")]
pub struct PanickedTaskError {
    task_name: &'static str,
    error: String,
}

impl PanickedTaskError {
    fn new(task_name: &'static str, error: Box<dyn Any + Send>) -> Self {
        let error = match error.downcast::<String>() {
            Ok(msg) => *msg,
            Err(error) => match error.downcast::<&str>() {
                Ok(msg) => (*msg).to_string(),
                Err(_) => "unknown panic payload".to_string(),
            },
        };
        Self { task_name, error }
    }

    pub fn task_name(&self) -> &'static str {
        self.task_name
    }
}

/// Owns the shutdown signal. Dropping the manager fires it.
#[derive(Debug)]
pub struct TaskManager {
    handle: Handle,
    panicked_tasks_tx: mpsc::UnboundedSender<PanickedTaskError>,
    panicked_tasks_rx: mpsc::UnboundedReceiver<PanickedTaskError>,
    signal: Option<Signal>,
    on_shutdown: Shutdown,
}

impl TaskManager {
    /// Create a manager bound to the current tokio runtime.
    ///
    /// Panics when called outside a runtime, like [`Handle::current`].
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn new(handle: Handle) -> Self {
        let (panicked_tasks_tx, panicked_tasks_rx) = mpsc::unbounded_channel();
        let (signal, on_shutdown) = signal();
        Self {
            handle,
            panicked_tasks_tx,
            panicked_tasks_rx,
            signal: Some(signal),
            on_shutdown,
        }
    }

    pub fn executor(&self) -> TaskExecutor {
        TaskExecutor {
            handle: self.handle.clone(),
            on_shutdown: self.on_shutdown.clone(),
            panicked_tasks_tx: self.panicked_tasks_tx.clone(),
            metrics: TaskExecutorMetrics::default(),
        }
    }

    /// Fire the shutdown signal. Subsequent calls are no-ops.
    pub fn fire_shutdown(&mut self) {
        if let Some(signal) = self.signal.take() {
            debug!("firing shutdown signal");
            signal.fire();
        }
    }

    /// Resolves with the first critical task panic.
    pub async fn wait_for_critical_panic(&mut self) -> Option<PanickedTaskError> {
        self.panicked_tasks_rx.recv().await
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.fire_shutdown();
    }
}

/// Spawns tasks onto the runtime and hands out the shutdown signal.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    handle: Handle,
    on_shutdown: Shutdown,
    panicked_tasks_tx: mpsc::UnboundedSender<PanickedTaskError>,
    metrics: TaskExecutorMetrics,
}

impl TaskExecutor {
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn on_shutdown_signal(&self) -> &Shutdown {
        &self.on_shutdown
    }

    /// Spawn a regular task. Its panic only ends the task itself.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let running = self.metrics.regular_task();
        self.handle.spawn(async move {
            let _running = running;
            fut.await
        })
    }

    /// Spawn a task whose panic is reported to the [`TaskManager`].
    pub fn spawn_critical<F>(&self, name: &'static str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let panicked_tasks_tx = self.panicked_tasks_tx.clone();
        let running = self.metrics.critical_task();
        self.handle.spawn(async move {
            let _running = running;
            if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
                let err = PanickedTaskError::new(name, panic);
                error!(task = name, error = %err.error, "critical task panicked");
                let _ = panicked_tasks_tx.send(err);
            }
        })
    }
}
