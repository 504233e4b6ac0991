//! Task executor metrics.

use metrics::{Counter, Gauge};

/// Spawned and running task counts, labelled by `kind`.
#[derive(Clone, Debug)]
pub(crate) struct TaskExecutorMetrics {
    critical: KindMetrics,
    regular: KindMetrics,
}

#[derive(Clone, Debug)]
struct KindMetrics {
    spawned: Counter,
    running: Gauge,
}

impl KindMetrics {
    fn new(kind: &'static str) -> Self {
        Self {
            spawned: metrics::counter!("tasks.spawned_total", "kind" => kind),
            running: metrics::gauge!("tasks.running", "kind" => kind),
        }
    }

    fn start(&self) -> RunningTask {
        self.spawned.increment(1);
        self.running.increment(1.0);
        RunningTask(self.running.clone())
    }
}

impl Default for TaskExecutorMetrics {
    fn default() -> Self {
        Self {
            critical: KindMetrics::new("critical"),
            regular: KindMetrics::new("regular"),
        }
    }
}

impl TaskExecutorMetrics {
    pub(crate) fn critical_task(&self) -> RunningTask {
        self.critical.start()
    }

    pub(crate) fn regular_task(&self) -> RunningTask {
        self.regular.start()
    }
}

/// Held by a spawned task. Decrements the running gauge when the task ends,
/// including by panic or abort.
#[derive(Debug)]
pub(crate) struct RunningTask(Gauge);

impl Drop for RunningTask {
    fn drop(&mut self) {
        self.0.decrement(1.0);
    }
}
