use std::sync::Mutex;
use std::time::Duration;

/// Delayed re-checks requested while reconciling one orchestrator
///
/// Steps that are waiting on an external deadline (a pod's termination
/// grace period) ask for a later reconcile here instead of returning an
/// error. The reconcile outcome turns the shortest request into
/// `Action::requeue`.
#[derive(Debug, Default)]
pub struct Requeue {
    delays: Mutex<Vec<Duration>>,
}

impl Requeue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_after(&self, delay: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(delay);
        }
    }

    /// Shortest requested delay, if any
    pub fn shortest(&self) -> Option<Duration> {
        self.delays
            .lock()
            .ok()
            .and_then(|delays| delays.iter().min().copied())
    }

    pub fn requested(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|delays| delays.clone())
            .unwrap_or_default()
    }
}
