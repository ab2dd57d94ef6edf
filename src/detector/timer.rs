use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use thiserror::Error;
use tokio::{runtime::Handle, task::JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("timer service unavailable: {0}")]
    Unavailable(String),
    #[error("failed to cancel timer {id:?}: {reason}")]
    CancelFailed { id: TimerId, reason: String },
}

pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Deferred, cancellable callbacks. The detector keeps at most one
/// outstanding timer per channel.
pub trait TimerService: Send + Sync {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<TimerId, TimerError>;
    fn cancel(&self, id: TimerId) -> Result<(), TimerError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Runs each timer as a sleeping task on the ambient tokio runtime.
#[derive(Default)]
pub struct TokioTimerService {
    next_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<TimerId, JoinHandle<()>>>>,
}

impl TokioTimerService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        lock(&self.tasks).len()
    }
}

impl TimerService for TokioTimerService {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<TimerId, TimerError> {
        let runtime = Handle::try_current().map_err(|err| TimerError::Unavailable(err.to_string()))?;
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let tasks = Arc::clone(&self.tasks);

        // Hold the map while spawning so the task cannot deregister before it is recorded.
        let mut guard = lock(&self.tasks);
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            lock(&tasks).remove(&id);
            callback();
        });
        guard.insert(id, handle);
        Ok(id)
    }

    fn cancel(&self, id: TimerId) -> Result<(), TimerError> {
        if let Some(handle) = lock(&self.tasks).remove(&id) {
            handle.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod manual {
    use super::*;

    #[derive(Default)]
    struct ManualState {
        next_id: u64,
        pending: Vec<(TimerId, Duration, TimerCallback)>,
        cancelled: Vec<(TimerId, TimerCallback)>,
    }

    /// Timer double: nothing fires until the test says so.
    #[derive(Default)]
    pub(crate) struct ManualTimerService {
        state: Mutex<ManualState>,
        fail_schedule: bool,
        fail_cancel: bool,
    }

    impl ManualTimerService {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn failing_schedule() -> Self {
            Self {
                fail_schedule: true,
                ..Self::default()
            }
        }

        pub(crate) fn failing_cancel() -> Self {
            Self {
                fail_cancel: true,
                ..Self::default()
            }
        }

        pub(crate) fn pending(&self) -> usize {
            lock(&self.state).pending.len()
        }

        pub(crate) fn pending_delays(&self) -> Vec<Duration> {
            lock(&self.state).pending.iter().map(|(_, delay, _)| *delay).collect()
        }

        pub(crate) fn cancelled(&self) -> usize {
            lock(&self.state).cancelled.len()
        }

        pub(crate) fn fire_all(&self) {
            let due = std::mem::take(&mut lock(&self.state).pending);
            for (_, _, callback) in due {
                callback();
            }
        }

        /// Runs callbacks that were cancelled, as if the cancel lost a race.
        pub(crate) fn fire_cancelled(&self) {
            let stale = std::mem::take(&mut lock(&self.state).cancelled);
            for (_, callback) in stale {
                callback();
            }
        }
    }

    impl TimerService for ManualTimerService {
        fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<TimerId, TimerError> {
            if self.fail_schedule {
                return Err(TimerError::Unavailable("scheduler offline".into()));
            }
            let mut state = lock(&self.state);
            let id = TimerId(state.next_id);
            state.next_id += 1;
            state.pending.push((id, delay, callback));
            Ok(id)
        }

        fn cancel(&self, id: TimerId) -> Result<(), TimerError> {
            let mut state = lock(&self.state);
            if let Some(position) = state.pending.iter().position(|(pending, _, _)| *pending == id) {
                let (id, _, callback) = state.pending.remove(position);
                state.cancelled.push((id, callback));
            }
            if self.fail_cancel {
                return Err(TimerError::CancelFailed {
                    id,
                    reason: "handler rejected removal".into(),
                });
            }
            Ok(())
        }
    }
}
