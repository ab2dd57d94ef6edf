use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterState {
    Idle,
    Counting { count: u32, last_event_at: Instant },
}

impl Default for CounterState {
    fn default() -> Self {
        CounterState::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterStep {
    /// Observed but not a press for this channel.
    Ignored,
    Counted(u32),
    /// Threshold reached; the counter is already back to idle.
    Fired,
}

/// Press counter for one channel. Pure state: timers live in the controller.
#[derive(Debug, Clone)]
pub struct PressCounter {
    state: CounterState,
    threshold: u32,
    reset_timeout: Duration,
}

impl PressCounter {
    pub fn new(threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            state: CounterState::Idle,
            threshold: threshold.max(1),
            reset_timeout,
        }
    }

    pub fn state(&self) -> CounterState {
        self.state
    }

    pub fn count(&self) -> u32 {
        match self.state {
            CounterState::Idle => 0,
            CounterState::Counting { count, .. } => count,
        }
    }

    /// A burst is over once `reset_timeout` has passed; a press landing exactly
    /// on the boundary starts a new one.
    pub fn is_expired_at(&self, at: Instant) -> bool {
        match self.state {
            CounterState::Idle => false,
            CounterState::Counting { last_event_at, .. } => {
                at.saturating_duration_since(last_event_at) >= self.reset_timeout
            }
        }
    }

    pub fn observe(&mut self, at: Instant, is_press: bool) -> CounterStep {
        if self.is_expired_at(at) {
            self.state = CounterState::Idle;
        }

        if !is_press {
            return CounterStep::Ignored;
        }

        let count = self.count() + 1;
        if count >= self.threshold {
            self.state = CounterState::Idle;
            return CounterStep::Fired;
        }

        self.state = CounterState::Counting {
            count,
            last_event_at: at,
        };
        CounterStep::Counted(count)
    }

    pub fn reset(&mut self) {
        self.state = CounterState::Idle;
    }
}
