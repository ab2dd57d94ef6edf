use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use tokio::{sync::mpsc, time::Instant};

use crate::models::{DetectorEvent, EmergencyTrigger, SignalEvent};

use super::{
    channel::ChannelConfig,
    state::{CounterStep, PressCounter},
    timer::{TimerCallback, TimerId, TimerService, TokioTimerService},
};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "sos::detector";

use crate::{log_debug, log_error, log_info, log_warn};

pub const MANUAL_CHANNEL: &str = "manual";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    pub name: String,
    pub count: u32,
    pub pending_reset: bool,
    pub timer_degraded: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DetectorSnapshot {
    pub channels: Vec<ChannelSnapshot>,
    pub closed: bool,
}

impl DetectorSnapshot {
    pub fn channel(&self, name: &str) -> Option<&ChannelSnapshot> {
        self.channels.iter().find(|channel| channel.name == name)
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingReset {
    id: TimerId,
    generation: u64,
}

struct ChannelSlot {
    config: ChannelConfig,
    counter: PressCounter,
    pending_reset: Option<PendingReset>,
    /// Bumped on every schedule/cancel; a timer callback carrying an older
    /// value is stale and must not touch the counter.
    generation: u64,
    timer_degraded: bool,
}

impl ChannelSlot {
    fn new(config: ChannelConfig) -> Self {
        let counter = PressCounter::new(config.threshold, config.reset_timeout());
        Self {
            config,
            counter,
            pending_reset: None,
            generation: 0,
            timer_degraded: false,
        }
    }
}

struct DetectorInner {
    channels: Vec<ChannelSlot>,
    closed: bool,
}

impl DetectorInner {
    fn expire(&mut self, index: usize, generation: u64) {
        if self.closed {
            return;
        }
        let Some(slot) = self.channels.get_mut(index) else {
            return;
        };
        match slot.pending_reset {
            Some(pending) if pending.generation == generation => {
                slot.pending_reset = None;
                slot.counter.reset();
                log_debug!("{}: press count reset after timeout", slot.config.name);
            }
            _ => log_debug!("{}: ignoring stale reset timer", slot.config.name),
        }
    }
}

fn lock_inner(inner: &Mutex<DetectorInner>) -> MutexGuard<'_, DetectorInner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Counts qualifying signals per channel and fires one emergency trigger per
/// burst. Signals are expected one at a time from a single event source.
pub struct PressPatternDetector {
    inner: Arc<Mutex<DetectorInner>>,
    timers: Arc<dyn TimerService>,
    events: mpsc::UnboundedSender<DetectorEvent>,
}

impl PressPatternDetector {
    pub fn new(
        channels: Vec<ChannelConfig>,
        timers: Arc<dyn TimerService>,
    ) -> (Self, mpsc::UnboundedReceiver<DetectorEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let channels = channels
            .into_iter()
            .filter(|config| match config.validate() {
                Ok(()) => true,
                Err(err) => {
                    log_error!("skipping invalid channel: {err}");
                    false
                }
            })
            .map(ChannelSlot::new)
            .collect();

        let detector = Self {
            inner: Arc::new(Mutex::new(DetectorInner {
                channels,
                closed: false,
            })),
            timers,
            events,
        };
        (detector, receiver)
    }

    pub fn with_tokio_timers(
        channels: Vec<ChannelConfig>,
    ) -> (Self, mpsc::UnboundedReceiver<DetectorEvent>) {
        Self::new(channels, Arc::new(TokioTimerService::new()))
    }

    pub fn on_signal(&self, event: SignalEvent) -> Option<EmergencyTrigger> {
        let mut guard = lock_inner(&self.inner);
        if guard.closed {
            log_debug!("ignoring {} after teardown", event.kind.as_str());
            return None;
        }

        let mut fired = None;
        for (index, slot) in guard.channels.iter_mut().enumerate() {
            if !slot.config.observes(event.kind) {
                continue;
            }

            let had_presses = slot.counter.count() > 0;
            let expired = slot.counter.is_expired_at(event.timestamp);
            let step = slot
                .counter
                .observe(event.timestamp, event.kind == slot.config.press_kind);
            if had_presses && expired {
                log_debug!("{}: press count reset, burst expired", slot.config.name);
            }

            match step {
                CounterStep::Fired => {
                    self.cancel_pending(slot);
                    log_warn!(
                        "{}: EMERGENCY press pattern detected ({} presses)",
                        slot.config.name,
                        slot.config.threshold
                    );
                    let trigger = EmergencyTrigger {
                        channel: slot.config.name.clone(),
                        fired_at: event.timestamp,
                    };
                    self.emit(DetectorEvent::EmergencyTriggered(trigger.clone()));
                    fired.get_or_insert(trigger);
                }
                CounterStep::Counted(count) => {
                    log_debug!("{}: press count {}", slot.config.name, count);
                    self.schedule_reset(index, slot);
                    self.report_state(slot, event);
                }
                CounterStep::Ignored => self.report_state(slot, event),
            }
        }
        fired
    }

    /// Fires regardless of counts and clears every channel.
    pub fn trigger_manually(&self) -> Option<EmergencyTrigger> {
        let mut guard = lock_inner(&self.inner);
        if guard.closed {
            return None;
        }
        for slot in guard.channels.iter_mut() {
            self.cancel_pending(slot);
            slot.counter.reset();
        }
        log_warn!("manual emergency trigger");
        let trigger = EmergencyTrigger {
            channel: MANUAL_CHANNEL.to_string(),
            fired_at: Instant::now(),
        };
        self.emit(DetectorEvent::EmergencyTriggered(trigger.clone()));
        Some(trigger)
    }

    pub fn snapshot(&self) -> DetectorSnapshot {
        let guard = lock_inner(&self.inner);
        DetectorSnapshot {
            channels: guard
                .channels
                .iter()
                .map(|slot| ChannelSnapshot {
                    name: slot.config.name.clone(),
                    count: slot.counter.count(),
                    pending_reset: slot.pending_reset.is_some(),
                    timer_degraded: slot.timer_degraded,
                })
                .collect(),
            closed: guard.closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        lock_inner(&self.inner).closed
    }

    /// Cancels every pending reset timer before returning. Later signals and
    /// any timer callback already in flight are ignored.
    pub fn shutdown(&self) {
        let mut guard = lock_inner(&self.inner);
        if guard.closed {
            return;
        }
        guard.closed = true;
        for slot in guard.channels.iter_mut() {
            self.cancel_pending(slot);
            slot.counter.reset();
        }
        log_info!("detector torn down");
    }

    fn schedule_reset(&self, index: usize, slot: &mut ChannelSlot) {
        self.cancel_pending(slot);
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;

        let inner: Weak<Mutex<DetectorInner>> = Arc::downgrade(&self.inner);
        let callback: TimerCallback = Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                lock_inner(&inner).expire(index, generation);
            }
        });

        match self.timers.schedule(slot.config.reset_timeout(), callback) {
            Ok(id) => {
                slot.pending_reset = Some(PendingReset { id, generation });
                slot.timer_degraded = false;
            }
            Err(err) => {
                // The expiry check on the next signal performs the reset instead.
                log_error!(
                    "{}: failed to schedule reset timer: {err}",
                    slot.config.name
                );
                slot.pending_reset = None;
                slot.timer_degraded = true;
            }
        }
    }

    fn cancel_pending(&self, slot: &mut ChannelSlot) {
        let Some(pending) = slot.pending_reset.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        if let Err(err) = self.timers.cancel(pending.id) {
            log_error!("{}: failed to cancel reset timer: {err}", slot.config.name);
            slot.timer_degraded = true;
        }
    }

    fn report_state(&self, slot: &ChannelSlot, event: SignalEvent) {
        if slot.config.report_state_changes {
            self.emit(DetectorEvent::StateChanged {
                channel: slot.config.name.clone(),
                kind: event.kind,
            });
        }
    }

    fn emit(&self, event: DetectorEvent) {
        if self.events.send(event).is_err() {
            log_warn!("detector event receiver dropped; event discarded");
        }
    }
}

impl Drop for PressPatternDetector {
    fn drop(&mut self) {
        self.shutdown();
    }
}
