use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Discrete hardware/software signal reported by the host platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SignalKind {
    ScreenOff,
    ScreenOn,
    VolumeChange,
    AppForeground,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::ScreenOff => "screenOff",
            SignalKind::ScreenOn => "screenOn",
            SignalKind::VolumeChange => "volumeChange",
            SignalKind::AppForeground => "appForeground",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalEvent {
    pub kind: SignalKind,
    pub timestamp: Instant,
}

impl SignalEvent {
    pub fn new(kind: SignalKind, timestamp: Instant) -> Self {
        Self { kind, timestamp }
    }

    pub fn now(kind: SignalKind) -> Self {
        Self::new(kind, Instant::now())
    }
}

/// Emitted at most once per qualifying burst.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencyTrigger {
    pub channel: String,
    pub fired_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorEvent {
    EmergencyTriggered(EmergencyTrigger),
    /// Benign state report for channels that want raw telemetry.
    StateChanged { channel: String, kind: SignalKind },
}
