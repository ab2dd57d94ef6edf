use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::models::SignalKind;

/// One independently counted press pattern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    pub name: String,
    /// The signal that counts as a press.
    pub press_kind: SignalKind,
    /// Extra signals this channel sees (expiry check + state reports) without counting.
    #[serde(default)]
    pub observed_kinds: Vec<SignalKind>,
    pub threshold: u32,
    pub reset_timeout_ms: u64,
    #[serde(default)]
    pub report_state_changes: bool,
}

impl ChannelConfig {
    /// Screen-off broadcasts stand in for power-button presses.
    pub fn power_button() -> Self {
        Self {
            name: "power_button".into(),
            press_kind: SignalKind::ScreenOff,
            observed_kinds: vec![SignalKind::ScreenOn],
            threshold: 3,
            reset_timeout_ms: 5_000,
            report_state_changes: true,
        }
    }

    /// Three presses up and three down.
    pub fn volume_buttons() -> Self {
        Self {
            name: "volume_buttons".into(),
            press_kind: SignalKind::VolumeChange,
            observed_kinds: Vec::new(),
            threshold: 6,
            reset_timeout_ms: 2_000,
            report_state_changes: false,
        }
    }

    /// Rapid foreground transitions; weaker evidence, so not enabled by default.
    pub fn app_foreground() -> Self {
        Self {
            name: "app_foreground".into(),
            press_kind: SignalKind::AppForeground,
            observed_kinds: Vec::new(),
            threshold: 3,
            reset_timeout_ms: 2_000,
            report_state_changes: false,
        }
    }

    pub fn observes(&self, kind: SignalKind) -> bool {
        kind == self.press_kind || self.observed_kinds.contains(&kind)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("channel name must not be empty");
        }
        if self.threshold == 0 {
            bail!("channel {} threshold must be at least 1", self.name);
        }
        if self.reset_timeout_ms == 0 {
            bail!("channel {} reset timeout must be greater than zero", self.name);
        }
        Ok(())
    }
}

pub fn default_channels() -> Vec<ChannelConfig> {
    vec![ChannelConfig::power_button(), ChannelConfig::volume_buttons()]
}
