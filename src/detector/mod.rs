pub mod channel;
pub mod controller;
pub mod state;
pub mod timer;

pub use channel::{default_channels, ChannelConfig};
pub use controller::{ChannelSnapshot, DetectorSnapshot, PressPatternDetector, MANUAL_CHANNEL};
pub use state::{CounterState, CounterStep, PressCounter};
pub use timer::{TimerCallback, TimerError, TimerId, TimerService, TokioTimerService};
