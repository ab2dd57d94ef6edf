pub mod monitor;
pub mod source;

pub use monitor::{MonitorStatus, SosMonitor};
pub use source::{HostSignalSource, SignalSink, SignalSource, SourceError};
