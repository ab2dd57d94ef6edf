pub mod notification;
pub mod signal;

pub use notification::{
    DeliveryHints, DispatchResult, NotificationKind, NotificationRequest, Recipient,
};
pub use signal::{DetectorEvent, EmergencyTrigger, SignalEvent, SignalKind};
