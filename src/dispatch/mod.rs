//! Notification dispatch: validation, token lookup, payload construction and
//! delivery through a pluggable transport.

pub mod dispatcher;
pub mod error;
pub mod fcm;
pub mod payload;
pub mod resolver;
pub mod sink;
pub mod transport;

pub use dispatcher::{DispatchReceipt, NotificationDispatcher};
pub use error::DispatchError;
pub use fcm::FcmTransport;
pub use payload::{build_payload, DeliveryPayload};
pub use resolver::{MemoryTokenStore, TokenRegistry, TokenResolver};
pub use sink::{DeliveryLogEntry, DeliveryLogSink};
pub use transport::{DryRunTransport, MessagingTransport, TransportError};
