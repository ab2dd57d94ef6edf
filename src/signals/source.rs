use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tokio::{sync::mpsc, time::Instant};

use crate::models::{SignalEvent, SignalKind};

pub type SignalSink = mpsc::UnboundedSender<SignalEvent>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("signal source already has a subscriber")]
    AlreadySubscribed,
    #[error("signal source unavailable: {0}")]
    Unavailable(String),
}

/// Where screen, volume and lifecycle signals come from. Platform glue
/// implements this; the detector never talks to the platform directly.
pub trait SignalSource: Send + Sync {
    fn subscribe(&self, sink: SignalSink) -> Result<(), SourceError>;
    fn unsubscribe(&self) -> Result<(), SourceError>;
}

/// In-process bridge: native callbacks call [`HostSignalSource::emit`].
#[derive(Default)]
pub struct HostSignalSource {
    sink: Mutex<Option<SignalSink>>,
}

impl HostSignalSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn sink(&self) -> MutexGuard<'_, Option<SignalSink>> {
        match self.sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.sink().is_some()
    }

    /// Returns false when nobody is listening.
    pub fn emit(&self, kind: SignalKind) -> bool {
        self.emit_at(kind, Instant::now())
    }

    pub fn emit_at(&self, kind: SignalKind, timestamp: Instant) -> bool {
        match self.sink().as_ref() {
            Some(sink) => sink.send(SignalEvent::new(kind, timestamp)).is_ok(),
            None => false,
        }
    }
}

impl SignalSource for HostSignalSource {
    fn subscribe(&self, sink: SignalSink) -> Result<(), SourceError> {
        let mut guard = self.sink();
        if guard.as_ref().is_some_and(|existing| !existing.is_closed()) {
            return Err(SourceError::AlreadySubscribed);
        }
        *guard = Some(sink);
        Ok(())
    }

    fn unsubscribe(&self) -> Result<(), SourceError> {
        self.sink().take();
        Ok(())
    }
}
