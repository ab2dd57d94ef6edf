use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{detector::PressPatternDetector, models::SignalEvent};

use super::source::SignalSource;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "sos::monitor";

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MonitorStatus {
    Stopped,
    Active,
    /// Registration failed; the host keeps running without SOS detection.
    Inert,
}

/// Owns the subscription between a signal source and the detector.
pub struct SosMonitor {
    detector: Arc<PressPatternDetector>,
    source: Arc<dyn SignalSource>,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    status: MonitorStatus,
}

impl SosMonitor {
    pub fn new(detector: Arc<PressPatternDetector>, source: Arc<dyn SignalSource>) -> Self {
        Self {
            detector,
            source,
            handle: None,
            cancel_token: None,
            status: MonitorStatus::Stopped,
        }
    }

    pub fn status(&self) -> MonitorStatus {
        self.status
    }

    pub fn detector(&self) -> &Arc<PressPatternDetector> {
        &self.detector
    }

    pub fn start(&mut self) -> MonitorStatus {
        if self.handle.is_some() {
            log_warn!("monitor already active");
            return self.status;
        }
        if self.detector.is_closed() {
            log_warn!("detector already torn down; monitor stays inert");
            self.status = MonitorStatus::Inert;
            return self.status;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                log_error!("no async runtime for signal loop: {err}");
                self.status = MonitorStatus::Inert;
                return self.status;
            }
        };

        let (sink, signals) = mpsc::unbounded_channel();
        if let Err(err) = self.source.subscribe(sink) {
            log_error!("failed to register with signal source: {err}");
            self.status = MonitorStatus::Inert;
            return self.status;
        }

        let cancel_token = CancellationToken::new();
        let handle = runtime.spawn(signal_loop(
            Arc::clone(&self.detector),
            signals,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.status = MonitorStatus::Active;
        log_info!("SOS monitoring started");
        self.status
    }

    /// Unregisters and tears the detector down. No trigger fires once this
    /// returns, even if the loop still had queued signals.
    pub async fn stop(&mut self) -> Result<()> {
        if let Err(err) = self.source.unsubscribe() {
            log_error!("failed to unregister from signal source: {err}");
        }
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.detector.shutdown();
        self.status = MonitorStatus::Stopped;

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("signal loop task failed to join")?;
        }
        log_info!("SOS monitoring stopped");
        Ok(())
    }
}

async fn signal_loop(
    detector: Arc<PressPatternDetector>,
    mut signals: mpsc::UnboundedReceiver<SignalEvent>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("signal loop shutting down");
                break;
            }
            maybe_event = signals.recv() => match maybe_event {
                Some(event) => {
                    detector.on_signal(event);
                }
                None => {
                    log_warn!("signal source closed the stream");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        detector::ChannelConfig,
        models::{DetectorEvent, SignalKind},
        signals::{HostSignalSource, SignalSink, SourceError},
    };

    struct BrokenSource;

    impl SignalSource for BrokenSource {
        fn subscribe(&self, _sink: SignalSink) -> Result<(), SourceError> {
            Err(SourceError::Unavailable("receiver registration denied".into()))
        }

        fn unsubscribe(&self) -> Result<(), SourceError> {
            Err(SourceError::Unavailable("not registered".into()))
        }
    }

    fn detector() -> (Arc<PressPatternDetector>, mpsc::UnboundedReceiver<DetectorEvent>) {
        let (detector, events) =
            PressPatternDetector::with_tokio_timers(vec![ChannelConfig::power_button()]);
        (Arc::new(detector), events)
    }

    #[tokio::test]
    async fn forwards_signals_to_detector() {
        let (detector, mut events) = detector();
        let source = Arc::new(HostSignalSource::new());
        let mut monitor = SosMonitor::new(detector, source.clone());

        assert_eq!(monitor.start(), MonitorStatus::Active);
        for _ in 0..3 {
            assert!(source.emit(SignalKind::ScreenOff));
        }

        let trigger = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match events.recv().await {
                    Some(DetectorEvent::EmergencyTriggered(trigger)) => break trigger,
                    Some(_) => continue,
                    None => panic!("detector dropped"),
                }
            }
        })
        .await
        .expect("trigger within a second");
        assert_eq!(trigger.channel, "power_button");

        monitor.stop().await.unwrap();
        assert_eq!(monitor.status(), MonitorStatus::Stopped);
        assert!(!source.is_subscribed());
        assert!(monitor.detector().is_closed());
    }

    #[tokio::test]
    async fn registration_failure_leaves_monitor_inert() {
        let (detector, _events) = detector();
        let mut monitor = SosMonitor::new(detector, Arc::new(BrokenSource));

        assert_eq!(monitor.start(), MonitorStatus::Inert);
        // Unregister errors are logged, not surfaced.
        assert!(monitor.stop().await.is_ok());
    }

    #[tokio::test]
    async fn restart_after_teardown_stays_inert() {
        let (detector, _events) = detector();
        let source = Arc::new(HostSignalSource::new());
        let mut monitor = SosMonitor::new(detector, source.clone());

        monitor.start();
        monitor.stop().await.unwrap();
        assert_eq!(monitor.start(), MonitorStatus::Inert);
        assert!(!source.is_subscribed());
    }
}
