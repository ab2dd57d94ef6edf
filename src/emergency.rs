//! Bridges detector triggers to outbound emergency notifications.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::{runtime::Handle, sync::mpsc::UnboundedReceiver, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    detector::{ChannelConfig, DetectorSnapshot, PressPatternDetector},
    dispatch::NotificationDispatcher,
    models::{DetectorEvent, EmergencyTrigger, NotificationRequest, Recipient},
    settings::EmergencySettings,
    signals::{MonitorStatus, SignalSource, SosMonitor},
};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "sos::emergency";

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelaySummary {
    pub triggers: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Consumes detector events until the stream closes or `cancel` fires. Each
/// trigger alerts every configured contact.
pub async fn relay_emergencies(
    mut events: UnboundedReceiver<DetectorEvent>,
    dispatcher: &NotificationDispatcher,
    settings: &EmergencySettings,
    cancel: CancellationToken,
) -> RelaySummary {
    let mut summary = RelaySummary::default();

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log_info!("emergency relay cancelled");
                break;
            }
            event = events.recv() => event,
        };

        match event {
            Some(DetectorEvent::EmergencyTriggered(trigger)) => {
                summary.triggers += 1;
                let (delivered, failed) = alert_contacts(&trigger, dispatcher, settings).await;
                summary.delivered += delivered;
                summary.failed += failed;
            }
            Some(DetectorEvent::StateChanged { channel, kind }) => {
                log_debug!("{channel}: {}", kind.as_str());
            }
            None => {
                log_info!("detector event stream closed");
                break;
            }
        }
    }

    summary
}

/// Signal source → monitor → detector → relay, running until stopped or
/// until `cancel` fires.
pub struct EmergencyPipeline {
    monitor: SosMonitor,
    relay: JoinHandle<RelaySummary>,
}

impl EmergencyPipeline {
    pub fn start(
        channels: Vec<ChannelConfig>,
        settings: EmergencySettings,
        dispatcher: NotificationDispatcher,
        source: Arc<dyn SignalSource>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let runtime = Handle::try_current().context("emergency pipeline needs a tokio runtime")?;
        if settings.contacts.is_empty() {
            log_warn!("no emergency contacts configured; triggers will not notify anyone");
        }

        let (detector, events) = PressPatternDetector::with_tokio_timers(channels);
        let mut monitor = SosMonitor::new(Arc::new(detector), source);
        let status = monitor.start();
        log_info!("emergency pipeline started ({status:?})");

        let relay = runtime.spawn(async move {
            relay_emergencies(events, &dispatcher, &settings, cancel).await
        });
        Ok(Self { monitor, relay })
    }

    pub fn status(&self) -> MonitorStatus {
        self.monitor.status()
    }

    pub fn snapshot(&self) -> DetectorSnapshot {
        self.monitor.detector().snapshot()
    }

    pub fn trigger_manually(&self) -> Option<EmergencyTrigger> {
        self.monitor.detector().trigger_manually()
    }

    /// Stops detection, lets the relay finish triggers already emitted, and
    /// returns its summary.
    pub async fn stop(self) -> Result<RelaySummary> {
        let Self { mut monitor, relay } = self;
        monitor.stop().await?;
        // Dropping the last detector handle closes the event stream.
        drop(monitor);
        relay.await.context("emergency relay task failed to join")
    }
}

async fn alert_contacts(
    trigger: &EmergencyTrigger,
    dispatcher: &NotificationDispatcher,
    settings: &EmergencySettings,
) -> (usize, usize) {
    if settings.contacts.is_empty() {
        log_warn!("emergency on {} but no contacts configured", trigger.channel);
        return (0, 0);
    }

    let requests: Vec<NotificationRequest> = settings
        .contacts
        .iter()
        .map(|contact| {
            NotificationRequest::emergency(
                Recipient::User(contact.clone()),
                &settings.sender_name,
                None,
            )
        })
        .collect();

    let results = dispatcher.dispatch_batch(&requests).await;
    let mut delivered = 0;
    for (contact, result) in settings.contacts.iter().zip(&results) {
        if result.success {
            delivered += 1;
            log_info!("emergency alert delivered to {contact}");
        } else {
            log_error!(
                "emergency alert to {contact} failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    (delivered, results.len() - delivered)
}
