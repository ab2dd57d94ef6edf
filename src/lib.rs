pub mod db;
pub mod detector;
pub mod dispatch;
pub mod emergency;
pub mod models;
pub mod server;
pub mod settings;
pub mod signals;
pub mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use db::Database;
use dispatch::{DryRunTransport, FcmTransport, MessagingTransport, NotificationDispatcher};
use emergency::EmergencyPipeline;
use server::RelayState;
use settings::{access_token_from_env, RelaySettings, TransportKind, TransportSettings};
use signals::HostSignalSource;

/// Reads `RUST_LOG`; defaults to `info`.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn build_transport(settings: &TransportSettings) -> Result<Arc<dyn MessagingTransport>> {
    match settings.kind {
        TransportKind::DryRun => {
            info!("Using dry-run transport; notifications are logged, not sent");
            Ok(Arc::new(DryRunTransport))
        }
        TransportKind::Fcm => {
            let transport = FcmTransport::from_settings(settings, access_token_from_env())
                .context("failed to configure FCM transport")?;
            Ok(Arc::new(transport))
        }
    }
}

/// Runs the relay until ctrl-c with no host signal feed attached.
pub async fn run() -> Result<()> {
    run_with_signals(Arc::new(HostSignalSource::new())).await
}

/// Runs the relay with the emergency detector listening on `signals`; host
/// glue emits screen, volume and lifecycle events into it.
pub async fn run_with_signals(signals: Arc<HostSignalSource>) -> Result<()> {
    info!("SOS relay starting up...");

    let settings = RelaySettings::load();
    let database = Database::open(settings.database_path.clone())?;
    let transport = build_transport(&settings.transport)?;

    let mut dispatcher = NotificationDispatcher::new(Arc::new(database.clone()), transport)
        .with_batch_concurrency(settings.batch_concurrency);
    if settings.delivery_log_enabled {
        dispatcher = dispatcher.with_log_sink(Arc::new(database.clone()));
    }
    let state = RelayState::new(dispatcher.clone(), Arc::new(database));

    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                on_signal.cancel();
            }
            Err(err) => error!("Failed to listen for shutdown signal: {err}"),
        }
    });

    let pipeline = EmergencyPipeline::start(
        settings.detector.channels.clone(),
        settings.emergency.clone(),
        dispatcher,
        signals,
        shutdown.clone(),
    )?;

    let served = server::serve(listener, state, shutdown.clone()).await;
    shutdown.cancel();
    match pipeline.stop().await {
        Ok(summary) => info!(
            "Emergency relay finished: {} triggers, {} delivered, {} failed",
            summary.triggers, summary.delivered, summary.failed
        ),
        Err(err) => error!("Emergency pipeline did not stop cleanly: {err:#}"),
    }
    served
}
