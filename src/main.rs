//! badger command-line notifier.
//!
//! Loads the notifier configuration, sends one test notice through the
//! delivery pipeline and shuts down. Any arguments are joined into the
//! notice message.

use anyhow::{bail, Context, Result};
use badger_client::{ErrorEvent, Exception, Notifier, NotifierConfig, ReportOutcome};
use tracing::{info, warn};

const TEST_NOTICE_CLASS: &str = "badger::TestNotice";

const DEFAULT_MESSAGE: &str = "test notice from the badger CLI";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = NotifierConfig::load().context("Failed to load notifier configuration")?;
    info!(
        endpoint = %config.endpoint,
        api_key_set = config.api_key.is_some(),
        async_dispatch = config.async_dispatch,
        worker_count = config.worker_count,
        "Configuration loaded"
    );

    let notifier = Notifier::from_config(config).context("Failed to build notifier")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let message = if args.is_empty() { DEFAULT_MESSAGE.to_string() } else { args.join(" ") };
    let event = ErrorEvent::new(Exception::new(TEST_NOTICE_CLASS).with_message(message))
        .with_component("badger-cli");
    let event_id = event.id();

    let outcome = notifier.report(event).await;
    let report = notifier.shutdown().await;
    info!(
        graceful = report.graceful,
        abandoned = report.abandoned,
        failed_workers = report.failed_workers,
        elapsed_ms = report.elapsed.as_millis(),
        "Notifier shut down"
    );

    let delivered = match outcome {
        ReportOutcome::Completed(status) => status.is_delivered(),
        ReportOutcome::Queued => notifier.pool_stats().delivered == 1,
        ReportOutcome::Dropped => false,
    };

    if !delivered {
        warn!(%event_id, "Test notice was not accepted");
        bail!("test notice {event_id} was not accepted by {}", notifier.config().endpoint);
    }

    info!(%event_id, "Test notice delivered");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,badger=debug"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_target(true).with_thread_names(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

