//! Transport installer entry point.
//!
//! One invocation is one pass: discover running guests, push the payload to
//! each new one, log out. Per-guest failures are logged and retried by the
//! next invocation; they never fail the process.

use std::sync::Arc;
use transport_core::{CompletionLog, SessionRegistry};
use transport_host::PrlctlHost;
use transport_install::{ConfigError, InstallConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries forwarded guest output
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("install_transport=info".parse()?)
                .add_directive("transport_install=info".parse()?)
                .add_directive("transport_core=info".parse()?)
                .add_directive("transport_host=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting transport installer");

    let config = InstallConfig::from_env();
    tracing::info!(?config, "Configuration loaded");

    // Missing artifacts only fail the affected guests
    config.validate_warn();
    if let Err(e @ ConfigError::InvalidDoneLog(_)) = config.validate() {
        return Err(e.into());
    }

    let host = Arc::new(PrlctlHost::new(config.prlctl_config()));
    let mut registry =
        SessionRegistry::new(host, config.payload_selector(), config.registry_config()?);

    if let Some(path) = &config.done_log {
        registry = registry
            .with_completion_log(CompletionLog::new(path))
            .await?;
    }

    let report = registry.run().await;
    if report.failures() > 0 {
        tracing::info!(
            failures = report.failures(),
            "Some guests were not reached; they will be retried on the next run"
        );
    }

    Ok(())
}
