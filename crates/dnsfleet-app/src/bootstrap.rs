//! Dependency wiring for the `dnsfleet` binary.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use dnsfleet_config::SyncSettings;
use dnsfleet_core::{SessionFactory, Store};
use dnsfleet_data::PgStore;
use dnsfleet_events::EventBus;
use dnsfleet_sync::{EventBusNotifier, SyncContext, SyncService};
use dnsfleet_telemetry::{LogFormat, LoggingConfig, Metrics};
use dnsfleet_transport::{LocalSessionFactory, SshOptions, SshSessionFactory};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

/// Connection string of the control plane database.
pub(crate) const DATABASE_URL_ENV: &str = "DATABASE_URL";
/// `json` or `pretty`; defaults by build profile.
pub(crate) const LOG_FORMAT_ENV: &str = "DNSFLEET_LOG_FORMAT";
/// When set, nodes are served from `<root>/node-<id>` instead of over ssh.
pub(crate) const LOCAL_ROOT_ENV: &str = "DNSFLEET_LOCAL_ROOT";
/// Alternative ssh client binary.
pub(crate) const SSH_BINARY_ENV: &str = "DNSFLEET_SSH_BINARY";

const DB_MAX_CONNECTIONS: u32 = 10;

/// Install the global subscriber at `level` (overridden by `RUST_LOG`).
pub(crate) fn init_logging(level: &str) -> AppResult<()> {
    let format = env::var(LOG_FORMAT_ENV).ok();
    let build_sha = option_env!("DNSFLEET_BUILD_SHA").unwrap_or("dev");
    let config = LoggingConfig {
        level,
        format: LogFormat::from_label(format.as_deref()),
        build_sha,
    };
    dnsfleet_telemetry::init_logging(&config)
        .map_err(|err| AppError::telemetry("telemetry.init", err))
}

/// Services shared by every command.
pub(crate) struct App {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) service: SyncService,
    pub(crate) events: EventBus,
    pub(crate) metrics: Metrics,
    pub(crate) settings: SyncSettings,
    runner: JoinHandle<()>,
}

impl App {
    /// Wire the engine around injected collaborators and start the job runner.
    pub(crate) fn new(
        store: Arc<dyn Store>,
        sessions: Arc<dyn SessionFactory>,
        settings: SyncSettings,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        let notifier = Arc::new(EventBusNotifier::new(events.clone()));
        let ctx = SyncContext::new(
            Arc::clone(&store),
            sessions,
            notifier,
            events.clone(),
            metrics.clone(),
            settings.clone(),
        );
        let (service, runner) = SyncService::start(ctx);
        Self {
            store,
            service,
            events,
            metrics,
            settings,
            runner,
        }
    }

    /// Construct production dependencies from the environment.
    pub(crate) async fn from_env() -> AppResult<Self> {
        let settings =
            dnsfleet_config::load_from_env().map_err(|err| AppError::config("config.load", err))?;

        let database_url = env::var(DATABASE_URL_ENV).map_err(|_| AppError::MissingEnv {
            name: DATABASE_URL_ENV,
        })?;
        let store = PgStore::connect(&database_url, DB_MAX_CONNECTIONS)
            .await
            .map_err(|err| AppError::data("store.connect", err))?;

        let sessions = session_factory(&settings)?;
        let metrics =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;

        Ok(Self::new(
            Arc::new(store),
            sessions,
            settings,
            EventBus::new(),
            metrics,
        ))
    }

    /// Close the job queue and wait for the runner to drain it.
    pub(crate) async fn shutdown(self) {
        let Self {
            service, runner, ..
        } = self;
        drop(service);
        if let Err(err) = runner.await {
            warn!(error = %err, "sync job runner join failed");
        }
    }
}

fn session_factory(settings: &SyncSettings) -> AppResult<Arc<dyn SessionFactory>> {
    if let Some(root) = env::var_os(LOCAL_ROOT_ENV) {
        let root = PathBuf::from(root);
        info!(root = %root.display(), "using local session root");
        let factory = LocalSessionFactory::new(root)
            .map_err(|err| AppError::transport("transport.local", err))?;
        return Ok(Arc::new(factory));
    }

    let mut options = SshOptions {
        operation_timeout: settings.operation_timeout(),
        ..SshOptions::default()
    };
    if let Some(binary) = env::var_os(SSH_BINARY_ENV) {
        options.binary = PathBuf::from(binary);
    }
    let factory =
        SshSessionFactory::new(options).map_err(|err| AppError::transport("transport.ssh", err))?;
    Ok(Arc::new(factory))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use dnsfleet_test_support::{FakeRemote, MemoryStore};

    pub(crate) fn memory_app_with(
        store: Arc<MemoryStore>,
        remote: FakeRemote,
    ) -> anyhow::Result<App> {
        Ok(App::new(
            store,
            Arc::new(remote),
            SyncSettings::default(),
            EventBus::new(),
            Metrics::new()?,
        ))
    }

    pub(crate) fn memory_app(nodes: i64) -> anyhow::Result<App> {
        memory_app_with(Arc::new(MemoryStore::with_nodes(nodes)), FakeRemote::new())
    }

    #[tokio::test]
    async fn shutdown_drains_the_runner() -> anyhow::Result<()> {
        let app = memory_app(1)?;
        let ticket = app.service.resync_node(1).await?;
        app.shutdown().await;
        let report = ticket.wait().await?;
        assert!(report.outcomes[0].succeeded());
        Ok(())
    }
}
