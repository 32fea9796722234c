use dnsfleet_core::{NodeId, SyncLogFilter, SyncLogId};

use crate::bootstrap::App;
use crate::cli::{LogsArgs, OutputFormat};
use crate::commands::finish_job;
use crate::error::{AppError, AppResult};
use crate::output;

pub(crate) async fn resync(app: &App, node_id: NodeId, format: OutputFormat) -> AppResult<()> {
    let ticket = app
        .service
        .resync_node(node_id)
        .await
        .map_err(AppError::sync("resync_node"))?;
    finish_job(ticket, format).await
}

pub(crate) async fn retry(app: &App, log_id: SyncLogId, format: OutputFormat) -> AppResult<()> {
    let ticket = app
        .service
        .retry_sync_log(log_id)
        .await
        .map_err(AppError::sync("retry_sync_log"))?;
    finish_job(ticket, format).await
}

pub(crate) async fn logs(app: &App, args: LogsArgs, format: OutputFormat) -> AppResult<()> {
    let filter = SyncLogFilter {
        node_id: args.node,
        status: args.status,
        log_type: args.log_type,
        limit: args.limit,
        offset: args.offset,
    };
    let logs = app
        .service
        .sync_logs(&filter)
        .await
        .map_err(AppError::sync("sync_logs"))?;
    output::emit(&output::render_logs(&logs, format)?);
    Ok(())
}

pub(crate) async fn stats(app: &App, format: OutputFormat) -> AppResult<()> {
    let stats = app
        .service
        .sync_stats()
        .await
        .map_err(AppError::sync("sync_stats"))?;
    output::emit(&output::render_stats(&stats, format)?);
    Ok(())
}

pub(crate) async fn health(app: &App, format: OutputFormat) -> AppResult<()> {
    let report = app
        .service
        .probe_health()
        .await
        .map_err(AppError::sync("probe_health"))?;
    output::emit(&output::render_health(&report, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use dnsfleet_core::{NodeStatus, NodeStore, SyncLogStore, SyncStatus};
    use dnsfleet_sync::SyncError;
    use dnsfleet_test_support::{FakeRemote, MemoryStore, RemoteFault};

    use crate::bootstrap::tests::{memory_app, memory_app_with};

    #[tokio::test]
    async fn failed_nodes_surface_as_partial_failure() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::with_nodes(1));
        let remote = FakeRemote::new();
        remote.inject(1, RemoteFault::Connect);
        let app = memory_app_with(Arc::clone(&store), remote.clone())?;

        let err = resync(&app, 1, OutputFormat::Table).await.err();
        assert!(matches!(
            err,
            Some(AppError::PartialFailure {
                failed: 1,
                total: 1
            })
        ));

        remote.heal(1);
        let failed = store.all_logs();
        assert_eq!(failed[0].status, SyncStatus::Failed);
        retry(&app, failed[0].id, OutputFormat::Table).await?;
        let log = store.find_log(failed[0].id).await?;
        assert_eq!(log.map(|l| l.status), Some(SyncStatus::Success));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_nodes_are_rejected() -> anyhow::Result<()> {
        let app = memory_app(1)?;
        let err = resync(&app, 9, OutputFormat::Table).await.err();
        assert!(matches!(
            err,
            Some(AppError::Sync {
                source: SyncError::NodeNotFound { node_id: 9 },
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn health_updates_node_status() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::with_nodes(2));
        let remote = FakeRemote::new();
        remote.inject(2, RemoteFault::Connect);
        let app = memory_app_with(Arc::clone(&store), remote)?;

        health(&app, OutputFormat::Json).await?;
        stats(&app, OutputFormat::Table).await?;
        logs(&app, LogsArgs::default(), OutputFormat::Table).await?;

        let statuses: Vec<NodeStatus> = store
            .list_nodes()
            .await?
            .into_iter()
            .map(|n| n.status)
            .collect();
        assert_eq!(statuses, vec![NodeStatus::Online, NodeStatus::Offline]);
        Ok(())
    }
}
