//! Per-node read, merge, backup and write pipeline.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dnsfleet_config::BackupPolicy;
use dnsfleet_core::{
    Entity, Node, NodeId, Notification, NotificationKind, RemoteSession, SessionError,
    SessionResult, StoreError, SyncLog, SyncStatus,
};
use dnsfleet_document::{
    ConfigDocument, MergeOp, generate, merge, merge_full, remove_key, render_domain_set_file,
    try_parse,
};
use dnsfleet_events::Event;
use tracing::{debug, error, info, warn};

use crate::context::SyncContext;
use crate::error::SyncError;
use crate::locks::NodeLocks;
use crate::plan::{NodeChange, NodeOutcome, NodeResult};
use crate::reconcile::desired_for_node;

/// Error recorded on entries whose job was cancelled before the node ran.
pub const CANCELLED: &str = "cancelled";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StepKind {
    LoadDesired,
    Connect,
    Read,
    Merge,
    Backup,
    WriteSetFiles,
    Write,
    RemoveSetFiles,
    Reload,
}

impl StepKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::LoadDesired => "load_desired",
            Self::Connect => "connect",
            Self::Read => "read",
            Self::Merge => "merge",
            Self::Backup => "backup",
            Self::WriteSetFiles => "write_set_files",
            Self::Write => "write",
            Self::RemoveSetFiles => "remove_set_files",
            Self::Reload => "reload",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StepStatus {
    Started,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Fatal failure of one step; rendered onto the audit entry.
#[derive(Debug)]
struct StepFailure {
    step: StepKind,
    detail: String,
}

impl StepFailure {
    fn new(step: StepKind, detail: impl Into<String>) -> Self {
        Self {
            step,
            detail: detail.into(),
        }
    }

    fn message(&self) -> String {
        format!("{}: {}", self.step.as_str(), self.detail)
    }
}

/// Files the merge step decided to touch besides the main document.
#[derive(Debug, Default)]
struct FilePlan {
    writes: Vec<(PathBuf, String)>,
    removals: Vec<PathBuf>,
}

/// Applies one [`NodeChange`] to one node and records the attempt.
#[derive(Clone)]
pub struct SyncWorker {
    ctx: SyncContext,
    locks: NodeLocks,
}

impl SyncWorker {
    /// Worker over `ctx`; `locks` must be shared by every worker of a process.
    #[must_use]
    pub const fn new(ctx: SyncContext, locks: NodeLocks) -> Self {
        Self { ctx, locks }
    }

    /// Run one attempt against `node`.
    ///
    /// Opens a `pending` audit entry (or continues `existing`, which must be
    /// `pending`), applies the change under the node lock and finishes the
    /// entry as `success` or `failed`. Never returns an error: every failure
    /// is captured in the outcome and on the audit entry.
    pub async fn run(
        &self,
        node: &Node,
        change: &NodeChange,
        existing: Option<SyncLog>,
    ) -> NodeOutcome {
        let log = match existing {
            Some(log) => log,
            None => {
                let new_log = change.new_log(node.id, &self.ctx.settings.domain_set_dir);
                match self
                    .bounded_store("create_log", self.ctx.store.create_log(new_log))
                    .await
                {
                    Ok(log) => log,
                    Err(err) => {
                        error!(node_id = node.id, error = %err, "failed to open sync log");
                        return NodeOutcome {
                            node_id: node.id,
                            log_id: None,
                            result: NodeResult::Failed {
                                error: format!("record sync log: {err}"),
                            },
                        };
                    }
                }
            }
        };
        self.ctx.events.send(Event::NodeSyncStarted {
            node_id: node.id,
            log_id: log.id,
        });

        let result = {
            let _guard = self.locks.acquire(node.id).await;
            self.apply(node, change).await
        };
        self.finish(node, &log, result).await
    }

    /// Fail a reopened entry whose node was never attempted.
    pub async fn abandon(&self, node_id: NodeId, log: &SyncLog) {
        let finished = self
            .bounded_store(
                "finish_log",
                self.ctx
                    .store
                    .finish_log(log.id, SyncStatus::Failed, Some(CANCELLED.to_string())),
            )
            .await;
        match finished {
            Ok(_) => self
                .ctx
                .metrics
                .inc_sync_attempt(log.log_type.as_str(), SyncStatus::Failed.as_str()),
            Err(err) => {
                error!(
                    node_id,
                    log_id = log.id,
                    error = %err,
                    "failed to close cancelled sync log"
                );
            }
        }
    }

    async fn apply(&self, node: &Node, change: &NodeChange) -> Result<Vec<String>, StepFailure> {
        let desired = match change {
            NodeChange::Full => Some(self.load_desired(node.id).await?),
            _ => None,
        };
        let mut session = self
            .step(node.id, StepKind::Connect, async {
                let timeout = self.ctx.settings.connect_timeout();
                self.ctx.sessions.open(node, timeout).await
            })
            .await?;
        self.ctx.metrics.session_opened();

        let result = self
            .apply_in_session(session.as_mut(), node, change, desired.as_deref())
            .await;

        let after = self.ctx.settings.operation_timeout();
        match tokio::time::timeout(after, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(node_id = node.id, error = %err.detail(), "failed to close session");
            }
            Err(_) => warn!(node_id = node.id, "closing session timed out"),
        }
        self.ctx.metrics.session_closed();
        result
    }

    async fn load_desired(&self, node_id: NodeId) -> Result<Vec<Entity>, StepFailure> {
        self.record_step(node_id, StepKind::LoadDesired, StepStatus::Started);
        match desired_for_node(self.ctx.store.as_ref(), node_id).await {
            Ok(entities) => {
                self.record_step(node_id, StepKind::LoadDesired, StepStatus::Completed);
                Ok(entities)
            }
            Err(err) => {
                self.record_step(node_id, StepKind::LoadDesired, StepStatus::Failed);
                let detail = match &err {
                    SyncError::Store { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                Err(StepFailure::new(StepKind::LoadDesired, detail))
            }
        }
    }

    async fn apply_in_session(
        &self,
        session: &mut dyn RemoteSession,
        node: &Node,
        change: &NodeChange,
        desired: Option<&[Entity]>,
    ) -> Result<Vec<String>, StepFailure> {
        let settings = &self.ctx.settings;
        let path = node.config_path_or(&settings.default_config_path).to_path_buf();
        let mut warnings = Vec::new();

        let current = self
            .step(node.id, StepKind::Read, async {
                match session.read_file(&path).await {
                    Ok(text) => Ok(Some(text)),
                    Err(err) if err.is_not_found() => Ok(None),
                    Err(err) => Err(err),
                }
            })
            .await?;
        if current.is_none() {
            debug!(
                node_id = node.id,
                path = %path.display(),
                "configuration file absent; starting empty"
            );
        }

        self.record_step(node.id, StepKind::Merge, StepStatus::Started);
        let mut doc = match try_parse(current.as_deref().unwrap_or_default()) {
            Ok(doc) => doc,
            Err(err) => {
                self.record_step(node.id, StepKind::Merge, StepStatus::Failed);
                return Err(StepFailure::new(
                    StepKind::Merge,
                    format!("{err} ({})", err.pattern),
                ));
            }
        };
        let files = self.merge_change(&mut doc, change, desired);
        let rendered = generate(&doc);
        self.record_step(node.id, StepKind::Merge, StepStatus::Completed);

        if current.is_some() {
            self.backup(session, node.id, &path, &mut warnings).await?;
        } else {
            self.record_step(node.id, StepKind::Backup, StepStatus::Skipped);
        }

        if files.writes.is_empty() {
            self.record_step(node.id, StepKind::WriteSetFiles, StepStatus::Skipped);
        } else {
            self.step(node.id, StepKind::WriteSetFiles, async {
                for (file, contents) in &files.writes {
                    session.write_file(file, contents).await?;
                }
                Ok::<_, SessionError>(())
            })
            .await?;
        }

        self.step(node.id, StepKind::Write, session.write_file(&path, &rendered))
            .await?;

        for file in &files.removals {
            let removed = self
                .step(node.id, StepKind::RemoveSetFiles, session.remove_file(file))
                .await;
            if let Err(failure) = removed {
                warn!(
                    node_id = node.id,
                    file = %file.display(),
                    error = %failure.detail,
                    "failed to remove domain set file"
                );
                warnings.push(failure.message());
            }
        }

        if let Some(command) = settings.reload_command.as_deref() {
            let after = settings.operation_timeout();
            let reloaded = self
                .step(node.id, StepKind::Reload, async {
                    let output = session.execute(command, after).await?;
                    if output.success() {
                        return Ok::<_, SessionError>(());
                    }
                    Err(SessionError::CommandFailed {
                        command: command.to_string(),
                        status: output.status,
                        stderr: output.stderr,
                    })
                })
                .await;
            if let Err(failure) = reloaded {
                warn!(node_id = node.id, error = %failure.detail, "reload after write failed");
                warnings.push(failure.message());
            }
        }

        Ok(warnings)
    }

    fn merge_change(
        &self,
        doc: &mut ConfigDocument,
        change: &NodeChange,
        desired: Option<&[Entity]>,
    ) -> FilePlan {
        let dir = self.ctx.settings.domain_set_dir.as_path();
        let mut files = FilePlan::default();
        match change {
            NodeChange::Upsert(entity) => {
                merge(doc, entity, MergeOp::Upsert, dir);
                if let Entity::DomainSet(set) = entity {
                    files
                        .writes
                        .push((set.file_path(dir), render_domain_set_file(set)));
                }
            }
            NodeChange::Remove { kind, key, .. } => {
                let removed = remove_key(doc, *kind, key);
                debug!(kind = %kind, key = %key, removed, "removed directives");
                files.removals.extend(change.set_file(dir));
            }
            NodeChange::Full => {
                let entities = desired.unwrap_or_default();
                merge_full(doc, entities, dir);
                for entity in entities {
                    if let Entity::DomainSet(set) = entity {
                        files
                            .writes
                            .push((set.file_path(dir), render_domain_set_file(set)));
                    }
                }
            }
        }
        files
    }

    async fn backup(
        &self,
        session: &mut dyn RemoteSession,
        node_id: NodeId,
        path: &Path,
        warnings: &mut Vec<String>,
    ) -> Result<(), StepFailure> {
        self.record_step(node_id, StepKind::Backup, StepStatus::Started);
        let after = self.ctx.settings.operation_timeout();
        let taken = bounded(StepKind::Backup, after, session.create_backup(path)).await;
        match (taken, self.ctx.settings.backup_policy) {
            (Ok(backup), _) => {
                self.record_step(node_id, StepKind::Backup, StepStatus::Completed);
                debug!(node_id, backup = %backup.display(), "configuration backed up");
                Ok(())
            }
            (Err(err), BackupPolicy::Required) => {
                self.record_step(node_id, StepKind::Backup, StepStatus::Failed);
                Err(StepFailure::new(StepKind::Backup, err.detail()))
            }
            (Err(err), BackupPolicy::BestEffort) => {
                self.record_step(node_id, StepKind::Backup, StepStatus::Skipped);
                let detail = err.detail();
                warn!(node_id, error = %detail, "backup failed; continuing with write");
                self.ctx.metrics.inc_backup_failure();
                self.ctx.events.send(Event::BackupSkipped {
                    node_id,
                    message: detail.clone(),
                });
                self.ctx.notifier.notify(Notification {
                    node_id,
                    kind: NotificationKind::Warning,
                    title: "Configuration backup skipped".into(),
                    body: detail.clone(),
                });
                warnings.push(format!("backup skipped: {detail}"));
                Ok(())
            }
        }
    }

    async fn finish(
        &self,
        node: &Node,
        log: &SyncLog,
        result: Result<Vec<String>, StepFailure>,
    ) -> NodeOutcome {
        let (status, message) = match &result {
            Ok(_) => (SyncStatus::Success, None),
            Err(failure) => (SyncStatus::Failed, Some(failure.message())),
        };
        if let Err(err) = self
            .bounded_store(
                "finish_log",
                self.ctx.store.finish_log(log.id, status, message.clone()),
            )
            .await
        {
            error!(node_id = node.id, log_id = log.id, error = %err, "failed to finish sync log");
        }
        self.ctx
            .metrics
            .inc_sync_attempt(log.log_type.as_str(), status.as_str());

        match result {
            Ok(warnings) => {
                info!(
                    node_id = node.id,
                    log_id = log.id,
                    warnings = warnings.len(),
                    "node configuration synced"
                );
                self.ctx.events.send(Event::NodeSyncSucceeded {
                    node_id: node.id,
                    log_id: log.id,
                });
                self.ctx.notifier.notify(Notification {
                    node_id: node.id,
                    kind: NotificationKind::Success,
                    title: format!("Configuration synced to {}", node.name),
                    body: log.content.clone(),
                });
                NodeOutcome {
                    node_id: node.id,
                    log_id: Some(log.id),
                    result: NodeResult::Succeeded { warnings },
                }
            }
            Err(failure) => {
                let message = failure.message();
                warn!(
                    node_id = node.id,
                    log_id = log.id,
                    step = failure.step.as_str(),
                    error = %failure.detail,
                    "node configuration sync failed"
                );
                self.ctx.events.send(Event::NodeSyncFailed {
                    node_id: node.id,
                    log_id: log.id,
                    message: message.clone(),
                });
                self.ctx.notifier.notify(Notification {
                    node_id: node.id,
                    kind: NotificationKind::Failure,
                    title: format!("Configuration sync to {} failed", node.name),
                    body: message.clone(),
                });
                NodeOutcome {
                    node_id: node.id,
                    log_id: Some(log.id),
                    result: NodeResult::Failed { error: message },
                }
            }
        }
    }

    async fn step<T, F>(&self, node_id: NodeId, step: StepKind, fut: F) -> Result<T, StepFailure>
    where
        F: Future<Output = SessionResult<T>>,
    {
        self.record_step(node_id, step, StepStatus::Started);
        let after = if step == StepKind::Connect {
            self.ctx.settings.connect_timeout()
        } else {
            self.ctx.settings.operation_timeout()
        };
        match bounded(step, after, fut).await {
            Ok(value) => {
                self.record_step(node_id, step, StepStatus::Completed);
                Ok(value)
            }
            Err(err) => {
                self.record_step(node_id, step, StepStatus::Failed);
                Err(StepFailure::new(step, err.detail()))
            }
        }
    }

    fn record_step(&self, node_id: NodeId, step: StepKind, status: StepStatus) {
        debug!(node_id, step = step.as_str(), status = status.as_str(), "sync step");
        self.ctx
            .metrics
            .inc_sync_step(step.as_str(), status.as_str());
    }

    async fn bounded_store<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let after = self.ctx.settings.operation_timeout();
        tokio::time::timeout(after, fut).await.unwrap_or_else(|_| {
            Err(StoreError::backend(
                operation,
                format!("timed out after {}s", after.as_secs()),
            ))
        })
    }
}

async fn bounded<T, F>(step: StepKind, after: Duration, fut: F) -> SessionResult<T>
where
    F: Future<Output = SessionResult<T>>,
{
    tokio::time::timeout(after, fut)
        .await
        .unwrap_or_else(|_| {
            Err(SessionError::Timeout {
                operation: step.as_str(),
                after,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use dnsfleet_config::SyncSettings;
    use dnsfleet_core::{NodeStore, SyncLogStore};
    use dnsfleet_events::EventBus;
    use dnsfleet_telemetry::Metrics;
    use dnsfleet_test_support::fixtures::{CONFIG_PATH, address, domain_set};
    use dnsfleet_test_support::{FakeRemote, MemoryStore, RecordingNotifier, RemoteFault};

    struct Harness {
        store: Arc<MemoryStore>,
        remote: FakeRemote,
        notifier: Arc<RecordingNotifier>,
        metrics: Metrics,
        worker: SyncWorker,
    }

    fn harness(settings: SyncSettings) -> anyhow::Result<Harness> {
        let store = Arc::new(MemoryStore::with_nodes(2));
        let remote = FakeRemote::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let metrics = Metrics::new()?;
        let ctx = SyncContext::new(
            store.clone(),
            Arc::new(remote.clone()),
            notifier.clone(),
            EventBus::new(),
            metrics.clone(),
            settings,
        );
        Ok(Harness {
            store,
            remote,
            notifier,
            metrics,
            worker: SyncWorker::new(ctx, NodeLocks::new()),
        })
    }

    async fn node(h: &Harness, id: NodeId) -> anyhow::Result<Node> {
        h.store
            .find_node(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("node {id} missing"))
    }

    #[test]
    fn failure_message_names_the_step() {
        let failure = StepFailure::new(StepKind::Connect, "connection error: node 2: refused");
        assert_eq!(
            failure.message(),
            "connect: connection error: node 2: refused"
        );
    }

    #[tokio::test]
    async fn upsert_writes_merged_document() -> anyhow::Result<()> {
        let h = harness(SyncSettings::default())?;
        h.remote
            .put_file(1, CONFIG_PATH, "bind :53\naddress /a.com/2.2.2.2\n");
        let node = node(&h, 1).await?;

        let outcome = h
            .worker
            .run(&node, &NodeChange::Upsert(address("a.com", "1.1.1.1")), None)
            .await;

        assert!(outcome.succeeded());
        let written = h.remote.file(1, CONFIG_PATH).unwrap_or_default();
        assert!(written.contains("bind :53"));
        assert_eq!(written.matches("/a.com/").count(), 1);
        assert!(written.contains("address /a.com/1.1.1.1"));
        assert_eq!(h.remote.backups(1).len(), 1);
        assert_eq!(h.remote.leaked_sessions(), 0);
        assert_eq!(h.remote.open_sessions(), 0);

        let log_id = outcome.log_id.ok_or_else(|| anyhow::anyhow!("no log"))?;
        let log = h.store.find_log(log_id).await?;
        assert_eq!(log.map(|l| l.status), Some(SyncStatus::Success));
        assert_eq!(h.metrics.sync_attempts("address", "success"), 1);
        assert_eq!(h.notifier.kinds_for(1), vec![NotificationKind::Success]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_starts_from_empty_document() -> anyhow::Result<()> {
        let h = harness(SyncSettings::default())?;
        let node = node(&h, 1).await?;
        let outcome = h
            .worker
            .run(&node, &NodeChange::Upsert(address("a.com", "1.1.1.1")), None)
            .await;
        assert!(outcome.succeeded());
        assert!(h.remote.backups(1).is_empty());
        assert_eq!(h.metrics.sync_steps("backup", "skipped"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn read_failure_never_writes() -> anyhow::Result<()> {
        let h = harness(SyncSettings::default())?;
        h.remote.put_file(1, CONFIG_PATH, "bind :53\n");
        h.remote.inject(1, RemoteFault::Read);
        let node = node(&h, 1).await?;

        let outcome = h
            .worker
            .run(&node, &NodeChange::Upsert(address("a.com", "1.1.1.1")), None)
            .await;

        assert!(outcome.error().is_some_and(|e| e.starts_with("read:")));
        assert!(h.remote.writes(1).is_empty());
        assert_eq!(h.notifier.kinds_for(1), vec![NotificationKind::Failure]);
        assert_eq!(h.remote.leaked_sessions(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn required_backup_policy_makes_backup_fatal() -> anyhow::Result<()> {
        let settings = SyncSettings {
            backup_policy: BackupPolicy::Required,
            ..SyncSettings::default()
        };
        let h = harness(settings)?;
        h.remote.put_file(1, CONFIG_PATH, "bind :53\n");
        h.remote.inject(1, RemoteFault::Backup);
        let node = node(&h, 1).await?;

        let outcome = h
            .worker
            .run(&node, &NodeChange::Upsert(address("a.com", "1.1.1.1")), None)
            .await;

        assert!(outcome.error().is_some_and(|e| e.starts_with("backup:")));
        assert_eq!(h.remote.file(1, CONFIG_PATH).as_deref(), Some("bind :53\n"));
        Ok(())
    }

    #[tokio::test]
    async fn domain_set_removal_tolerates_file_errors() -> anyhow::Result<()> {
        let h = harness(SyncSettings::default())?;
        let set = domain_set("gfwlist", &["a.com"]);
        let node = node(&h, 2).await?;
        assert!(h.worker.run(&node, &NodeChange::Upsert(set.clone()), None).await.succeeded());
        assert!(h.remote.file(2, "/etc/smartdns/gfwlist.conf").is_some());

        h.remote.inject(2, RemoteFault::Remove);
        let change = NodeChange::remove(&set, Path::new("/etc/smartdns"));
        let outcome = h.worker.run(&node, &change, None).await;
        match &outcome.result {
            NodeResult::Succeeded { warnings } => {
                assert_eq!(warnings.len(), 1);
                assert!(warnings[0].starts_with("remove_set_files:"));
            }
            other => anyhow::bail!("unexpected result {other:?}"),
        }
        let written = h.remote.file(2, CONFIG_PATH).unwrap_or_default();
        assert!(!written.contains("domain-set"));
        Ok(())
    }

    #[tokio::test]
    async fn failed_reload_is_a_warning() -> anyhow::Result<()> {
        let settings = SyncSettings {
            reload_command: Some("systemctl restart smartdns".into()),
            ..SyncSettings::default()
        };
        let h = harness(settings)?;
        h.remote.inject(1, RemoteFault::Execute);
        let node = node(&h, 1).await?;

        let outcome = h
            .worker
            .run(&node, &NodeChange::Upsert(address("a.com", "1.1.1.1")), None)
            .await;

        assert!(outcome.succeeded());
        assert_eq!(h.remote.commands(1), vec!["systemctl restart smartdns"]);
        assert_eq!(h.metrics.sync_steps("reload", "failed"), 1);
        let logs = h.store.all_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, SyncStatus::Success);
        Ok(())
    }
}
