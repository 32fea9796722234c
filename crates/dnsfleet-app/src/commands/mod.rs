//! Command handlers grouped by concern.

pub(crate) mod entities;
pub(crate) mod nodes;
pub(crate) mod serve;
pub(crate) mod sync;

use dnsfleet_sync::SyncTicket;

use crate::cli::OutputFormat;
use crate::error::{AppError, AppResult};
use crate::output;

/// Wait for a job, print its report and fail when any node failed.
pub(crate) async fn finish_job(ticket: SyncTicket, format: OutputFormat) -> AppResult<()> {
    let job_id = ticket.job_id();
    tracing::debug!(%job_id, "waiting for sync job");
    let report = ticket.wait().await.map_err(AppError::sync("wait"))?;
    output::emit(&output::render_report(&report, format)?);
    let failed = report.failed();
    if failed > 0 {
        return Err(AppError::PartialFailure {
            failed,
            total: report.outcomes.len(),
        });
    }
    Ok(())
}
