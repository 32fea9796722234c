//! Output renderers for CLI commands.

use std::fmt::Write as _;

use dnsfleet_core::{Node, SyncLog, SyncStats};
use dnsfleet_sync::{HealthReport, NodeResult, SyncReport};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::{AppError, AppResult};

const CONTENT_WIDTH: usize = 48;

pub(crate) fn emit(text: &str) {
    println!("{}", text.trim_end());
}

fn json<T: Serialize + ?Sized>(value: &T) -> AppResult<String> {
    serde_json::to_string_pretty(value).map_err(|source| AppError::Json {
        operation: "format output",
        path: None,
        source,
    })
}

pub(crate) fn render_report(report: &SyncReport, format: OutputFormat) -> AppResult<String> {
    if format == OutputFormat::Json {
        return json(report);
    }
    let mut out = format!("{:<6} {:<8} {:<10} DETAIL\n", "NODE", "LOG", "RESULT");
    for outcome in &report.outcomes {
        let log = outcome
            .log_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let (label, detail) = match &outcome.result {
            NodeResult::Succeeded { warnings } => ("success", warnings.join("; ")),
            NodeResult::Failed { error } => ("failed", error.clone()),
            NodeResult::Cancelled => ("cancelled", String::new()),
        };
        let _ = writeln!(
            out,
            "{:<6} {:<8} {:<10} {}",
            outcome.node_id, log, label, detail
        );
    }
    let _ = writeln!(
        out,
        "{} succeeded, {} failed, {} cancelled",
        report.succeeded(),
        report.failed(),
        report.cancelled()
    );
    Ok(out)
}

pub(crate) fn render_nodes(nodes: &[Node], format: OutputFormat) -> AppResult<String> {
    if format == OutputFormat::Json {
        return json(nodes);
    }
    let mut out = format!(
        "{:<6} {:<20} {:<28} {:<8} CONFIG\n",
        "ID", "NAME", "ADDRESS", "STATUS"
    );
    for node in nodes {
        let address = format!("{}@{}:{}", node.username, node.host, node.port);
        let config = node
            .config_path
            .as_ref()
            .map_or_else(|| "(default)".to_string(), |path| path.display().to_string());
        let _ = writeln!(
            out,
            "{:<6} {:<20} {:<28} {:<8} {}",
            node.id,
            node.name,
            address,
            node.status.as_str(),
            config
        );
    }
    Ok(out)
}

pub(crate) fn render_logs(logs: &[SyncLog], format: OutputFormat) -> AppResult<String> {
    if format == OutputFormat::Json {
        return json(logs);
    }
    let mut out = format!(
        "{:<8} {:<6} {:<8} {:<12} {:<8} {:<20} CONTENT\n",
        "ID", "NODE", "ACTION", "TYPE", "STATUS", "UPDATED"
    );
    for log in logs {
        let _ = writeln!(
            out,
            "{:<8} {:<6} {:<8} {:<12} {:<8} {:<20} {}",
            log.id,
            log.node_id,
            log.action.as_str(),
            log.log_type.as_str(),
            log.status.as_str(),
            log.updated_at.format("%Y-%m-%d %H:%M:%S"),
            truncate(&log.content, CONTENT_WIDTH)
        );
        if let Some(error) = &log.error {
            let _ = writeln!(out, "{:>8} error: {error}", "");
        }
    }
    Ok(out)
}

pub(crate) fn render_stats(stats: &SyncStats, format: OutputFormat) -> AppResult<String> {
    if format == OutputFormat::Json {
        return json(stats);
    }
    Ok(format!(
        "pending: {}\nsuccess: {}\nfailed: {}\ntotal: {}\n",
        stats.pending, stats.success, stats.failed, stats.total
    ))
}

pub(crate) fn render_health(report: &HealthReport, format: OutputFormat) -> AppResult<String> {
    if format == OutputFormat::Json {
        return json(report);
    }
    let mut out = format!("{:<6} {:<20} {:<8} DETAIL\n", "NODE", "NAME", "STATUS");
    for node in &report.nodes {
        let status = if node.changed {
            format!("{}*", node.status.as_str())
        } else {
            node.status.as_str().to_string()
        };
        let _ = writeln!(
            out,
            "{:<6} {:<20} {:<8} {}",
            node.node_id,
            node.name,
            status,
            node.detail.as_deref().unwrap_or("")
        );
    }
    Ok(out)
}

fn truncate(text: &str, width: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() <= width && !text.contains('\n') {
        return line.to_string();
    }
    let mut cut: String = line.chars().take(width.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnsfleet_sync::NodeOutcome;

    fn report() -> SyncReport {
        SyncReport {
            outcomes: vec![
                NodeOutcome {
                    node_id: 1,
                    log_id: Some(10),
                    result: NodeResult::Succeeded {
                        warnings: vec!["backup skipped: disk full".into()],
                    },
                },
                NodeOutcome {
                    node_id: 2,
                    log_id: None,
                    result: NodeResult::Cancelled,
                },
            ],
        }
    }

    #[test]
    fn report_table_lists_every_node() -> AppResult<()> {
        let text = render_report(&report(), OutputFormat::Table)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("1 "));
        assert!(lines[1].ends_with("backup skipped: disk full"));
        assert!(lines[2].contains("cancelled"));
        assert_eq!(lines[3], "1 succeeded, 0 failed, 1 cancelled");
        Ok(())
    }

    #[test]
    fn report_json_flattens_the_result() -> AppResult<()> {
        let text = render_report(&report(), OutputFormat::Json)?;
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|source| AppError::Json {
                operation: "parse output",
                path: None,
                source,
            })?;
        assert_eq!(value["outcomes"][0]["result"], "succeeded");
        assert_eq!(value["outcomes"][1]["log_id"], serde_json::Value::Null);
        Ok(())
    }

    #[test]
    fn long_content_is_truncated() {
        let long = "domain-set -name gfwlist -file /etc/smartdns/gfwlist.conf -extra";
        let cut = truncate(long, 20);
        assert_eq!(cut.chars().count(), 20);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate("a\nb", 20), "a...");
        assert_eq!(truncate("short", 20), "short");
    }

    #[test]
    fn stats_table_shows_all_counters() -> AppResult<()> {
        let stats = SyncStats {
            pending: 1,
            success: 2,
            failed: 3,
            total: 6,
        };
        let text = render_stats(&stats, OutputFormat::Table)?;
        assert_eq!(text, "pending: 1\nsuccess: 2\nfailed: 3\ntotal: 6\n");
        Ok(())
    }
}
