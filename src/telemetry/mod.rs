// Session resource telemetry: ps/tmux parsing, process tree aggregation, health

mod history;
mod panes;
mod ps;
mod tree;

pub use history::{HISTORY_CAPACITY, HealthThresholds, HealthTracker, SessionHistory, classify};
pub use panes::{PANE_FORMAT, parse_session_panes};
pub use ps::parse_process_table;
pub use tree::{ProcessTable, aggregate};

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::command::{CommandError, CommandRunner, CommandSpec};
use crate::models::SessionSnapshot;

pub fn pane_listing(timeout: Duration) -> CommandSpec {
    CommandSpec::new("tmux", timeout).args(["list-panes", "-a", "-F", PANE_FORMAT])
}

/// Forced to the C locale so `pcpu` always uses a decimal point.
pub fn process_listing(timeout: Duration) -> CommandSpec {
    CommandSpec::new("ps", timeout)
        .args(["-ax", "-o", "pid=,ppid=,pcpu=,rss="])
        .env("LC_ALL", "C")
}

/// One sampling cycle: pane listing, then the process table if any session exists.
#[instrument(skip(runner), fields(operation = "collect_resources"))]
pub async fn collect_resources<R: CommandRunner>(
    runner: &R,
    timeout: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<SessionSnapshot>, CommandError> {
    let panes = runner.run(&pane_listing(timeout)).await?;
    let anchors = parse_session_panes(&panes);
    if anchors.is_empty() {
        return Ok(Vec::new());
    }

    let listing = runner.run(&process_listing(timeout)).await?;
    let table = ProcessTable::new(parse_process_table(&listing));
    tracing::debug!(
        sessions = anchors.len(),
        processes = table.len(),
        "sampled process table"
    );
    Ok(aggregate(&table, &anchors, now))
}
