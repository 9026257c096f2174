// Tracker (bd) output: issues, convoys and merge-request beads

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::models::{IssueDetail, MergeRequest, RefineryStatus};

const REFINERY_HISTORY: usize = 10;

/// `bd dep list <id> -t tracks --json` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackedDep {
    pub id: String,
}

/// Rig name from a bead id prefix (`kt-abc` is rig `kt`).
pub fn extract_rig(id: &str) -> &str {
    match id.split_once('-') {
        Some((rig, _)) => rig,
        None => "unknown",
    }
}

pub fn merge_request(issue: &IssueDetail) -> MergeRequest {
    MergeRequest {
        id: issue.id.clone(),
        bead_id: issue.id.clone(),
        title: issue.title.clone(),
        status: issue.status.clone(),
    }
}

/// In-progress issues keyed by assignee; unassigned issues are skipped.
pub fn assigned_by_owner(issues: Vec<IssueDetail>) -> HashMap<String, IssueDetail> {
    issues
        .into_iter()
        .filter(|i| !i.assignee.is_empty())
        .map(|i| (i.assignee.clone(), i))
        .collect()
}

/// `(done, total)` over tracked issues.
pub fn convoy_counts(issues: &[IssueDetail]) -> (usize, usize) {
    (issues.iter().filter(|i| i.is_done()).count(), issues.len())
}

fn merged(mr: &MergeRequest) -> bool {
    mr.status.eq_ignore_ascii_case("completed") || mr.status.eq_ignore_ascii_case("merged")
}

/// Merge queues per rig, sorted by rig.
///
/// A rig appears when it has a refinery session or any open or in-progress
/// merge request. Completed requests only feed history.
pub fn build_refinery(
    sessions: &BTreeMap<String, bool>,
    open: &[IssueDetail],
    in_progress: &[IssueDetail],
    completed: &[IssueDetail],
) -> Vec<RefineryStatus> {
    let mut rigs: BTreeMap<&str, RefineryStatus> = BTreeMap::new();
    let blank = |rig: &str, running: bool| RefineryStatus {
        rig: rig.to_string(),
        running,
        queue: Vec::new(),
        current: None,
        queue_depth: 0,
        history: Vec::new(),
        success_rate: None,
    };

    for (rig, running) in sessions {
        rigs.insert(rig.as_str(), blank(rig, *running));
    }
    for issue in open {
        let rig = extract_rig(&issue.id);
        rigs.entry(rig)
            .or_insert_with(|| blank(rig, false))
            .queue
            .push(merge_request(issue));
    }
    for issue in in_progress {
        let rig = extract_rig(&issue.id);
        let status = rigs.entry(rig).or_insert_with(|| blank(rig, false));
        if status.current.is_none() {
            status.current = Some(merge_request(issue));
        }
    }
    for issue in completed {
        if let Some(status) = rigs.get_mut(extract_rig(&issue.id))
            && status.history.len() < REFINERY_HISTORY
        {
            status.history.push(merge_request(issue));
        }
    }

    rigs.into_values()
        .map(|mut status| {
            status.queue_depth = status.queue.len() + usize::from(status.current.is_some());
            if !status.history.is_empty() {
                let passed = status.history.iter().filter(|mr| merged(mr)).count();
                status.success_rate =
                    Some(passed as f64 / status.history.len() as f64 * 100.0);
            }
            status
        })
        .collect()
}
