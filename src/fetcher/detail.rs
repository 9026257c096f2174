// Selected-agent detail: worktree git state and recent pane output

use crate::models::CommitInfo;

pub const COMMIT_COUNT: usize = 5;
pub const OUTPUT_LINES: usize = 15;

/// Parses `git log --oneline` output.
pub fn parse_commits(output: &str) -> Vec<CommitInfo> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (hash, message) = line.split_once(' ').unwrap_or((line, ""));
            CommitInfo {
                hash: hash.to_string(),
                message: message.to_string(),
            }
        })
        .collect()
}
