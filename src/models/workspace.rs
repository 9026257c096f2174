// Workspace models: orchestration CLI output (gt, bd, gh) and the views derived from it.
// Types mirroring CLI JSON keep the CLI's field naming so they round-trip unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `gt status --json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TownStatus {
    #[serde(default)]
    pub agents: Vec<TownAgent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TownAgent {
    pub name: String,
    #[serde(default)]
    pub running: bool,
    /// running, stopped, idle
    #[serde(default)]
    pub state: String,
}

/// One multiplexer session with its most recent window activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub name: String,
    pub activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub town: Option<TownStatus>,
    pub sessions: Vec<SessionInfo>,
    /// Set when one of the two sources failed but the other answered.
    pub partial_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Polecat,
    Witness,
    Refinery,
    Mayor,
}

impl AgentRole {
    pub fn from_session_suffix(name: &str) -> Self {
        match name {
            "witness" => AgentRole::Witness,
            "refinery" => AgentRole::Refinery,
            "mayor" => AgentRole::Mayor,
            _ => AgentRole::Polecat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Working,
    Stale,
    Stuck,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDetail {
    pub name: String,
    pub rig: String,
    pub role: AgentRole,
    pub state: AgentState,
    pub age_secs: u64,
    pub issue_id: Option<String>,
    pub issue_title: Option<String>,
}

/// `bd list --type=convoy --json` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvoyInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: String,
}

/// `bd show` / `bd list` issue entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueDetail {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub updated_at: String,
}

impl IssueDetail {
    pub fn is_done(&self) -> bool {
        self.status.eq_ignore_ascii_case("completed") || self.status.eq_ignore_ascii_case("closed")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvoyProgress {
    pub convoy: ConvoyInfo,
    /// None when the tracked issues could not be fetched this cycle.
    pub done: Option<usize>,
    pub total: Option<usize>,
    pub issues: Vec<IssueDetail>,
}

/// `gt mail inbox --json` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub priority: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub thread_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub id: String,
    pub bead_id: String,
    pub title: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineryStatus {
    pub rig: String,
    pub running: bool,
    pub queue: Vec<MergeRequest>,
    pub current: Option<MergeRequest>,
    pub queue_depth: usize,
    pub history: Vec<MergeRequest>,
    pub success_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WitnessState {
    Alive,
    Stale,
    Dead,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessDetail {
    pub rig: String,
    pub state: WitnessState,
    pub has_session: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub session_created: Option<DateTime<Utc>>,
    pub polecat_count: usize,
}

/// `gh pr list --json ...` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: PrAuthor,
    #[serde(default)]
    pub head_ref_name: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub review_decision: String,
    #[serde(default)]
    pub mergeable: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub changed_files: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status_check_rollup: Vec<CheckRun>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrAuthor {
    #[serde(default)]
    pub login: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRun {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub conclusion: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub hash: String,
    pub message: String,
}

/// Branch, recent commits and pane output of the selected agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentActivity {
    pub rig: String,
    pub name: String,
    pub branch: String,
    pub commits: Vec<CommitInfo>,
    pub output: String,
}
