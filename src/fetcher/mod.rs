// Per-category data acquisition through the gt, bd, gh, git and tmux CLIs

mod beads;
mod detail;
mod github;
mod tmux;

pub use beads::{TrackedDep, assigned_by_owner, build_refinery, convoy_counts, extract_rig};
pub use detail::{COMMIT_COUNT, OUTPUT_LINES, parse_commits};
pub use github::{PR_FIELDS, PR_LIMIT};
pub use tmux::{
    SESSION_FORMAT, TmuxSession, agent_state, build_agents, build_witnesses, parse_session_list,
    refinery_sessions, witness_state,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::instrument;

use crate::command::{CommandError, CommandRunner, CommandSpec};
use crate::models::{
    AgentActivity, AgentDetail, ConvoyInfo, ConvoyProgress, IssueDetail, MailMessage,
    PullRequest, RefineryStatus, SessionSnapshot, StatusReport, TownStatus, WitnessDetail,
};
use crate::telemetry;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{context}: {source}")]
    Command {
        context: &'static str,
        #[source]
        source: CommandError,
    },
    #[error("{context}: unreadable output: {source}")]
    Parse {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("fetch panicked: {0}")]
    Panicked(String),
    #[error("no agent selected")]
    NoTarget,
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Command { source, .. } if source.is_timeout())
    }
}

/// Budgets for the three classes of external command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTimeouts {
    pub tmux: Duration,
    /// gt, bd and git.
    pub tracker: Duration,
    pub github: Duration,
}

impl Default for CommandTimeouts {
    fn default() -> Self {
        Self {
            tmux: Duration::from_secs(2),
            tracker: Duration::from_secs(15),
            github: Duration::from_secs(10),
        }
    }
}

fn parse_json<T: DeserializeOwned>(context: &'static str, raw: &str) -> Result<T, FetchError> {
    serde_json::from_str(raw.trim()).map_err(|source| FetchError::Parse { context, source })
}

/// Like `parse_json`, but empty or `null` output is an empty list.
fn parse_list<T: DeserializeOwned>(context: &'static str, raw: &str) -> Result<Vec<T>, FetchError> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" {
        return Ok(Vec::new());
    }
    parse_json(context, raw)
}

pub struct Fetcher<R> {
    runner: Arc<R>,
    town_root: PathBuf,
    timeouts: CommandTimeouts,
}

impl<R: CommandRunner> Fetcher<R> {
    pub fn new(runner: Arc<R>, town_root: impl Into<PathBuf>, timeouts: CommandTimeouts) -> Self {
        Self {
            runner,
            town_root: town_root.into(),
            timeouts,
        }
    }

    pub fn runner(&self) -> &Arc<R> {
        &self.runner
    }

    pub fn town_root(&self) -> &Path {
        &self.town_root
    }

    pub fn timeouts(&self) -> CommandTimeouts {
        self.timeouts
    }

    async fn exec(&self, context: &'static str, spec: CommandSpec) -> Result<String, FetchError> {
        self.runner
            .run(&spec)
            .await
            .map_err(|source| FetchError::Command { context, source })
    }

    fn gt<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> CommandSpec {
        CommandSpec::new("gt", self.timeouts.tracker).args(args)
    }

    /// bd runs in the workspace root and may exit non-zero with warnings.
    fn bd<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new("bd", self.timeouts.tracker)
            .args(args)
            .current_dir(&self.town_root)
            .accept_partial_output()
    }

    fn tmux<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> CommandSpec {
        CommandSpec::new("tmux", self.timeouts.tmux).args(args)
    }

    fn worktree(&self, rig: &str, name: &str) -> PathBuf {
        self.town_root.join(rig).join("polecats").join(name)
    }

    async fn sessions(&self) -> Result<Vec<TmuxSession>, FetchError> {
        let out = self
            .exec(
                "listing tmux sessions",
                self.tmux(["list-sessions", "-F", SESSION_FORMAT]),
            )
            .await?;
        Ok(parse_session_list(&out))
    }

    async fn bd_issues(
        &self,
        context: &'static str,
        args: Vec<String>,
    ) -> Result<Vec<IssueDetail>, FetchError> {
        let out = self.exec(context, self.bd(args)).await?;
        parse_list(context, &out)
    }

    /// Town status and session list; one failing half is reported as a partial error.
    #[instrument(skip(self), fields(operation = "fetch_status"))]
    pub async fn status(&self) -> Result<StatusReport, FetchError> {
        let town = async {
            let out = self
                .exec("running gt status", self.gt(["status", "--json"]))
                .await?;
            parse_json::<TownStatus>("parsing gt status", &out)
        };
        let (town, sessions) = tokio::join!(town, self.sessions());

        match (town, sessions) {
            (Ok(town), Ok(sessions)) => Ok(StatusReport {
                town: Some(town),
                sessions: sessions.iter().map(TmuxSession::info).collect(),
                partial_error: None,
            }),
            (Ok(town), Err(e)) => Ok(StatusReport {
                town: Some(town),
                sessions: Vec::new(),
                partial_error: Some(e.to_string()),
            }),
            (Err(e), Ok(sessions)) => Ok(StatusReport {
                town: None,
                sessions: sessions.iter().map(TmuxSession::info).collect(),
                partial_error: Some(e.to_string()),
            }),
            (Err(e), Err(_)) => Err(e),
        }
    }

    #[instrument(skip(self), fields(operation = "fetch_agents"))]
    pub async fn agents(&self) -> Result<Vec<AgentDetail>, FetchError> {
        let sessions = self.sessions().await?;
        let assigned = match self
            .bd_issues(
                "listing in-progress issues",
                vec!["list".into(), "--status=in_progress".into(), "--json".into()],
            )
            .await
        {
            Ok(issues) => assigned_by_owner(issues),
            Err(e) => {
                tracing::debug!(error = %e, "agent issue enrichment unavailable");
                Default::default()
            }
        };
        Ok(build_agents(&sessions, &assigned, Utc::now()))
    }

    /// Open convoys with progress over their tracked issues.
    #[instrument(skip(self), fields(operation = "fetch_convoys"))]
    pub async fn convoys(&self) -> Result<Vec<ConvoyProgress>, FetchError> {
        let out = self
            .exec(
                "listing convoys",
                self.bd(["list", "--type=convoy", "--status=open", "--json"]),
            )
            .await?;
        let convoys: Vec<ConvoyInfo> = parse_list("parsing convoy list", &out)?;

        let mut progress = Vec::with_capacity(convoys.len());
        for convoy in convoys {
            let entry = match self.tracked_issues(&convoy.id).await {
                Ok(issues) => {
                    let (done, total) = convoy_counts(&issues);
                    ConvoyProgress {
                        convoy,
                        done: Some(done),
                        total: Some(total),
                        issues,
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, convoy = %convoy.id, "tracked issues unavailable");
                    ConvoyProgress {
                        convoy,
                        done: None,
                        total: None,
                        issues: Vec::new(),
                    }
                }
            };
            progress.push(entry);
        }
        Ok(progress)
    }

    async fn tracked_issues(&self, convoy_id: &str) -> Result<Vec<IssueDetail>, FetchError> {
        let out = self
            .exec(
                "listing tracked issues",
                self.bd(["dep", "list", convoy_id, "-t", "tracks", "--json"]),
            )
            .await?;
        let deps: Vec<TrackedDep> = parse_list("parsing tracked issues", &out)?;
        if deps.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = Vec::with_capacity(deps.len() + 2);
        args.push("show".to_string());
        args.extend(deps.into_iter().map(|d| d.id));
        args.push("--json".to_string());
        self.bd_issues("fetching issue details", args).await
    }

    #[instrument(skip(self), fields(operation = "fetch_mail"))]
    pub async fn mail(&self) -> Result<Vec<MailMessage>, FetchError> {
        let out = self
            .exec(
                "fetching mail",
                self.gt(["mail", "inbox", "--all", "--json"]),
            )
            .await?;
        parse_list("parsing mail", &out)
    }

    async fn merge_requests(&self, status: &str) -> Vec<IssueDetail> {
        let args = vec![
            "list".to_string(),
            "--type=mr".to_string(),
            format!("--status={status}"),
            "--json".to_string(),
        ];
        self.bd_issues("listing merge requests", args)
            .await
            .unwrap_or_else(|e| {
                tracing::debug!(error = %e, status, "merge request listing unavailable");
                Vec::new()
            })
    }

    #[instrument(skip(self), fields(operation = "fetch_refinery"))]
    pub async fn refinery(&self) -> Result<Vec<RefineryStatus>, FetchError> {
        let sessions = self.sessions().await?;
        let (open, in_progress, completed) = tokio::join!(
            self.merge_requests("open"),
            self.merge_requests("in_progress"),
            self.merge_requests("completed"),
        );
        Ok(build_refinery(
            &refinery_sessions(&sessions),
            &open,
            &in_progress,
            &completed,
        ))
    }

    #[instrument(skip(self), fields(operation = "fetch_witnesses"))]
    pub async fn witnesses(&self) -> Result<Vec<WitnessDetail>, FetchError> {
        let sessions = self.sessions().await?;
        Ok(build_witnesses(&sessions, Utc::now()))
    }

    #[instrument(skip(self), fields(operation = "fetch_pull_requests"))]
    pub async fn pull_requests(&self) -> Result<Vec<PullRequest>, FetchError> {
        let spec = CommandSpec::new("gh", self.timeouts.github).args([
            "pr".to_string(),
            "list".to_string(),
            "--json".to_string(),
            PR_FIELDS.to_string(),
            "--limit".to_string(),
            PR_LIMIT.to_string(),
        ]);
        let out = self.exec("listing pull requests", spec).await?;
        parse_list("parsing pull requests", &out)
    }

    #[instrument(skip(self), fields(operation = "fetch_resources"))]
    pub async fn resources(&self) -> Result<Vec<SessionSnapshot>, FetchError> {
        telemetry::collect_resources(self.runner.as_ref(), self.timeouts.tmux, Utc::now())
            .await
            .map_err(|source| FetchError::Command {
                context: "sampling session resources",
                source,
            })
    }

    /// Branch, recent commits and pane output; each part is empty when unavailable.
    #[instrument(skip(self), fields(operation = "fetch_agent_detail"))]
    pub async fn agent_detail(&self, rig: &str, name: &str) -> AgentActivity {
        let worktree = self.worktree(rig, name).to_string_lossy().into_owned();
        let git = |args: Vec<String>| {
            CommandSpec::new("git", self.timeouts.tracker)
                .args(["-C".to_string(), worktree.clone()])
                .args(args)
        };
        let branch = self.exec(
            "reading branch",
            git(vec!["branch".into(), "--show-current".into()]),
        );
        let log = self.exec(
            "reading commits",
            git(vec![
                "log".into(),
                "--oneline".into(),
                format!("-n{COMMIT_COUNT}"),
            ]),
        );
        let session = format!("gt-{rig}-{name}");
        let start = format!("-S-{OUTPUT_LINES}");
        let output = self.exec(
            "capturing pane",
            self.tmux(["capture-pane", "-t", session.as_str(), "-p", start.as_str()]),
        );
        let (branch, log, output) = tokio::join!(branch, log, output);

        AgentActivity {
            rig: rig.to_string(),
            name: name.to_string(),
            branch: branch.map(|b| b.trim().to_string()).unwrap_or_default(),
            commits: log.map(|l| parse_commits(&l)).unwrap_or_default(),
            output: output.unwrap_or_default(),
        }
    }
}
