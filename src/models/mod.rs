// Domain models: session telemetry and workspace data published to subscribers

mod session;
mod workspace;

pub use session::{
    HealthStatus, LoadTier, ProcessRecord, SessionAnchor, SessionHealth, SessionSnapshot,
    SparkCell, epoch_to_utc,
};
pub use workspace::{
    AgentActivity, AgentDetail, AgentRole, AgentState, CheckRun, CommitInfo, ConvoyInfo,
    ConvoyProgress, IssueDetail, MailMessage, MergeRequest, PrAuthor, PullRequest,
    RefineryStatus, SessionInfo, StatusReport, TownAgent, TownStatus, WitnessDetail,
    WitnessState,
};
