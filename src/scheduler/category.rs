// Poll categories and their single-flight state

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollCategory {
    Status,
    Agents,
    Convoys,
    Mail,
    Refinery,
    Resources,
    Witnesses,
    PullRequests,
    AgentDetail,
}

impl PollCategory {
    pub const ALL: [PollCategory; 9] = [
        PollCategory::Status,
        PollCategory::Agents,
        PollCategory::Convoys,
        PollCategory::Mail,
        PollCategory::Refinery,
        PollCategory::Resources,
        PollCategory::Witnesses,
        PollCategory::PullRequests,
        PollCategory::AgentDetail,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PollCategory::Status => "status",
            PollCategory::Agents => "agents",
            PollCategory::Convoys => "convoys",
            PollCategory::Mail => "mail",
            PollCategory::Refinery => "refinery",
            PollCategory::Resources => "resources",
            PollCategory::Witnesses => "witnesses",
            PollCategory::PullRequests => "pull_requests",
            PollCategory::AgentDetail => "agent_detail",
        }
    }

    /// Only polled while an agent is selected.
    pub fn is_on_demand(self) -> bool {
        matches!(self, PollCategory::AgentDetail)
    }

    pub fn default_interval(self) -> Duration {
        let secs = match self {
            PollCategory::Status => 10,
            PollCategory::Agents => 5,
            PollCategory::Convoys => 15,
            PollCategory::Mail => 30,
            PollCategory::Refinery => 15,
            PollCategory::Resources => 30,
            PollCategory::Witnesses => 15,
            PollCategory::PullRequests => 60,
            PollCategory::AgentDetail => 10,
        };
        Duration::from_secs(secs)
    }
}

impl fmt::Display for PollCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Idle → Fetching → Idle. `generation` advances on every completion so
/// timers armed for an earlier cycle can be recognised and dropped.
#[derive(Debug, Clone)]
pub struct CategoryState {
    pub category: PollCategory,
    pub interval: Duration,
    pub in_flight: bool,
    pub generation: u64,
    pub last_completed: Option<Instant>,
}

impl CategoryState {
    pub fn new(category: PollCategory, interval: Duration) -> Self {
        Self {
            category,
            interval,
            in_flight: false,
            generation: 0,
            last_completed: None,
        }
    }

    /// False if a fetch is already running.
    pub fn try_begin(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Returns the generation the next timer belongs to.
    pub fn complete(&mut self, at: Instant) -> u64 {
        self.in_flight = false;
        self.generation += 1;
        self.last_completed = Some(at);
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}
