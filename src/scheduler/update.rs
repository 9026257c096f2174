// Published fetch results and the subscriber-side retained view

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PollCategory;
use crate::models::{
    AgentActivity, AgentDetail, ConvoyProgress, MailMessage, PullRequest, RefineryStatus,
    SessionHealth, StatusReport, WitnessDetail,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum Payload {
    Status(StatusReport),
    Agents(Vec<AgentDetail>),
    Convoys(Vec<ConvoyProgress>),
    Mail(Vec<MailMessage>),
    Refinery(Vec<RefineryStatus>),
    Resources(Vec<SessionHealth>),
    Witnesses(Vec<WitnessDetail>),
    PullRequests(Vec<PullRequest>),
    AgentDetail(AgentActivity),
}

impl Payload {
    pub fn category(&self) -> PollCategory {
        match self {
            Payload::Status(_) => PollCategory::Status,
            Payload::Agents(_) => PollCategory::Agents,
            Payload::Convoys(_) => PollCategory::Convoys,
            Payload::Mail(_) => PollCategory::Mail,
            Payload::Refinery(_) => PollCategory::Refinery,
            Payload::Resources(_) => PollCategory::Resources,
            Payload::Witnesses(_) => PollCategory::Witnesses,
            Payload::PullRequests(_) => PollCategory::PullRequests,
            Payload::AgentDetail(_) => PollCategory::AgentDetail,
        }
    }
}

/// One completed cycle of one category. Exactly one of `data`/`error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    pub category: PollCategory,
    pub completed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub data: Option<Payload>,
    pub error: Option<String>,
    pub timed_out: bool,
}

impl Update {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// What a display shows for one category: the last good data plus the latest error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryView {
    pub category: PollCategory,
    pub data: Option<Payload>,
    pub error: Option<String>,
    pub timed_out: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_attempt_at: DateTime<Utc>,
}

/// Retains the last successful payload per category across failed cycles.
#[derive(Debug, Default)]
pub struct DashboardView {
    categories: BTreeMap<PollCategory, CategoryView>,
}

impl DashboardView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, update: Update) -> &CategoryView {
        let view = self
            .categories
            .entry(update.category)
            .or_insert_with(|| CategoryView {
                category: update.category,
                data: None,
                error: None,
                timed_out: false,
                last_success_at: None,
                last_attempt_at: update.completed_at,
            });

        view.last_attempt_at = update.completed_at;
        view.timed_out = update.timed_out;
        view.error = update.error;
        if let Some(data) = update.data {
            view.data = Some(data);
            view.last_success_at = Some(update.completed_at);
        }
        view
    }

    pub fn get(&self, category: PollCategory) -> Option<&CategoryView> {
        self.categories.get(&category)
    }

    /// Time since the category last succeeded; None if it never has.
    pub fn staleness(&self, category: PollCategory, now: DateTime<Utc>) -> Option<Duration> {
        let at = self.get(category)?.last_success_at?;
        Some((now - at).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn categories(&self) -> impl Iterator<Item = &CategoryView> {
        self.categories.values()
    }
}
