// tmux session listing and the agent/witness views derived from it

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::{
    AgentDetail, AgentRole, AgentState, IssueDetail, SessionInfo, WitnessDetail, WitnessState,
    epoch_to_utc,
};

pub const SESSION_FORMAT: &str = "#{session_name}|#{window_activity}|#{session_created}";

const AGENT_WORKING: Duration = Duration::from_secs(5 * 60);
const AGENT_STALE: Duration = Duration::from_secs(30 * 60);
const WITNESS_ALIVE: Duration = Duration::from_secs(5 * 60);
const WITNESS_STALE: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxSession {
    pub name: String,
    pub activity: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
}

impl TmuxSession {
    /// `(rig, agent)` for sessions named `gt-<rig>-<agent>`.
    pub fn agent_parts(&self) -> Option<(&str, &str)> {
        let rest = self.name.strip_prefix("gt-")?;
        let (rig, agent) = rest.split_once('-')?;
        (!rig.is_empty() && !agent.is_empty()).then_some((rig, agent))
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            name: self.name.clone(),
            activity: self.activity,
        }
    }
}

/// Parses `name|activity|created` lines; lines missing a field are dropped.
pub fn parse_session_list(output: &str) -> Vec<TmuxSession> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.trim_end().rsplitn(3, '|');
            let created = fields.next()?;
            let activity = fields.next()?;
            let name = fields.next()?;
            if name.is_empty() {
                return None;
            }
            Some(TmuxSession {
                name: name.to_string(),
                activity: epoch(activity),
                created: epoch(created),
            })
        })
        .collect()
}

fn epoch(field: &str) -> Option<DateTime<Utc>> {
    field.trim().parse::<i64>().ok().and_then(epoch_to_utc)
}

fn age(at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - at).to_std().unwrap_or(Duration::ZERO)
}

pub fn agent_state(activity: Option<DateTime<Utc>>, now: DateTime<Utc>) -> (AgentState, Duration) {
    let Some(at) = activity else {
        return (AgentState::Idle, Duration::ZERO);
    };
    let age = age(at, now);
    let state = if age < AGENT_WORKING {
        AgentState::Working
    } else if age < AGENT_STALE {
        AgentState::Stale
    } else {
        AgentState::Stuck
    };
    (state, age)
}

pub fn witness_state(heartbeat: Option<DateTime<Utc>>, now: DateTime<Utc>) -> WitnessState {
    match heartbeat.map(|at| age(at, now)) {
        Some(age) if age < WITNESS_ALIVE => WitnessState::Alive,
        Some(age) if age < WITNESS_STALE => WitnessState::Stale,
        _ => WitnessState::Dead,
    }
}

/// Agents from `gt-` sessions, with the in-progress issue keyed by `<rig>/polecats/<name>`.
pub fn build_agents(
    sessions: &[TmuxSession],
    assigned: &HashMap<String, IssueDetail>,
    now: DateTime<Utc>,
) -> Vec<AgentDetail> {
    sessions
        .iter()
        .filter_map(|session| {
            let (rig, name) = session.agent_parts()?;
            let (state, age) = agent_state(session.activity, now);
            let issue = assigned.get(&format!("{rig}/polecats/{name}"));
            Some(AgentDetail {
                name: name.to_string(),
                rig: rig.to_string(),
                role: AgentRole::from_session_suffix(name),
                state,
                age_secs: age.as_secs(),
                issue_id: issue.map(|i| i.id.clone()),
                issue_title: issue.map(|i| i.title.clone()),
            })
        })
        .collect()
}

/// One entry per rig that has any `gt-` session, sorted by rig.
pub fn build_witnesses(sessions: &[TmuxSession], now: DateTime<Utc>) -> Vec<WitnessDetail> {
    #[derive(Default)]
    struct Rig<'a> {
        witness: Option<&'a TmuxSession>,
        polecats: usize,
    }

    let mut rigs: BTreeMap<&str, Rig> = BTreeMap::new();
    for session in sessions {
        let Some((rig, name)) = session.agent_parts() else {
            continue;
        };
        let entry = rigs.entry(rig).or_default();
        match AgentRole::from_session_suffix(name) {
            AgentRole::Witness => entry.witness = Some(session),
            AgentRole::Polecat => entry.polecats += 1,
            AgentRole::Refinery | AgentRole::Mayor => {}
        }
    }

    rigs.into_iter()
        .map(|(rig, info)| {
            let heartbeat = info.witness.and_then(|w| w.activity);
            WitnessDetail {
                rig: rig.to_string(),
                state: witness_state(heartbeat, now),
                has_session: info.witness.is_some(),
                last_heartbeat: heartbeat,
                session_created: info.witness.and_then(|w| w.created),
                polecat_count: info.polecats,
            }
        })
        .collect()
}

/// Rigs with a refinery session, mapped to whether that session reports activity.
pub fn refinery_sessions(sessions: &[TmuxSession]) -> BTreeMap<String, bool> {
    sessions
        .iter()
        .filter_map(|s| {
            let (rig, name) = s.agent_parts()?;
            (name == "refinery").then(|| (rig.to_string(), s.activity.is_some()))
        })
        .collect()
}
