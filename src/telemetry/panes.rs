// Session/pane listing parser: groups panes into one anchor record per session.

use std::collections::BTreeMap;

use crate::models::{SessionAnchor, epoch_to_utc};

/// Format string for `tmux list-panes -a -F`.
pub const PANE_FORMAT: &str = "#{session_name}|#{pane_pid}|#{session_created}|#{session_activity}";

/// Parses `session_name|pane_pid|created_epoch|activity_epoch` lines.
///
/// Fields are split from the right so a `|` inside a session name survives.
/// A pane whose pid does not parse still registers its session, with no anchor
/// for that pane. Activity is the newest seen across the session's panes.
pub fn parse_session_panes(output: &str) -> Vec<SessionAnchor> {
    let mut sessions: BTreeMap<String, SessionAnchor> = BTreeMap::new();

    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        let mut fields = line.rsplitn(4, '|');
        let (Some(activity), Some(created), Some(pid), Some(name)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        let created_at = parse_epoch(created);
        let activity_at = parse_epoch(activity);

        let entry = sessions
            .entry(name.to_string())
            .or_insert_with(|| SessionAnchor {
                session_name: name.to_string(),
                ..Default::default()
            });
        if let Ok(pid) = pid.trim().parse::<u32>() {
            entry.anchor_pids.insert(pid);
        }
        entry.last_activity_at = entry.last_activity_at.max(activity_at);
        entry.created_at = match (entry.created_at, created_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    sessions.into_values().collect()
}

fn parse_epoch(field: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    field.trim().parse::<i64>().ok().and_then(epoch_to_utc)
}
