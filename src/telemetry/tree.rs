// Process tree aggregation: anchor pids -> descendants -> per-session totals.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};

use crate::models::{ProcessRecord, SessionAnchor, SessionSnapshot};

/// Pid index and parent -> children adjacency, built once per sampling cycle.
#[derive(Debug, Default)]
pub struct ProcessTable {
    by_pid: HashMap<u32, ProcessRecord>,
    children: HashMap<u32, Vec<u32>>,
}

impl ProcessTable {
    pub fn new(records: impl IntoIterator<Item = ProcessRecord>) -> Self {
        let mut table = ProcessTable::default();
        for record in records {
            table
                .children
                .entry(record.parent_pid)
                .or_default()
                .push(record.pid);
            table.by_pid.insert(record.pid, record);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.by_pid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pid.is_empty()
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessRecord> {
        self.by_pid.get(&pid)
    }

    /// Breadth-first walk from `anchors`, each pid visited at most once.
    /// Returns the visited pids that exist in the table; anchors that are not
    /// in the table still contribute their children.
    pub fn descendants<'a>(&self, anchors: impl IntoIterator<Item = &'a u32>) -> Vec<u32> {
        let mut visited: HashSet<u32> = HashSet::new();
        let mut queue: VecDeque<u32> = VecDeque::new();
        for &pid in anchors {
            if visited.insert(pid) {
                queue.push_back(pid);
            }
        }

        let mut found = Vec::new();
        while let Some(pid) = queue.pop_front() {
            if self.by_pid.contains_key(&pid) {
                found.push(pid);
            }
            for &child in self.children.get(&pid).map(Vec::as_slice).unwrap_or_default() {
                if visited.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        found
    }
}

/// One snapshot per anchor record, including sessions with no live processes.
pub fn aggregate(
    table: &ProcessTable,
    anchors: &[SessionAnchor],
    now: DateTime<Utc>,
) -> Vec<SessionSnapshot> {
    anchors
        .iter()
        .map(|anchor| {
            let mut cpu_percent = 0.0;
            let mut resident_bytes: u64 = 0;
            let pids = table.descendants(&anchor.anchor_pids);
            for pid in &pids {
                if let Some(p) = table.get(*pid) {
                    cpu_percent += p.cpu_percent;
                    resident_bytes = resident_bytes.saturating_add(p.resident_bytes);
                }
            }
            let uptime_secs = anchor
                .created_at
                .map(|created| (now - created).num_seconds().max(0) as u64)
                .unwrap_or(0);

            SessionSnapshot {
                session_name: anchor.session_name.clone(),
                cpu_percent,
                resident_bytes,
                process_count: pids.len(),
                uptime_secs,
                last_activity_at: anchor.last_activity_at,
            }
        })
        .collect()
}
