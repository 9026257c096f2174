// Per-session CPU history, sustained-load health classification and sparklines.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::{HealthStatus, LoadTier, SessionHealth, SessionSnapshot, SparkCell};

/// Samples kept per session.
pub const HISTORY_CAPACITY: usize = 10;

const SPARK_GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const SPARK_PLACEHOLDER: char = '░';

#[derive(Debug, Clone, PartialEq)]
pub struct HealthThresholds {
    pub warn_percent: f64,
    pub alert_percent: f64,
    /// Consecutive samples above `warn_percent` for a warning.
    pub warn_samples: usize,
    /// Consecutive samples above `alert_percent` for an alert.
    pub alert_samples: usize,
    /// No session activity for longer than this means stale.
    pub stale_after: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            warn_percent: 80.0,
            alert_percent: 95.0,
            warn_samples: 4,
            alert_samples: 10,
            stale_after: Duration::from_secs(15 * 60),
        }
    }
}

/// Bounded FIFO of CPU samples, most recent last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionHistory {
    samples: VecDeque<f64>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn add_sample(&mut self, cpu_percent: f64) {
        if self.samples.len() == HISTORY_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(cpu_percent);
    }

    pub fn samples(&self) -> impl ExactSizeIterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    /// True when the last `n` samples exist and all exceed `threshold`.
    pub fn sustained_above(&self, threshold: f64, n: usize) -> bool {
        n > 0
            && self.samples.len() >= n
            && self.samples.iter().rev().take(n).all(|&v| v > threshold)
    }
}

/// Health of one session. Deterministic in its inputs.
pub fn classify(
    history: Option<&SessionHistory>,
    last_activity_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    thresholds: &HealthThresholds,
) -> HealthStatus {
    if let Some(last) = last_activity_at {
        let idle = (now - last).to_std().unwrap_or(Duration::ZERO);
        if idle > thresholds.stale_after {
            return HealthStatus::Stale;
        }
    }

    let Some(history) = history else {
        return HealthStatus::Healthy;
    };
    if history.sustained_above(thresholds.alert_percent, thresholds.alert_samples) {
        return HealthStatus::Alert;
    }
    if history.sustained_above(thresholds.warn_percent, thresholds.warn_samples) {
        return HealthStatus::Warning;
    }
    // A single hot reading is only a warning until history confirms it.
    if history
        .latest()
        .is_some_and(|cpu| cpu > thresholds.alert_percent)
    {
        return HealthStatus::Warning;
    }
    HealthStatus::Healthy
}

fn spark_glyph(cpu_percent: f64) -> char {
    let levels = SPARK_GLYPHS.len();
    let idx = (cpu_percent / 100.0 * levels as f64).floor();
    let idx = if idx.is_nan() { 0 } else { (idx.max(0.0) as usize).min(levels - 1) };
    SPARK_GLYPHS[idx]
}

fn load_tier(cpu_percent: f64, thresholds: &HealthThresholds) -> LoadTier {
    if cpu_percent > thresholds.alert_percent {
        LoadTier::Critical
    } else if cpu_percent > thresholds.warn_percent {
        LoadTier::Elevated
    } else {
        LoadTier::Normal
    }
}

/// Histories for every session seen by one connection.
///
/// Owned by that connection's polling loop; never shared.
#[derive(Debug, Default)]
pub struct HealthTracker {
    histories: HashMap<String, TrackedHistory>,
    thresholds: HealthThresholds,
    /// Successful cycles a session may be absent before its history is dropped; 0 keeps forever.
    evict_after_cycles: u32,
}

#[derive(Debug, Default)]
struct TrackedHistory {
    history: SessionHistory,
    missed_cycles: u32,
}

impl HealthTracker {
    pub fn new(thresholds: HealthThresholds, evict_after_cycles: u32) -> Self {
        Self {
            histories: HashMap::new(),
            thresholds,
            evict_after_cycles,
        }
    }

    pub fn add_sample(&mut self, session_name: &str, cpu_percent: f64) {
        let tracked = self
            .histories
            .entry(session_name.to_string())
            .or_default();
        tracked.history.add_sample(cpu_percent);
        tracked.missed_cycles = 0;
    }

    pub fn history(&self, session_name: &str) -> Option<&SessionHistory> {
        self.histories.get(session_name).map(|t| &t.history)
    }

    pub fn tracked_sessions(&self) -> usize {
        self.histories.len()
    }

    /// Records one successful sampling cycle and ages out absent sessions.
    pub fn observe(&mut self, snapshots: &[SessionSnapshot]) {
        for tracked in self.histories.values_mut() {
            tracked.missed_cycles = tracked.missed_cycles.saturating_add(1);
        }
        for snapshot in snapshots {
            self.add_sample(&snapshot.session_name, snapshot.cpu_percent);
        }
        if self.evict_after_cycles > 0 {
            let limit = self.evict_after_cycles;
            let before = self.histories.len();
            self.histories.retain(|_, t| t.missed_cycles < limit);
            let evicted = before - self.histories.len();
            if evicted > 0 {
                tracing::debug!(evicted, "dropped histories of vanished sessions");
            }
        }
    }

    pub fn classify(
        &self,
        session_name: &str,
        last_activity_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> HealthStatus {
        classify(
            self.history(session_name),
            last_activity_at,
            now,
            &self.thresholds,
        )
    }

    /// Left-padded with placeholders until the history is full.
    pub fn sparkline_cells(&self, session_name: &str) -> Vec<SparkCell> {
        let history = self.history(session_name);
        let len = history.map_or(0, SessionHistory::len);
        let mut cells = Vec::with_capacity(HISTORY_CAPACITY);
        cells.extend((len..HISTORY_CAPACITY).map(|_| SparkCell {
            glyph: SPARK_PLACEHOLDER,
            tier: LoadTier::Unknown,
        }));
        if let Some(history) = history {
            cells.extend(history.samples().map(|v| SparkCell {
                glyph: spark_glyph(v),
                tier: load_tier(v, &self.thresholds),
            }));
        }
        cells
    }

    pub fn render_sparkline(&self, session_name: &str) -> String {
        self.sparkline_cells(session_name)
            .into_iter()
            .map(|c| c.glyph)
            .collect()
    }

    /// Records the cycle and returns each snapshot with its health and sparkline.
    pub fn assess(
        &mut self,
        snapshots: Vec<SessionSnapshot>,
        now: DateTime<Utc>,
    ) -> Vec<SessionHealth> {
        self.observe(&snapshots);
        snapshots
            .into_iter()
            .map(|snapshot| {
                let health = self.classify(&snapshot.session_name, snapshot.last_activity_at, now);
                let cells = self.sparkline_cells(&snapshot.session_name);
                let sparkline = cells.iter().map(|c| c.glyph).collect();
                SessionHealth {
                    snapshot,
                    health,
                    sparkline,
                    cells,
                }
            })
            .collect()
    }
}
