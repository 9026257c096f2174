// TOML configuration; every section is optional and falls back to defaults

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::fetcher::CommandTimeouts;
use crate::scheduler::{PollCategory, SchedulerConfig};
use crate::telemetry::{HISTORY_CAPACITY, HealthThresholds};

pub const DEFAULT_CONFIG_PATH: &str = "~/.config/kestral/kestral.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub workspace: WorkspaceConfig,
    pub poll_interval: PollIntervalConfig,
    pub commands: CommandsConfig,
    pub health: HealthConfig,
    pub publishing: PublishingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 2222,
            host: "127.0.0.1".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Root of the observed workspace; `~` is expanded on load.
    pub town_root: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            town_root: "~/gt".into(),
        }
    }
}

/// Seconds between the end of one fetch and the start of the next.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollIntervalConfig {
    pub status: u64,
    pub agents: u64,
    pub convoys: u64,
    pub mail: u64,
    pub refinery: u64,
    pub resources: u64,
    pub witnesses: u64,
    pub prs: u64,
    pub agent_detail: u64,
}

impl Default for PollIntervalConfig {
    fn default() -> Self {
        let secs = |c: PollCategory| c.default_interval().as_secs();
        Self {
            status: secs(PollCategory::Status),
            agents: secs(PollCategory::Agents),
            convoys: secs(PollCategory::Convoys),
            mail: secs(PollCategory::Mail),
            refinery: secs(PollCategory::Refinery),
            resources: secs(PollCategory::Resources),
            witnesses: secs(PollCategory::Witnesses),
            prs: secs(PollCategory::PullRequests),
            agent_detail: secs(PollCategory::AgentDetail),
        }
    }
}

impl PollIntervalConfig {
    pub fn seconds(&self, category: PollCategory) -> u64 {
        match category {
            PollCategory::Status => self.status,
            PollCategory::Agents => self.agents,
            PollCategory::Convoys => self.convoys,
            PollCategory::Mail => self.mail,
            PollCategory::Refinery => self.refinery,
            PollCategory::Resources => self.resources,
            PollCategory::Witnesses => self.witnesses,
            PollCategory::PullRequests => self.prs,
            PollCategory::AgentDetail => self.agent_detail,
        }
    }

    fn key(category: PollCategory) -> &'static str {
        match category {
            PollCategory::PullRequests => "prs",
            other => other.name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub tmux_timeout_ms: u64,
    /// gt, bd and git.
    pub tracker_timeout_ms: u64,
    pub github_timeout_ms: u64,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            tmux_timeout_ms: 2_000,
            tracker_timeout_ms: 15_000,
            github_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub warn_percent: f64,
    pub alert_percent: f64,
    pub warn_samples: usize,
    pub alert_samples: usize,
    pub stale_after_secs: u64,
    /// Sampling cycles a vanished session keeps its history; 0 keeps it forever.
    pub evict_after_cycles: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        let t = HealthThresholds::default();
        Self {
            warn_percent: t.warn_percent,
            alert_percent: t.alert_percent,
            warn_samples: t.warn_samples,
            alert_samples: t.alert_samples,
            stale_after_secs: t.stale_after.as_secs(),
            evict_after_cycles: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishingConfig {
    /// Updates buffered per connection before a slow client starts lagging.
    pub broadcast_capacity: usize,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 64,
        }
    }
}

/// Expands a leading `~` to the home directory.
pub fn expand_path(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

impl AppConfig {
    /// Reads `CONFIG_FILE`, or the default path; a missing file means defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from_path(&expand_path(&path))
    }

    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(s) => Self::load_from_str(&s)
                .map_err(|e| anyhow::anyhow!("config {}: {}", path.display(), e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file; using defaults");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
            Err(e) => Err(anyhow::anyhow!("reading config {}: {}", path.display(), e)),
        }
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.workspace.town_root.trim().is_empty(),
            "workspace.town_root must be non-empty"
        );
        for category in PollCategory::ALL {
            let secs = self.poll_interval.seconds(category);
            anyhow::ensure!(
                secs >= 1,
                "poll_interval.{} must be >= 1, got {}",
                PollIntervalConfig::key(category),
                secs
            );
        }
        anyhow::ensure!(
            self.commands.tmux_timeout_ms > 0,
            "commands.tmux_timeout_ms must be > 0, got {}",
            self.commands.tmux_timeout_ms
        );
        anyhow::ensure!(
            self.commands.tracker_timeout_ms > 0,
            "commands.tracker_timeout_ms must be > 0, got {}",
            self.commands.tracker_timeout_ms
        );
        anyhow::ensure!(
            self.commands.github_timeout_ms > 0,
            "commands.github_timeout_ms must be > 0, got {}",
            self.commands.github_timeout_ms
        );
        anyhow::ensure!(
            self.health.warn_percent > 0.0 && self.health.warn_percent < self.health.alert_percent,
            "health.warn_percent must be > 0 and below health.alert_percent, got {} / {}",
            self.health.warn_percent,
            self.health.alert_percent
        );
        anyhow::ensure!(
            (1..=HISTORY_CAPACITY).contains(&self.health.warn_samples),
            "health.warn_samples must be between 1 and {}, got {}",
            HISTORY_CAPACITY,
            self.health.warn_samples
        );
        anyhow::ensure!(
            (1..=HISTORY_CAPACITY).contains(&self.health.alert_samples),
            "health.alert_samples must be between 1 and {}, got {}",
            HISTORY_CAPACITY,
            self.health.alert_samples
        );
        anyhow::ensure!(
            self.health.stale_after_secs > 0,
            "health.stale_after_secs must be > 0, got {}",
            self.health.stale_after_secs
        );
        anyhow::ensure!(
            self.publishing.broadcast_capacity > 0,
            "publishing.broadcast_capacity must be > 0, got {}",
            self.publishing.broadcast_capacity
        );
        Ok(())
    }

    pub fn town_root(&self) -> PathBuf {
        expand_path(&self.workspace.town_root)
    }

    pub fn command_timeouts(&self) -> CommandTimeouts {
        CommandTimeouts {
            tmux: Duration::from_millis(self.commands.tmux_timeout_ms),
            tracker: Duration::from_millis(self.commands.tracker_timeout_ms),
            github: Duration::from_millis(self.commands.github_timeout_ms),
        }
    }

    pub fn health_thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            warn_percent: self.health.warn_percent,
            alert_percent: self.health.alert_percent,
            warn_samples: self.health.warn_samples,
            alert_samples: self.health.alert_samples,
            stale_after: Duration::from_secs(self.health.stale_after_secs),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let intervals: BTreeMap<_, _> = PollCategory::ALL
            .into_iter()
            .map(|c| (c, Duration::from_secs(self.poll_interval.seconds(c))))
            .collect();
        SchedulerConfig {
            intervals,
            thresholds: self.health_thresholds(),
            evict_after_cycles: self.health.evict_after_cycles,
            broadcast_capacity: self.publishing.broadcast_capacity,
        }
    }
}
