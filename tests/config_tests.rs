// Config loading and validation tests

use std::time::Duration;

use kestral::config::{AppConfig, expand_path};
use kestral::scheduler::PollCategory;

const VALID_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[workspace]
town_root = "/srv/town"

[poll_interval]
status = 10
agents = 5
convoys = 15
mail = 45
refinery = 15
resources = 20
witnesses = 15
prs = 120
agent_detail = 10

[commands]
tmux_timeout_ms = 1500
tracker_timeout_ms = 15000
github_timeout_ms = 8000

[health]
warn_percent = 75.0
alert_percent = 90.0
warn_samples = 4
alert_samples = 10
stale_after_secs = 600
evict_after_cycles = 5

[publishing]
broadcast_capacity = 60
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.server.port, 8081);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.town_root(), std::path::PathBuf::from("/srv/town"));
    assert_eq!(config.poll_interval.mail, 45);
    assert_eq!(config.publishing.broadcast_capacity, 60);

    let timeouts = config.command_timeouts();
    assert_eq!(timeouts.tmux, Duration::from_millis(1500));
    assert_eq!(timeouts.github, Duration::from_secs(8));

    let thresholds = config.health_thresholds();
    assert_eq!(thresholds.warn_percent, 75.0);
    assert_eq!(thresholds.stale_after, Duration::from_secs(600));
}

#[test]
fn test_empty_config_uses_defaults() {
    let config = AppConfig::load_from_str("").expect("defaults");
    assert_eq!(config.server.port, 2222);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.workspace.town_root, "~/gt");
    assert_eq!(config.commands.tmux_timeout_ms, 2000);
    assert_eq!(config.health.evict_after_cycles, 3);
    for category in PollCategory::ALL {
        assert_eq!(
            config.scheduler_config().interval(category),
            category.default_interval()
        );
    }
}

#[test]
fn test_partial_section_keeps_other_defaults() {
    let config = AppConfig::load_from_str("[poll_interval]\nprs = 300\n").expect("valid");
    assert_eq!(config.poll_interval.prs, 300);
    assert_eq!(config.poll_interval.agents, 5);
    assert_eq!(config.server.port, 2222);
}

#[test]
fn test_scheduler_config_reflects_sections() {
    let scheduler = AppConfig::load_from_str(VALID_CONFIG).unwrap().scheduler_config();
    assert_eq!(
        scheduler.interval(PollCategory::PullRequests),
        Duration::from_secs(120)
    );
    assert_eq!(
        scheduler.interval(PollCategory::Resources),
        Duration::from_secs(20)
    );
    assert_eq!(scheduler.evict_after_cycles, 5);
    assert_eq!(scheduler.broadcast_capacity, 60);
    assert_eq!(scheduler.thresholds.alert_percent, 90.0);
}

#[test]
fn test_config_validation_rejects_invalid_port() {
    let bad = VALID_CONFIG.replace("port = 8081", "port = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_config_validation_rejects_empty_town_root() {
    let bad = VALID_CONFIG.replace("town_root = \"/srv/town\"", "town_root = \"  \"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("workspace.town_root"));
}

#[test]
fn test_config_validation_rejects_zero_interval() {
    let bad = VALID_CONFIG.replace("prs = 120", "prs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("poll_interval.prs"));

    let bad = VALID_CONFIG.replace("agent_detail = 10", "agent_detail = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("poll_interval.agent_detail"));
}

#[test]
fn test_config_validation_rejects_zero_timeout() {
    let bad = VALID_CONFIG.replace("tmux_timeout_ms = 1500", "tmux_timeout_ms = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("commands.tmux_timeout_ms"));
}

#[test]
fn test_config_validation_rejects_inverted_thresholds() {
    let bad = VALID_CONFIG.replace("warn_percent = 75.0", "warn_percent = 95.0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("health.warn_percent"));
}

#[test]
fn test_config_validation_rejects_samples_beyond_history() {
    let bad = VALID_CONFIG.replace("alert_samples = 10", "alert_samples = 11");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("health.alert_samples"));

    let bad = VALID_CONFIG.replace("warn_samples = 4", "warn_samples = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("health.warn_samples"));
}

#[test]
fn test_config_validation_rejects_broadcast_capacity_zero() {
    let bad = VALID_CONFIG.replace("broadcast_capacity = 60", "broadcast_capacity = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("broadcast_capacity"));
}

#[test]
fn test_config_validation_rejects_invalid_toml() {
    let err = AppConfig::load_from_str("not valid toml [[[").unwrap_err();
    assert!(!err.to_string().is_empty());
}

#[test]
fn test_config_load_from_path() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("kestral.toml");
    std::fs::write(&path, VALID_CONFIG).unwrap();
    let config = AppConfig::load_from_path(&path).expect("load from file");
    assert_eq!(config.server.port, 8081);
}

#[test]
fn test_missing_file_means_defaults() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = AppConfig::load_from_path(&dir.path().join("absent.toml")).expect("defaults");
    assert_eq!(config.server.port, 2222);
}

#[test]
fn test_invalid_file_names_path() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[server]\nport = 0\n").unwrap();
    let err = AppConfig::load_from_path(&path).unwrap_err().to_string();
    assert!(err.contains("broken.toml"));
    assert!(err.contains("server.port"));
}

#[test]
fn test_expand_path_leaves_plain_paths() {
    assert_eq!(expand_path("/srv/town"), std::path::PathBuf::from("/srv/town"));
    assert_eq!(expand_path("~user/x"), std::path::PathBuf::from("~user/x"));
    if let Some(home) = dirs::home_dir() {
        assert_eq!(expand_path("~/gt"), home.join("gt"));
        assert_eq!(expand_path("~"), home);
    }
}
