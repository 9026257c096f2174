// Fetcher tests with scripted CLI output

mod common;

use std::sync::Arc;

use common::{FakeRunner, fetcher};
use kestral::fetcher::FetchError;
use kestral::models::{AgentRole, AgentState, WitnessState};

fn recent(offset_secs: i64) -> i64 {
    chrono::Utc::now().timestamp() - offset_secs
}

#[tokio::test]
async fn test_status_combines_town_and_sessions() {
    let runner = Arc::new(FakeRunner::new());
    runner.respond(
        "gt status --json",
        r#"{"agents":[{"name":"mayor","running":true,"state":"running"}]}"#,
    );
    runner.respond(
        "tmux list-sessions",
        &format!("gt-kt-max|{}|{}\n", recent(10), recent(600)),
    );

    let report = fetcher(runner).status().await.unwrap();
    assert_eq!(report.town.as_ref().map(|t| t.agents.len()), Some(1));
    assert_eq!(report.sessions.len(), 1);
    assert!(report.partial_error.is_none());
}

#[tokio::test]
async fn test_status_survives_one_failing_source() {
    let runner = Arc::new(FakeRunner::new());
    runner.fail("gt status", "gt: workspace not found");
    runner.respond("tmux list-sessions", &format!("main|{}|0\n", recent(5)));

    let report = fetcher(runner).status().await.unwrap();
    assert!(report.town.is_none());
    assert_eq!(report.sessions[0].name, "main");
    assert!(report.partial_error.unwrap().contains("workspace not found"));
}

#[tokio::test]
async fn test_status_fails_when_both_sources_fail() {
    let runner = Arc::new(FakeRunner::new());
    runner.fail("gt status", "down");
    runner.fail("tmux list-sessions", "no server running");
    let err = fetcher(runner).status().await.unwrap_err();
    assert!(matches!(err, FetchError::Command { .. }));
}

#[tokio::test]
async fn test_agents_enriched_with_assigned_issue() {
    let runner = Arc::new(FakeRunner::new());
    runner.respond(
        "tmux list-sessions",
        &format!(
            "gt-kt-max|{}|0\ngt-kt-refinery|{}|0\nscratch|{}|0\n",
            recent(30),
            recent(3600),
            recent(1)
        ),
    );
    runner.respond(
        "bd list --status=in_progress",
        r#"[{"id":"kt-7","title":"Wire the feed","status":"in_progress","assignee":"kt/polecats/max"}]"#,
    );

    let agents = fetcher(runner.clone()).agents().await.unwrap();
    assert_eq!(agents.len(), 2);
    assert_eq!(agents[0].name, "max");
    assert_eq!(agents[0].state, AgentState::Working);
    assert_eq!(agents[0].issue_title.as_deref(), Some("Wire the feed"));
    assert_eq!(agents[1].role, AgentRole::Refinery);
    assert_eq!(agents[1].state, AgentState::Stuck);
}

#[tokio::test]
async fn test_agents_ignore_tracker_failure() {
    let runner = Arc::new(FakeRunner::new());
    runner.respond("tmux list-sessions", &format!("gt-kt-max|{}|0\n", recent(30)));
    runner.fail("bd list", "database locked");

    let agents = fetcher(runner).agents().await.unwrap();
    assert_eq!(agents.len(), 1);
    assert!(agents[0].issue_id.is_none());
}

#[tokio::test]
async fn test_convoys_report_progress() {
    let runner = Arc::new(FakeRunner::new());
    runner.respond(
        "bd list --type=convoy",
        r#"[{"id":"hq-1","title":"Launch","status":"open"},{"id":"hq-2","title":"Broken","status":"open"}]"#,
    );
    runner.respond("bd dep list hq-1", r#"[{"id":"kt-1"},{"id":"kt-2"}]"#);
    runner.respond(
        "bd show kt-1 kt-2 --json",
        r#"[{"id":"kt-1","status":"closed"},{"id":"kt-2","status":"open"}]"#,
    );
    runner.fail("bd dep list hq-2", "no such convoy");

    let convoys = fetcher(runner.clone()).convoys().await.unwrap();
    assert_eq!(convoys.len(), 2);
    assert_eq!(convoys[0].done, Some(1));
    assert_eq!(convoys[0].total, Some(2));
    assert_eq!(convoys[1].total, None);
    assert!(
        runner
            .calls()
            .iter()
            .all(|c| !c.starts_with("bd show") || c.ends_with("--json"))
    );
}

#[tokio::test]
async fn test_empty_inbox_is_not_an_error() {
    let runner = Arc::new(FakeRunner::new());
    runner.respond("gt mail inbox", "null\n");
    assert!(fetcher(runner).mail().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreadable_mail_is_a_parse_error() {
    let runner = Arc::new(FakeRunner::new());
    runner.respond("gt mail inbox", "Error: mailbox locked");
    let err = fetcher(runner).mail().await.unwrap_err();
    assert!(matches!(err, FetchError::Parse { .. }));
}

#[tokio::test]
async fn test_refinery_merges_sessions_and_beads() {
    let runner = Arc::new(FakeRunner::new());
    runner.respond("tmux list-sessions", &format!("gt-kt-refinery|{}|0\n", recent(5)));
    runner.respond("bd list --type=mr --status=open", r#"[{"id":"gw-3","status":"open"}]"#);
    runner.respond(
        "bd list --type=mr --status=in_progress",
        r#"[{"id":"kt-9","status":"in_progress"}]"#,
    );
    runner.respond(
        "bd list --type=mr --status=completed",
        r#"[{"id":"kt-1","status":"COMPLETED"},{"id":"kt-2","status":"rejected"}]"#,
    );

    let statuses = fetcher(runner).refinery().await.unwrap();
    let rigs: Vec<_> = statuses.iter().map(|s| s.rig.as_str()).collect();
    assert_eq!(rigs, ["gw", "kt"]);
    assert!(statuses[1].running);
    assert_eq!(statuses[1].queue_depth, 1);
    assert_eq!(statuses[1].success_rate, Some(50.0));
}

#[tokio::test]
async fn test_witnesses_from_sessions() {
    let runner = Arc::new(FakeRunner::new());
    runner.respond(
        "tmux list-sessions",
        &format!(
            "gt-kt-witness|{}|{}\ngt-kt-max|{}|0\ngt-gw-nux|{}|0\n",
            recent(60),
            recent(7200),
            recent(1),
            recent(1)
        ),
    );

    let witnesses = fetcher(runner).witnesses().await.unwrap();
    assert_eq!(witnesses.len(), 2);
    assert_eq!(witnesses[0].rig, "gw");
    assert_eq!(witnesses[0].state, WitnessState::Dead);
    assert_eq!(witnesses[1].state, WitnessState::Alive);
    assert_eq!(witnesses[1].polecat_count, 1);
    assert!(witnesses[1].session_created.is_some());
}

#[tokio::test]
async fn test_agent_detail_degrades_per_part() {
    let runner = Arc::new(FakeRunner::new());
    runner.respond("git -C /tmp/town/kt/polecats/max branch", "main\n");
    runner.fail("git -C /tmp/town/kt/polecats/max log", "not a git repository");
    runner.fail("tmux capture-pane", "can't find session");

    let detail = fetcher(runner).agent_detail("kt", "max").await;
    assert_eq!(detail.branch, "main");
    assert!(detail.commits.is_empty());
    assert!(detail.output.is_empty());
}

#[tokio::test]
async fn test_pull_requests_use_github_cli() {
    let runner = Arc::new(FakeRunner::new());
    runner.respond("gh pr list", r#"[{"number":7,"title":"Sparkline colours"}]"#);
    let prs = fetcher(runner.clone()).pull_requests().await.unwrap();
    assert_eq!(prs[0].number, 7);
    let call = &runner.calls()[0];
    assert!(call.contains("--limit 50"));
    assert!(call.contains("statusCheckRollup"));
}
