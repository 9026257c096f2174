// Shared test helpers: a scripted command runner and scheduler plumbing

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kestral::command::{CommandError, CommandRunner, CommandSpec};
use kestral::fetcher::{CommandTimeouts, Fetcher};
use kestral::scheduler::{PollCategory, SchedulerConfig, Update};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
enum Reply {
    Stdout(String),
    Fail(String),
    /// Never answers; the runner reports a timeout once the command's budget elapses.
    Hang,
}

#[derive(Debug, Clone)]
struct Rule {
    prefix: String,
    delay: Duration,
    reply: Reply,
}

#[derive(Debug, Default)]
struct Tracking {
    calls: Vec<String>,
    active: HashMap<String, usize>,
    peak: HashMap<String, usize>,
}

/// Answers commands by longest matching prefix of `program arg…`.
#[derive(Debug, Default)]
pub struct FakeRunner {
    rules: Mutex<Vec<Rule>>,
    tracking: Arc<Mutex<Tracking>>,
}

struct ActiveGuard {
    key: String,
    tracking: Arc<Mutex<Tracking>>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if let Ok(mut t) = self.tracking.lock()
            && let Some(n) = t.active.get_mut(&self.key)
        {
            *n = n.saturating_sub(1);
        }
    }
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, prefix: &str, delay: Duration, reply: Reply) {
        let mut rules = self.rules.lock().unwrap();
        rules.retain(|r| r.prefix != prefix);
        rules.push(Rule {
            prefix: prefix.to_string(),
            delay,
            reply,
        });
    }

    pub fn respond(&self, prefix: &str, stdout: &str) {
        self.push(prefix, Duration::ZERO, Reply::Stdout(stdout.to_string()));
    }

    pub fn respond_after(&self, prefix: &str, delay: Duration, stdout: &str) {
        self.push(prefix, delay, Reply::Stdout(stdout.to_string()));
    }

    pub fn fail(&self, prefix: &str, stderr: &str) {
        self.push(prefix, Duration::ZERO, Reply::Fail(stderr.to_string()));
    }

    pub fn hang(&self, prefix: &str) {
        self.push(prefix, Duration::ZERO, Reply::Hang);
    }

    pub fn calls(&self) -> Vec<String> {
        self.tracking.lock().unwrap().calls.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Highest number of simultaneous runs seen for the rule matching `prefix`.
    pub fn peak(&self, prefix: &str) -> usize {
        self.tracking
            .lock()
            .unwrap()
            .peak
            .get(prefix)
            .copied()
            .unwrap_or(0)
    }

    pub fn active(&self, prefix: &str) -> usize {
        self.tracking
            .lock()
            .unwrap()
            .active
            .get(prefix)
            .copied()
            .unwrap_or(0)
    }

    fn lookup(&self, command: &str) -> Option<Rule> {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| command.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len())
            .cloned()
    }
}

impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<String, CommandError> {
        let command = spec.display();
        let rule = self.lookup(&command);
        let key = rule
            .as_ref()
            .map(|r| r.prefix.clone())
            .unwrap_or_else(|| command.clone());

        let _guard = {
            let mut t = self.tracking.lock().unwrap();
            t.calls.push(command.clone());
            let active = t.active.entry(key.clone()).or_insert(0);
            *active += 1;
            let now = *active;
            let peak = t.peak.entry(key.clone()).or_insert(0);
            *peak = (*peak).max(now);
            ActiveGuard {
                key,
                tracking: self.tracking.clone(),
            }
        };

        let Some(rule) = rule else {
            return Err(CommandError::Failed {
                program: spec.program.clone(),
                code: Some(127),
                stderr: format!("unscripted: {command}"),
            });
        };
        if !rule.delay.is_zero() {
            tokio::time::sleep(rule.delay).await;
        }
        match rule.reply {
            Reply::Stdout(out) => Ok(out),
            Reply::Fail(stderr) => Err(CommandError::Failed {
                program: spec.program.clone(),
                code: Some(1),
                stderr,
            }),
            Reply::Hang => {
                tokio::time::sleep(spec.timeout).await;
                Err(CommandError::TimedOut {
                    program: spec.program.clone(),
                    timeout: spec.timeout,
                })
            }
        }
    }
}

pub fn fetcher(runner: Arc<FakeRunner>) -> Arc<Fetcher<FakeRunner>> {
    Arc::new(Fetcher::new(runner, "/tmp/town", CommandTimeouts::default()))
}

/// Default intervals with a buffer large enough that tests never lag.
pub fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        broadcast_capacity: 4096,
        ..SchedulerConfig::default()
    }
}

/// Next update for `category`, skipping other categories.
pub async fn next_update(rx: &mut broadcast::Receiver<Update>, category: PollCategory) -> Update {
    loop {
        match rx.recv().await {
            Ok(update) if update.category == category => return update,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => panic!("scheduler stopped"),
        }
    }
}

/// Pane line for a session whose pane root is `pid`, active just now.
pub fn pane_line(session: &str, pid: u32) -> String {
    let now = chrono::Utc::now().timestamp();
    format!("{session}|{pid}|{}|{now}\n", now - 3600)
}
