// Per-connection poll scheduler: tick → fetch → publish → reschedule, single-flight per category.
// Each connection spawns its own Scheduler; dropping the handle tears down every timer and fetch.

mod category;
mod update;

pub use category::{CategoryState, PollCategory};
pub use update::{CategoryView, DashboardView, Payload, Update};

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tokio::time::{Instant, sleep};

use crate::command::CommandRunner;
use crate::fetcher::{FetchError, Fetcher};
use crate::models::SessionSnapshot;
use crate::telemetry::{HealthThresholds, HealthTracker};

const CONTROL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Fetch now unless already fetching.
    Tick(PollCategory),
    RefreshAll,
    SelectAgent { rig: String, name: String },
    DeselectAgent,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub intervals: BTreeMap<PollCategory, Duration>,
    pub thresholds: HealthThresholds,
    pub evict_after_cycles: u32,
    pub broadcast_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            intervals: PollCategory::ALL
                .into_iter()
                .map(|c| (c, c.default_interval()))
                .collect(),
            thresholds: HealthThresholds::default(),
            evict_after_cycles: 3,
            broadcast_capacity: 64,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self, category: PollCategory) -> Duration {
        self.intervals
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.default_interval())
    }
}

/// Owned by the connection. Dropping it aborts the loop and all in-flight fetches.
pub struct SchedulerHandle {
    control: mpsc::Sender<Control>,
    updates: broadcast::Sender<Update>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// False once the loop has stopped.
    pub async fn send(&self, control: Control) -> bool {
        self.control.send(control).await.is_ok()
    }

    pub async fn tick(&self, category: PollCategory) -> bool {
        self.send(Control::Tick(category)).await
    }

    pub async fn refresh_all(&self) -> bool {
        self.send(Control::RefreshAll).await
    }

    pub async fn select_agent(&self, rig: impl Into<String>, name: impl Into<String>) -> bool {
        self.send(Control::SelectAgent {
            rig: rig.into(),
            name: name.into(),
        })
        .await
    }

    pub async fn deselect_agent(&self) -> bool {
        self.send(Control::DeselectAgent).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Update> {
        self.updates.subscribe()
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum Fetched {
    Ready(Payload),
    Samples(Vec<SessionSnapshot>),
}

enum Event {
    Timer {
        category: PollCategory,
        generation: u64,
    },
    Done {
        category: PollCategory,
        started: Instant,
        selection_epoch: u64,
        result: Result<Fetched, FetchError>,
    },
}

#[derive(Debug, Clone)]
struct Selection {
    rig: String,
    name: String,
}

pub struct Scheduler<R> {
    fetcher: Arc<Fetcher<R>>,
    states: BTreeMap<PollCategory, CategoryState>,
    tasks: JoinSet<Event>,
    /// At most one armed timer per category; completing a fetch aborts it.
    timers: BTreeMap<PollCategory, AbortHandle>,
    control_rx: mpsc::Receiver<Control>,
    updates: broadcast::Sender<Update>,
    health: HealthTracker,
    selection: Option<Selection>,
    /// Bumped on every select/deselect so a finished detail fetch can tell it is outdated.
    selection_epoch: u64,
}

impl<R: CommandRunner> Scheduler<R> {
    /// Starts the loop. The returned receiver exists before the first fetch, so it sees every update.
    pub fn spawn(
        fetcher: Arc<Fetcher<R>>,
        config: SchedulerConfig,
    ) -> (SchedulerHandle, broadcast::Receiver<Update>) {
        let (scheduler, control_tx, updates_rx) = Self::new(fetcher, config);
        let updates = scheduler.updates.clone();
        let task = tokio::spawn(scheduler.run());

        (
            SchedulerHandle {
                control: control_tx,
                updates,
                task,
            },
            updates_rx,
        )
    }

    fn new(
        fetcher: Arc<Fetcher<R>>,
        config: SchedulerConfig,
    ) -> (Self, mpsc::Sender<Control>, broadcast::Receiver<Update>) {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (updates, updates_rx) = broadcast::channel(config.broadcast_capacity.max(1));
        let scheduler = Scheduler {
            fetcher,
            states: PollCategory::ALL
                .into_iter()
                .map(|c| (c, CategoryState::new(c, config.interval(c))))
                .collect(),
            tasks: JoinSet::new(),
            timers: BTreeMap::new(),
            control_rx,
            updates,
            health: HealthTracker::new(config.thresholds.clone(), config.evict_after_cycles),
            selection: None,
            selection_epoch: 0,
        };
        (scheduler, control_tx, updates_rx)
    }

    async fn run(mut self) {
        tracing::debug!("scheduler started");
        for category in PollCategory::ALL {
            if !category.is_on_demand() {
                self.begin(category);
            }
        }

        loop {
            tokio::select! {
                Some(joined) = self.tasks.join_next() => match joined {
                    Ok(event) => self.handle(event),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => tracing::error!(error = %e, "scheduler task failed"),
                },
                control = self.control_rx.recv() => match control {
                    Some(control) => self.control(control),
                    None => break,
                },
            }
        }
        tracing::debug!("scheduler stopped");
    }

    /// On-demand categories only run while an agent is selected.
    fn wanted(&self, category: PollCategory) -> bool {
        !category.is_on_demand() || self.selection.is_some()
    }

    fn control(&mut self, control: Control) {
        match control {
            Control::Tick(category) if self.wanted(category) => self.begin(category),
            Control::Tick(category) => {
                tracing::debug!(%category, "no agent selected; tick ignored");
            }
            Control::RefreshAll => {
                for category in PollCategory::ALL {
                    if self.wanted(category) {
                        self.begin(category);
                    }
                }
            }
            Control::SelectAgent { rig, name } => {
                self.selection = Some(Selection { rig, name });
                self.selection_epoch += 1;
                self.begin(PollCategory::AgentDetail);
            }
            Control::DeselectAgent => {
                self.selection = None;
                self.selection_epoch += 1;
                if let Some(timer) = self.timers.remove(&PollCategory::AgentDetail) {
                    timer.abort();
                }
            }
        }
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Timer {
                category,
                generation,
            } => {
                let current = self
                    .states
                    .get(&category)
                    .is_some_and(|s| s.is_current(generation));
                if current && self.wanted(category) {
                    self.begin(category);
                } else {
                    tracing::debug!(%category, generation, "stale timer dropped");
                }
            }
            Event::Done {
                category,
                started,
                selection_epoch,
                result,
            } => self.finish(category, started, selection_epoch, result),
        }
    }

    fn begin(&mut self, category: PollCategory) {
        let Some(state) = self.states.get_mut(&category) else {
            return;
        };
        if !state.try_begin() {
            tracing::debug!(%category, "fetch in flight; tick dropped");
            return;
        }

        let fetcher = self.fetcher.clone();
        let target = self
            .selection
            .as_ref()
            .map(|s| (s.rig.clone(), s.name.clone()));
        let selection_epoch = self.selection_epoch;
        self.tasks.spawn(async move {
            let started = Instant::now();
            let result = AssertUnwindSafe(fetch(fetcher, category, target))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(FetchError::Panicked(panic_message(panic.as_ref()))));
            Event::Done {
                category,
                started,
                selection_epoch,
                result,
            }
        });
    }

    fn finish(
        &mut self,
        category: PollCategory,
        started: Instant,
        selection_epoch: u64,
        result: Result<Fetched, FetchError>,
    ) {
        let now = Instant::now();
        let (data, error, timed_out) = match result {
            Ok(Fetched::Ready(payload)) => (Some(payload), None, false),
            Ok(Fetched::Samples(snapshots)) => {
                let rows = self.health.assess(snapshots, Utc::now());
                (Some(Payload::Resources(rows)), None, false)
            }
            Err(e) => {
                tracing::warn!(error = %e, %category, timed_out = e.is_timeout(), "fetch failed");
                (None, Some(e.to_string()), e.is_timeout())
            }
        };

        let update = Update {
            category,
            completed_at: Utc::now(),
            elapsed_ms: now.duration_since(started).as_millis() as u64,
            data,
            error,
            timed_out,
        };
        if self.updates.send(update).is_err() {
            tracing::trace!(%category, "no subscribers for update");
        }

        let Some(state) = self.states.get_mut(&category) else {
            return;
        };
        let generation = state.complete(now);
        let interval = state.interval;
        // Any armed timer belongs to an earlier generation now.
        if let Some(stale) = self.timers.remove(&category) {
            stale.abort();
        }

        if category.is_on_demand() {
            if self.selection.is_none() {
                return;
            }
            if selection_epoch != self.selection_epoch {
                self.begin(category);
                return;
            }
        }
        self.arm(category, generation, interval);
    }

    fn arm(&mut self, category: PollCategory, generation: u64, interval: Duration) {
        let timer = self.tasks.spawn(async move {
            sleep(interval).await;
            Event::Timer {
                category,
                generation,
            }
        });
        self.timers.insert(category, timer);
    }
}

async fn fetch<R: CommandRunner>(
    fetcher: Arc<Fetcher<R>>,
    category: PollCategory,
    target: Option<(String, String)>,
) -> Result<Fetched, FetchError> {
    let payload = match category {
        PollCategory::Status => Payload::Status(fetcher.status().await?),
        PollCategory::Agents => Payload::Agents(fetcher.agents().await?),
        PollCategory::Convoys => Payload::Convoys(fetcher.convoys().await?),
        PollCategory::Mail => Payload::Mail(fetcher.mail().await?),
        PollCategory::Refinery => Payload::Refinery(fetcher.refinery().await?),
        PollCategory::Witnesses => Payload::Witnesses(fetcher.witnesses().await?),
        PollCategory::PullRequests => Payload::PullRequests(fetcher.pull_requests().await?),
        PollCategory::Resources => return Ok(Fetched::Samples(fetcher.resources().await?)),
        PollCategory::AgentDetail => {
            let (rig, name) = target.ok_or(FetchError::NoTarget)?;
            Payload::AgentDetail(fetcher.agent_detail(&rig, &name).await)
        }
    };
    Ok(Fetched::Ready(payload))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandError, CommandSpec};
    use crate::fetcher::CommandTimeouts;

    struct EmptyInbox;

    impl CommandRunner for EmptyInbox {
        async fn run(&self, _spec: &CommandSpec) -> Result<String, CommandError> {
            Ok("[]".to_string())
        }
    }

    fn scheduler() -> Scheduler<EmptyInbox> {
        let fetcher = Fetcher::new(Arc::new(EmptyInbox), "/tmp/town", CommandTimeouts::default());
        Scheduler::new(Arc::new(fetcher), SchedulerConfig::default()).0
    }

    async fn next_event(s: &mut Scheduler<EmptyInbox>) -> Event {
        loop {
            match s.tasks.join_next().await {
                Some(Ok(event)) => return event,
                Some(Err(e)) => assert!(e.is_cancelled()),
                None => panic!("no tasks left"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_manual_ticks_keep_one_live_timer() {
        let mut s = scheduler();
        for _ in 0..5 {
            s.begin(PollCategory::Mail);
            let event = next_event(&mut s).await;
            assert!(matches!(event, Event::Done { .. }));
            s.handle(event);
        }

        // Superseded timers were aborted, so only the newest one is still sleeping.
        while s.tasks.len() > 1 {
            let joined = s.tasks.join_next().await;
            assert!(matches!(joined, Some(Err(ref e)) if e.is_cancelled()));
        }
        assert_eq!(s.timers.len(), 1);

        let Event::Timer { generation, .. } = next_event(&mut s).await else {
            panic!("expected the armed timer");
        };
        assert!(s.states[&PollCategory::Mail].is_current(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn deselect_aborts_detail_timer() {
        let mut s = scheduler();
        s.control(Control::SelectAgent {
            rig: "kt".into(),
            name: "max".into(),
        });
        let event = next_event(&mut s).await;
        s.handle(event);
        assert!(s.timers.contains_key(&PollCategory::AgentDetail));

        s.control(Control::DeselectAgent);
        assert!(s.timers.is_empty());
        let joined = s.tasks.join_next().await;
        assert!(matches!(joined, Some(Err(ref e)) if e.is_cancelled()));
    }

    #[tokio::test]
    async fn detail_tick_needs_a_selection() {
        let mut s = scheduler();
        s.control(Control::Tick(PollCategory::AgentDetail));
        assert!(s.tasks.is_empty());
        assert!(!s.states[&PollCategory::AgentDetail].in_flight);
    }
}
