// WebSocket dashboard feed: one scheduler per connection

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};

use super::AppState;
use crate::command::CommandRunner;
use crate::fetcher::Fetcher;
use crate::scheduler::{Control, DashboardView, PollCategory, Scheduler, SchedulerConfig};

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Control frame sent by a client, e.g. `{"type":"tick","category":"mail"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientCommand {
    Refresh,
    Tick { category: PollCategory },
    SelectAgent { rig: String, name: String },
    DeselectAgent,
}

impl From<ClientCommand> for Control {
    fn from(cmd: ClientCommand) -> Self {
        match cmd {
            ClientCommand::Refresh => Control::RefreshAll,
            ClientCommand::Tick { category } => Control::Tick(category),
            ClientCommand::SelectAgent { rig, name } => Control::SelectAgent { rig, name },
            ClientCommand::DeselectAgent => Control::DeselectAgent,
        }
    }
}

/// Decrements the dashboard connection count on drop (connect = +1, drop = -1).
struct WsConnectionGuard(Arc<AtomicUsize>);

impl Drop for WsConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

pub(super) async fn ws_dashboard<R: CommandRunner>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<R>>,
) -> impl IntoResponse {
    let fetcher = state.fetcher.clone();
    let conn_count = state.ws_connections.clone();
    let config = state.config.scheduler_config();
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = stream_dashboard(socket, fetcher, config, conn_count).await {
            tracing::info!("Dashboard stream error: {}", e);
        }
    })
}

async fn send_text(socket: &mut WebSocket, json: String) -> bool {
    matches!(
        timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(json.into()))).await,
        Ok(Ok(()))
    )
}

async fn stream_dashboard<R: CommandRunner>(
    mut socket: WebSocket,
    fetcher: Arc<Fetcher<R>>,
    config: SchedulerConfig,
    conn_count: Arc<AtomicUsize>,
) -> anyhow::Result<()> {
    let active = conn_count.fetch_add(1, Ordering::Relaxed) + 1;
    let _guard = WsConnectionGuard(conn_count);
    tracing::info!(active, "Client connected to dashboard stream");

    // Dropped on return, which cancels every timer and in-flight command of this connection.
    let (scheduler, mut rx) = Scheduler::spawn(fetcher, config);
    let mut view = DashboardView::new();

    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(update) => {
                        let json = serde_json::to_string(view.apply(update))?;
                        if !send_text(&mut socket, json).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket /ws/dashboard client lagged, skipped {} updates", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientCommand>(text.as_str()) {
                            Ok(cmd) => {
                                if !scheduler.send(cmd.into()).await {
                                    break;
                                }
                            }
                            Err(e) => tracing::debug!(error = %e, "ignoring malformed control frame"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "dashboard socket read failed");
                        break;
                    }
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Ping(Bytes::new()))).await;
                if !matches!(r, Ok(Ok(()))) {
                    break;
                }
            }
        }
    }
    tracing::info!("Client disconnected from dashboard stream");
    Ok(())
}
