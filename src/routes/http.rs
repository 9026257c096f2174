// GET handlers: version, api/categories

use axum::{extract::State, response::IntoResponse};

use super::AppState;
use crate::command::CommandRunner;
use crate::scheduler::PollCategory;
use crate::version::{NAME, VERSION};

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/categories: poll categories with their configured intervals.
pub(super) async fn categories_handler<R: CommandRunner>(
    State(state): State<AppState<R>>,
) -> impl IntoResponse {
    let categories: Vec<_> = PollCategory::ALL
        .into_iter()
        .map(|c| {
            serde_json::json!({
                "name": c.name(),
                "intervalSecs": state.config.poll_interval.seconds(c),
                "onDemand": c.is_on_demand(),
            })
        })
        .collect();
    axum::Json(categories)
}
