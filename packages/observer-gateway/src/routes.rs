//! `GET /api/panes` and `GET /api/panes/{id}`: a snapshot read of the
//! registry, independent of the push channel in `ws.rs`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use observer_core::model::{InputRequest, PaneInfo, PaneStatus};

use crate::state::AppState;

#[derive(Serialize)]
pub struct PaneDetail {
    pub pane_id: String,
    pub status: PaneStatus,
    pub lines: Vec<String>,
    pub input_request: Option<InputRequest>,
}

pub async fn list_panes(State(state): State<AppState>) -> Json<Vec<PaneInfo>> {
    let panes = state
        .ctx
        .registry
        .get_all()
        .into_iter()
        .map(|p| p.to_info())
        .collect();
    Json(panes)
}

pub async fn get_pane(
    State(state): State<AppState>,
    Path(pane_id): Path<String>,
) -> impl IntoResponse {
    match state.ctx.registry.get(&pane_id) {
        Some(pane) => Json(PaneDetail {
            pane_id: pane.pane_id,
            status: pane.status,
            lines: pane.last_lines,
            input_request: pane.input_request,
        })
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
