//! Debug HTTP surface over a running [`FeedHost`].

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::host::FeedHost;
use crate::metrics::Metrics;
use crate::navigation::{InputEvent, Transition};
use crate::shared::RequestState;
use crate::state::FeedSnapshot;
use crate::story::ComponentKind;
use crate::window::Slot;

pub fn create_router(host: FeedHost, metrics: &Metrics) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/feed", get(feed))
        .route("/feed/window", get(feed_window))
        .route("/feed/input", post(feed_input))
        .route("/feed/stories/{id}/component", post(select_component))
        .route("/feed/shared", get(shared_status))
        .layer(CorsLayer::very_permissive())
        .with_state(host)
        .merge(metrics.router())
}

async fn feed(State(host): State<FeedHost>) -> Json<FeedSnapshot> {
    Json(host.snapshot())
}

#[derive(Serialize)]
struct WindowOut {
    current_index: usize,
    slots: serde_json::Value,
}

async fn feed_window(State(host): State<FeedHost>) -> Json<WindowOut> {
    let current_index = host.with_state(|st| st.current_index());
    let slots = host.with_window(|slots: &[Slot<'_>]| serde_json::to_value(slots))
        .unwrap_or(serde_json::Value::Null);
    Json(WindowOut {
        current_index,
        slots,
    })
}

async fn feed_input(State(host): State<FeedHost>, Json(ev): Json<InputEvent>) -> Json<Transition> {
    Json(host.handle_input(ev))
}

#[derive(Deserialize)]
struct ComponentReq {
    component: String,
}

async fn select_component(
    State(host): State<FeedHost>,
    Path(id): Path<String>,
    Json(body): Json<ComponentReq>,
) -> StatusCode {
    let Some(kind) = ComponentKind::parse(&body.component) else {
        return StatusCode::BAD_REQUEST;
    };
    if host.select_component(&id, kind) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Serialize)]
struct SharedOut {
    state: Option<RequestState>,
}

async fn shared_status(State(host): State<FeedHost>) -> Json<SharedOut> {
    Json(SharedOut {
        state: host.shared_state(),
    })
}
