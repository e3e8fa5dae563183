// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository, or online at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The daemon's HTTP surface: a Prometheus metrics endpoint and a
//! liveness check, grounded on the original's Prometheus-proxying web
//! collaborator and the materialize workspace's `handle_prometheus`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use wf_backend::KvBackend;
use wf_ore::metrics::MetricsRegistry;

pub struct AppState {
    pub metrics: MetricsRegistry,
    pub backend: Arc<dyn KvBackend>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", get(handle_metrics))
        .route("/healthz", get(handle_healthz))
        .with_state(state)
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.gather_and_encode() {
        Ok(buffer) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], buffer).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn handle_healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.backend.ping().await {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(err) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response(),
    }
}
