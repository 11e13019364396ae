use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Json, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app::Result;
use crate::core::generation::History;
use crate::core::model::ModelVariant;
use crate::envconfig::Host;
use crate::facade::{web_demo_reply, LlmModel, WebDemoReply};

pub struct Server {
    host: String,
    port: u16,
    router: Router,
}

impl Server {
    pub fn new() -> Self {
        let host = Host::from_env();
        Self {
            host: host.host,
            port: host.port,
            router: Router::new(),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn routes(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!("Web demo listening on http://{}", addr);

        axum::serve(listener, self.router).await?;

        Ok(())
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

/// One loaded model shared by all requests; generation is serialized.
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<Mutex<Box<dyn LlmModel>>>,
    pub variant: ModelVariant,
}

impl AppState {
    pub fn new(model: Box<dyn LlmModel>) -> Self {
        let variant = model.variant();
        Self {
            model: Arc::new(Mutex::new(model)),
            variant,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DemoRequest {
    pub input: String,
    #[serde(default)]
    pub history: History,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: ModelVariant,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/demo", post(demo))
        .with_state(state)
}

async fn health(AxumState(state): AxumState<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.variant,
    })
}

async fn demo(
    AxumState(state): AxumState<AppState>,
    payload: std::result::Result<Json<DemoRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            tracing::debug!("rejected web demo request: {}", rejection.body_text());
            return error_response(rejection.status(), &rejection.body_text());
        }
    };
    if req.input.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "input must not be empty");
    }

    let model = Arc::clone(&state.model);
    let turns = req.history.len();
    let result = tokio::task::spawn_blocking(move || -> crate::error::Result<WebDemoReply> {
        let model = model.lock();
        let stream = model.run_web_demo(&req.input, &req.history);
        web_demo_reply(stream)
    })
    .await;

    match result {
        Ok(Ok(reply)) => {
            tracing::debug!(turns, response_chars = reply.response.chars().count(), "web demo reply");
            Json(reply).into_response()
        }
        Ok(Err(e)) => {
            tracing::error!("web demo generation failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
        Err(e) => {
            tracing::error!("web demo task panicked: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "generation task failed")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
