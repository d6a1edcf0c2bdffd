use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::QueryError;
use crate::models::{HealthResponse, QueryRequest, QueryResponse};
use crate::pipeline::PipelineState;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<PipelineState>,
    expose_errors: bool,
}

impl AppState {
    pub fn new(pipeline: Arc<PipelineState>, expose_errors: bool) -> Self {
        Self {
            pipeline,
            expose_errors,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: AppConfig, pipeline: Arc<PipelineState>) -> Result<()> {
    if config.eager_init {
        if let Err(err) = pipeline.ensure_initialized().await {
            tracing::warn!(
                "eager initialization failed; retrying on first query: {:#}",
                err
            );
        }
    }

    let app = build_router(AppState::new(pipeline, config.expose_errors));

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn query_handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, QueryError> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::debug!("rejected query body: {}", rejection.body_text());
            QueryRequest::default()
        }
    };

    let query = request
        .query
        .filter(|query| !query.trim().is_empty())
        .ok_or(QueryError::EmptyQuery)?;

    let chain = state
        .pipeline
        .ensure_initialized()
        .await
        .map_err(QueryError::NotInitialized)?;

    let response = chain
        .run(&query)
        .await
        .map_err(|source| QueryError::Pipeline {
            source,
            expose: state.expose_errors,
        })?;

    Ok(Json(QueryResponse { response }))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        initialized: state.pipeline.is_initialized(),
    })
}
