use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

pub const EMPTY_QUERY_MESSAGE: &str = "Query cannot be empty";
pub const NOT_INITIALIZED_MESSAGE: &str = "System not initialized yet.";
pub const PIPELINE_FAILURE_MESSAGE: &str = "Failed to answer query.";

/// Failures at the `/query` boundary.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{}", EMPTY_QUERY_MESSAGE)]
    EmptyQuery,

    /// The pipeline build failed; the cause is logged, never returned.
    #[error("{}", NOT_INITIALIZED_MESSAGE)]
    NotInitialized(#[source] anyhow::Error),

    /// The chain failed while answering. `expose` decides whether the cause
    /// reaches the client.
    #[error("{}", pipeline_message(.source, .expose))]
    Pipeline {
        #[source]
        source: anyhow::Error,
        expose: bool,
    },
}

fn pipeline_message(source: &anyhow::Error, expose: &bool) -> String {
    if *expose {
        source.to_string()
    } else {
        PIPELINE_FAILURE_MESSAGE.to_string()
    }
}

impl QueryError {
    pub fn status(&self) -> StatusCode {
        match self {
            QueryError::EmptyQuery => StatusCode::BAD_REQUEST,
            QueryError::NotInitialized(_) | QueryError::Pipeline { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        match &self {
            QueryError::EmptyQuery => {}
            QueryError::NotInitialized(err) => {
                tracing::error!("pipeline initialization failed: {:#}", err);
            }
            QueryError::Pipeline { source, .. } => {
                tracing::error!("query failed: {:#}", source);
            }
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_wire_contract() {
        assert_eq!(QueryError::EmptyQuery.to_string(), "Query cannot be empty");
        assert_eq!(
            QueryError::NotInitialized(anyhow::anyhow!("qdrant down")).to_string(),
            "System not initialized yet."
        );
    }

    #[test]
    fn pipeline_message_exposure_is_configurable() {
        let exposed = QueryError::Pipeline {
            source: anyhow::anyhow!("model not found"),
            expose: true,
        };
        assert_eq!(exposed.to_string(), "model not found");

        let hidden = QueryError::Pipeline {
            source: anyhow::anyhow!("model not found"),
            expose: false,
        };
        assert_eq!(hidden.to_string(), PIPELINE_FAILURE_MESSAGE);
    }

    #[test]
    fn statuses_split_client_and_server_errors() {
        assert_eq!(QueryError::EmptyQuery.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            QueryError::NotInitialized(anyhow::anyhow!("x")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
