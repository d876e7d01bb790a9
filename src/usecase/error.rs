use std::sync::atomic::{AtomicBool, Ordering};

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::repository::errors::RepositoryError;

pub const GENERIC_FAILURE_MESSAGE: &str = "Something went very wrong!";

static HIDE_INTERNAL_DETAILS: AtomicBool = AtomicBool::new(false);

/// Production mode: 5xx responses carry only the generic message. Details are
/// still logged.
pub fn hide_internal_details(hide: bool) {
    HIDE_INTERNAL_DETAILS.store(hide, Ordering::Relaxed);
}

#[derive(Debug, Error)]
pub enum UsecaseError {
    #[error("No {entity} found with ID {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Can't find {0} on this server!")]
    RouteNotFound(String),

    #[error("{0}")]
    ValidationFailed(String),

    #[error("{0}")]
    MalformedQuery(String),

    #[error("You are not logged in! Please log in to get access.")]
    Unauthorized,

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("{0}")]
    StoreUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl From<RepositoryError> for UsecaseError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Validation(_) | RepositoryError::Duplicate { .. } => {
                UsecaseError::ValidationFailed(e.to_string())
            }
            RepositoryError::InvalidQuery(msg) => UsecaseError::MalformedQuery(msg),
            RepositoryError::Unavailable(msg) => {
                metrics::counter!("tours_store_errors_total", "kind" => "unavailable").increment(1);
                UsecaseError::StoreUnavailable(msg)
            }
            RepositoryError::DatabaseError(msg) => {
                metrics::counter!("tours_store_errors_total", "kind" => "database").increment(1);
                UsecaseError::Internal(msg)
            }
            RepositoryError::NotFound => UsecaseError::Internal("document vanished mid-operation".to_string()),
        }
    }
}

impl UsecaseError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            UsecaseError::NotFound { .. } | UsecaseError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            UsecaseError::ValidationFailed(_) | UsecaseError::MalformedQuery(_) => {
                StatusCode::BAD_REQUEST
            }
            UsecaseError::Unauthorized => StatusCode::UNAUTHORIZED,
            UsecaseError::Forbidden => StatusCode::FORBIDDEN,
            UsecaseError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            UsecaseError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn public_message(&self, hide_internal: bool) -> String {
        if hide_internal && self.status_code().is_server_error() {
            GENERIC_FAILURE_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for UsecaseError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();

        match &self {
            UsecaseError::Internal(_) | UsecaseError::StoreUnavailable(_) => {
                tracing::error!(error = %self, "internal error");
            }
            UsecaseError::NotFound { .. } | UsecaseError::RouteNotFound(_) => {
                tracing::warn!(error = %self, "resource not found");
            }
            UsecaseError::Unauthorized | UsecaseError::Forbidden => {
                tracing::warn!(error = %self, "access denied");
            }
            _ => {
                tracing::debug!(error = %self);
            }
        }

        let body = json!({
            "status": if status.is_server_error() { "error" } else { "fail" },
            "message": self.public_message(HIDE_INTERNAL_DETAILS.load(Ordering::Relaxed)),
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_errors_map_to_usecase_errors() {
        let duplicate = UsecaseError::from(RepositoryError::Duplicate {
            fields: "name".to_string(),
            value: "\"The Forest Hiker\"".to_string(),
        });
        assert!(matches!(duplicate, UsecaseError::ValidationFailed(_)));
        assert_eq!(
            duplicate.to_string(),
            "Duplicate field value \"The Forest Hiker\" for (name). Please use another value!"
        );

        let invalid = UsecaseError::from(RepositoryError::Validation(
            "Rating must be between 1 and 5".to_string(),
        ));
        assert_eq!(invalid.to_string(), "Invalid input data. Rating must be between 1 and 5");

        assert!(matches!(
            UsecaseError::from(RepositoryError::InvalidQuery("bad".to_string())),
            UsecaseError::MalformedQuery(_)
        ));
        assert!(matches!(
            UsecaseError::from(RepositoryError::Unavailable("down".to_string())),
            UsecaseError::StoreUnavailable(_)
        ));
        assert!(matches!(
            UsecaseError::from(RepositoryError::DatabaseError("boom".to_string())),
            UsecaseError::Internal(_)
        ));
    }

    #[test]
    fn test_status_codes() {
        let id = Uuid::new_v4();
        assert_eq!(
            UsecaseError::NotFound { entity: "tour", id }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            UsecaseError::MalformedQuery(String::new()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(UsecaseError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(UsecaseError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            UsecaseError::StoreUnavailable(String::new()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_not_found_message_names_entity_and_id() {
        let id = Uuid::nil();
        assert_eq!(
            UsecaseError::NotFound { entity: "tour", id }.to_string(),
            "No tour found with ID 00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_hardened_mode_hides_only_server_errors() {
        let internal = UsecaseError::Internal("pool exhausted on db-3".to_string());
        assert_eq!(internal.public_message(true), GENERIC_FAILURE_MESSAGE);
        assert_eq!(internal.public_message(false), "pool exhausted on db-3");

        let invalid = UsecaseError::MalformedQuery("Invalid id: 42".to_string());
        assert_eq!(invalid.public_message(true), "Invalid id: 42");
    }

    #[tokio::test]
    async fn test_response_body_status_field() {
        let response = UsecaseError::ValidationFailed("Invalid input data. x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"status": "fail", "message": "Invalid input data. x"}));
    }
}
