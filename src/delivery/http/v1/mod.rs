pub mod bookings;
pub mod middleware;
pub mod reviews;
pub mod tours;
pub mod users;

use axum::{extract::rejection::JsonRejection, Json};
use serde_json::Value;
use uuid::Uuid;

use crate::usecase::error::UsecaseError;

pub(crate) fn parse_id(raw: &str) -> Result<Uuid, UsecaseError> {
    Uuid::parse_str(raw).map_err(|_| UsecaseError::MalformedQuery(format!("Invalid id: {raw}")))
}

pub(crate) fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, UsecaseError> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "rejected request body");
            Err(UsecaseError::ValidationFailed(rejection.body_text()))
        }
    }
}
