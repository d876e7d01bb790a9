use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    app::AppState,
    delivery::http::v1::{json_body, middleware::AuthenticatedUser, parse_id},
    usecase::{contracts::DocumentStore, error::UsecaseError, query_features::QueryParams},
};

/// Fills `tour` from the route and `user` from the principal when the body omits them.
fn with_defaults(payload: Value, tour_id: Option<Uuid>, user_id: Uuid) -> Value {
    match payload {
        Value::Object(mut doc) => {
            if let Some(tour_id) = tour_id {
                doc.entry("tour")
                    .or_insert_with(|| Value::String(tour_id.to_string()));
            }
            doc.entry("user")
                .or_insert_with(|| Value::String(user_id.to_string()));
            Value::Object(doc)
        }
        other => other,
    }
}

#[tracing::instrument(skip(state, params))]
pub async fn list_reviews<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<QueryParams>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling list reviews request");

    let envelope = state.reviews.list(None, &params).await?;
    Ok((StatusCode::OK, Json(envelope)))
}

#[tracing::instrument(skip(state, params))]
pub async fn list_tour_reviews<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(params): Query<QueryParams>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling list tour reviews request");

    let envelope = state.reviews.list(Some(parse_id(&id)?), &params).await?;
    Ok((StatusCode::OK, Json(envelope)))
}

#[tracing::instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn get_review<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling get review request");

    let envelope = state.reviews.get_one(parse_id(&id)?).await?;
    Ok((StatusCode::OK, Json(envelope)))
}

#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id))]
pub async fn create_review<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling create review request");

    let payload = with_defaults(json_body(payload)?, None, user.user_id);
    let envelope = state.reviews.create_one(payload).await?;
    Ok((StatusCode::CREATED, Json(envelope)))
}

#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id))]
pub async fn create_tour_review<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling create tour review request");

    let tour_id = parse_id(&id)?;
    let payload = with_defaults(json_body(payload)?, Some(tour_id), user.user_id);
    let envelope = state.reviews.create_one(payload).await?;
    Ok((StatusCode::CREATED, Json(envelope)))
}

#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id))]
pub async fn update_review<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling update review request");

    let id = parse_id(&id)?;
    let envelope = state.reviews.update_one(id, json_body(payload)?).await?;
    Ok((StatusCode::OK, Json(envelope)))
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id))]
pub async fn delete_review<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling delete review request");

    state.reviews.delete_one(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_defaults_keeps_explicit_values() {
        let tour = Uuid::new_v4();
        let author = Uuid::new_v4();
        let explicit = Uuid::new_v4();

        let filled = with_defaults(json!({"review": "Nice"}), Some(tour), author);
        assert_eq!(filled["tour"], json!(tour.to_string()));
        assert_eq!(filled["user"], json!(author.to_string()));

        let kept = with_defaults(json!({"tour": explicit}), Some(tour), author);
        assert_eq!(kept["tour"], json!(explicit.to_string()));
    }
}
