use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::Value;

use crate::{
    app::AppState,
    delivery::http::v1::{
        json_body,
        middleware::{restrict_to, AuthenticatedUser},
        parse_id,
        tours::TOUR_STAFF,
    },
    usecase::{contracts::DocumentStore, error::UsecaseError, query_features::QueryParams},
};

#[tracing::instrument(skip(state, params), fields(user_id = %user.user_id))]
pub async fn list_bookings<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(params): Query<QueryParams>,
) -> Result<impl IntoResponse, UsecaseError> {
    restrict_to(&user, &TOUR_STAFF)?;

    let envelope = state.bookings.list(None, &params).await?;
    Ok((StatusCode::OK, Json(envelope)))
}

#[tracing::instrument(skip(state, params), fields(user_id = %user.user_id))]
pub async fn list_tour_bookings<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    Query(params): Query<QueryParams>,
) -> Result<impl IntoResponse, UsecaseError> {
    restrict_to(&user, &TOUR_STAFF)?;

    let envelope = state.bookings.list(Some(parse_id(&id)?), &params).await?;
    Ok((StatusCode::OK, Json(envelope)))
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id))]
pub async fn get_booking<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, UsecaseError> {
    restrict_to(&user, &TOUR_STAFF)?;

    let envelope = state.bookings.get_one(parse_id(&id)?).await?;
    Ok((StatusCode::OK, Json(envelope)))
}

#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id))]
pub async fn create_booking<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, UsecaseError> {
    restrict_to(&user, &TOUR_STAFF)?;

    let envelope = state.bookings.create_one(json_body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(envelope)))
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id))]
pub async fn delete_booking<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, UsecaseError> {
    restrict_to(&user, &TOUR_STAFF)?;

    state.bookings.delete_one(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
