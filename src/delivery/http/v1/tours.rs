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
    },
    domain::user::Role,
    usecase::{contracts::DocumentStore, error::UsecaseError, query_features::QueryParams},
};

pub(crate) const TOUR_STAFF: [Role; 2] = [Role::Admin, Role::LeadGuide];

#[tracing::instrument(skip(state, params))]
pub async fn list_tours<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<QueryParams>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling list tours request");

    let envelope = state.tours.list(None, &params).await?;
    Ok((StatusCode::OK, Json(envelope)))
}

#[tracing::instrument(skip(state))]
pub async fn get_tour<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling get tour request");

    let envelope = state.tours.get_one(parse_id(&id)?).await?;
    Ok((StatusCode::OK, Json(envelope)))
}

#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id))]
pub async fn create_tour<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, UsecaseError> {
    restrict_to(&user, &TOUR_STAFF)?;
    tracing::debug!("handling create tour request");

    let envelope = state.tours.create_one(json_body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(envelope)))
}

#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id))]
pub async fn update_tour<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, UsecaseError> {
    restrict_to(&user, &TOUR_STAFF)?;
    tracing::debug!("handling update tour request");

    let id = parse_id(&id)?;
    let envelope = state.tours.update_one(id, json_body(payload)?).await?;
    Ok((StatusCode::OK, Json(envelope)))
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id))]
pub async fn delete_tour<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, UsecaseError> {
    restrict_to(&user, &TOUR_STAFF)?;
    tracing::debug!("handling delete tour request");

    state.tours.delete_one(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
