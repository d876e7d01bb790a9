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

const ADMIN: [Role; 1] = [Role::Admin];

#[tracing::instrument(skip(state, params), fields(user_id = %user.user_id))]
pub async fn list_users<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(params): Query<QueryParams>,
) -> Result<impl IntoResponse, UsecaseError> {
    restrict_to(&user, &ADMIN)?;

    let envelope = state.users.list(None, &params).await?;
    Ok((StatusCode::OK, Json(envelope)))
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id))]
pub async fn get_user<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, UsecaseError> {
    restrict_to(&user, &ADMIN)?;

    let envelope = state.users.get_one(parse_id(&id)?).await?;
    Ok((StatusCode::OK, Json(envelope)))
}

/// Profiles are created by an admin, usually mirroring an account the auth
/// service already holds.
#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id))]
pub async fn create_user<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, UsecaseError> {
    restrict_to(&user, &ADMIN)?;

    let envelope = state.users.create_one(json_body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(envelope)))
}

#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id))]
pub async fn update_user<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, UsecaseError> {
    restrict_to(&user, &ADMIN)?;

    let id = parse_id(&id)?;
    let envelope = state.users.update_one(id, json_body(payload)?).await?;
    Ok((StatusCode::OK, Json(envelope)))
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id))]
pub async fn delete_user<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, UsecaseError> {
    restrict_to(&user, &ADMIN)?;

    state.users.delete_one(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id))]
pub async fn get_me<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, UsecaseError> {
    let envelope = state.profile.me(user.user_id).await?;
    Ok((StatusCode::OK, Json(envelope)))
}

#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id))]
pub async fn update_me<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, UsecaseError> {
    let envelope = state
        .profile
        .update_me(user.user_id, json_body(payload)?)
        .await?;
    Ok((StatusCode::OK, Json(envelope)))
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id))]
pub async fn delete_me<S: DocumentStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, UsecaseError> {
    state.profile.delete_me(user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
