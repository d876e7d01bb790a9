use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::Uri,
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use crate::{
    delivery::http::v1::{bookings, middleware::auth_middleware, reviews, tours, users},
    domain::{
        booking::{Booking, BOOKING_POPULATION},
        review::REVIEW_AUTHOR,
        tour::{Tour, TOUR_DETAIL_POPULATION, TOUR_LIST_POPULATION},
        user::User,
    },
    repository::{entity::EntityRepository, reviews::ReviewRepository},
    usecase::{
        contracts::{DocumentStore, TokenVerifier},
        error::UsecaseError,
        handler_factory::HandlerFactory,
        profile::ProfileUseCase,
    },
};

pub const MAX_BODY_BYTES: usize = 10 * 1024;

pub struct AppState<S: DocumentStore> {
    pub tours: HandlerFactory<EntityRepository<Tour, S>>,
    pub reviews: HandlerFactory<ReviewRepository<S>>,
    pub bookings: HandlerFactory<EntityRepository<Booking, S>>,
    pub users: HandlerFactory<EntityRepository<User, S>>,
    pub profile: ProfileUseCase<S>,
    pub token_verifier: Arc<dyn TokenVerifier>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl<S: DocumentStore> AppState<S> {
    pub fn new(
        store: S,
        token_verifier: Arc<dyn TokenVerifier>,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            tours: HandlerFactory::new(EntityRepository::new(store.clone()))
                .with_population(&TOUR_LIST_POPULATION)
                .with_read_population(&TOUR_DETAIL_POPULATION),
            reviews: HandlerFactory::new(ReviewRepository::new(store.clone()))
                .with_population(&REVIEW_AUTHOR)
                .nested_under("tour"),
            bookings: HandlerFactory::new(EntityRepository::new(store.clone()))
                .with_population(&BOOKING_POPULATION)
                .nested_under("tour"),
            users: HandlerFactory::new(EntityRepository::new(store.clone())),
            profile: ProfileUseCase::new(store),
            token_verifier,
            metrics_handle,
        }
    }
}

pub fn router<S: DocumentStore>(shared_state: Arc<AppState<S>>) -> Router {
    let public_api = Router::new()
        .route("/api/v1/tours", get(tours::list_tours::<S>))
        .route("/api/v1/tours/{id}", get(tours::get_tour::<S>));

    let protected_api = Router::new()
        .route("/api/v1/tours", post(tours::create_tour::<S>))
        .route(
            "/api/v1/tours/{id}",
            patch(tours::update_tour::<S>).delete(tours::delete_tour::<S>),
        )
        .route(
            "/api/v1/tours/{id}/reviews",
            get(reviews::list_tour_reviews::<S>).post(reviews::create_tour_review::<S>),
        )
        .route(
            "/api/v1/tours/{id}/bookings",
            get(bookings::list_tour_bookings::<S>),
        )
        .route(
            "/api/v1/reviews",
            get(reviews::list_reviews::<S>).post(reviews::create_review::<S>),
        )
        .route(
            "/api/v1/reviews/{id}",
            get(reviews::get_review::<S>)
                .patch(reviews::update_review::<S>)
                .delete(reviews::delete_review::<S>),
        )
        .route(
            "/api/v1/bookings",
            get(bookings::list_bookings::<S>).post(bookings::create_booking::<S>),
        )
        .route(
            "/api/v1/bookings/{id}",
            get(bookings::get_booking::<S>).delete(bookings::delete_booking::<S>),
        )
        .route("/api/v1/users/me", get(users::get_me::<S>))
        .route(
            "/api/v1/users/updateMe",
            patch(users::update_me::<S>),
        )
        .route(
            "/api/v1/users/deleteMe",
            delete(users::delete_me::<S>),
        )
        .route(
            "/api/v1/users",
            get(users::list_users::<S>).post(users::create_user::<S>),
        )
        .route(
            "/api/v1/users/{id}",
            get(users::get_user::<S>)
                .patch(users::update_user::<S>)
                .delete(users::delete_user::<S>),
        )
        .layer(middleware::from_fn_with_state(
            shared_state.clone(),
            auth_middleware::<S>,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::<S>))
        .merge(public_api)
        .merge(protected_api)
        .fallback(route_not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state)
}

async fn metrics<S: DocumentStore>(State(state): State<Arc<AppState<S>>>) -> String {
    metrics_process::Collector::default().collect();
    state
        .metrics_handle
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

#[tracing::instrument]
async fn healthz() -> &'static str {
    "OK"
}

async fn route_not_found(uri: Uri) -> UsecaseError {
    UsecaseError::RouteNotFound(uri.to_string())
}
