//! Ticket API routes.

use std::{fmt::Display, sync::Arc};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use derive_more::From;
use serde::Deserialize;
use time::OffsetDateTime;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    api::ticket::{Holding, PaymentUpdate, Registration, Vendor, VendorRecord},
    config,
    db::vendor::UnknownVendor,
    store::{self, Storage},
};

pub type SharedAppState = Arc<AppState>;

pub struct AppState {
    pub store: Arc<dyn Storage>,
}

/// Routes without middleware.
pub fn router(store: Arc<dyn Storage>) -> Router {
    Router::new()
        .route("/insert", post(insert))
        .route("/update", post(update))
        .route("/register", post(register_vendor_ticket))
        .route("/fetchUserTickets", get(fetch_user_tickets))
        .route("/fetchOverlappingTickets", get(fetch_overlapping_tickets))
        .route("/markDuplicateTickets", get(mark_duplicate_tickets))
        .with_state(Arc::new(AppState { store }))
}

/// [`router`] behind CORS, request tracing and the per-request deadline.
pub fn app(
    store: Arc<dyn Storage>,
    config: &config::Http,
) -> Result<Router, axum::http::header::InvalidHeaderValue> {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);
    for origin in &config.cors.allowed_origins {
        cors = cors.allow_origin(origin.parse::<HeaderValue>()?);
    }

    Ok(router(store)
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

/// Plaintext error body, logged on the way out.
fn error_response(status: StatusCode, message: impl Display) -> Response {
    if status.is_server_error() {
        error!(%status, "{message}");
    } else {
        warn!(%status, "{message}");
    }
    (status, message.to_string()).into_response()
}

async fn insert(
    State(state): State<SharedAppState>,
    body: Result<Json<Registration>, JsonRejection>,
) -> Result<&'static str, InsertError> {
    let Json(registration) = body?;
    info!(?registration, "registering ticket");

    let registered = state.store.register(&registration).await?;
    info!(
        ticket_id = %registered.ticket_id,
        user_ticket_id = %registered.user_ticket_id,
        is_duplicate = registered.is_duplicate(),
        "ticket registered",
    );

    Ok("Data inserted successfully")
}

#[derive(Debug, From)]
pub enum InsertError {
    #[from]
    Decode(JsonRejection),
    #[from]
    Store(store::Error),
}

impl IntoResponse for InsertError {
    fn into_response(self) -> Response {
        match self {
            Self::Decode(e) => error_response(
                StatusCode::BAD_REQUEST,
                format_args!("Failed to decode JSON: {e}"),
            ),
            Self::Store(e) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format_args!("An error occurred: {e}"),
            ),
        }
    }
}

async fn update(
    State(state): State<SharedAppState>,
    body: Result<Json<PaymentUpdate>, JsonRejection>,
) -> Result<&'static str, UpdateError> {
    let Json(update) = body?;
    state.store.mark_paid(&update).await?;
    Ok("Data updated successfully")
}

#[derive(Debug, From)]
pub enum UpdateError {
    #[from]
    Decode(JsonRejection),
    #[from]
    Store(store::Error),
}

impl IntoResponse for UpdateError {
    fn into_response(self) -> Response {
        match self {
            Self::Decode(e) => error_response(
                StatusCode::BAD_REQUEST,
                format_args!("Failed to decode JSON: {e}"),
            ),
            Self::Store(e @ store::Error::NotFound(_)) => error_response(
                StatusCode::NOT_FOUND,
                format_args!("The specified event was not found: {e}"),
            ),
            Self::Store(e) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format_args!("An error occurred: {e}"),
            ),
        }
    }
}

async fn register_vendor_ticket(
    State(state): State<SharedAppState>,
    body: Result<Json<VendorRecord>, JsonRejection>,
) -> Result<&'static str, RegisterVendorTicketError> {
    let Json(record) = body?;
    let vendor = record.ticket_service.parse::<Vendor>()?;
    info!(%vendor, table = vendor.table(), "recording vendor ticket");

    state.store.record_vendor_ticket(vendor, &record).await?;
    Ok("Data inserted successfully")
}

#[derive(Debug, From)]
pub enum RegisterVendorTicketError {
    #[from]
    Decode(JsonRejection),
    #[from]
    UnknownVendor(UnknownVendor),
    #[from]
    Store(store::Error),
}

impl IntoResponse for RegisterVendorTicketError {
    fn into_response(self) -> Response {
        match self {
            Self::Decode(e) => error_response(
                StatusCode::BAD_REQUEST,
                format_args!("Failed to decode JSON: {e}"),
            ),
            Self::UnknownVendor(e) => error_response(
                StatusCode::BAD_REQUEST,
                format_args!("Invalid table name: {e}"),
            ),
            Self::Store(e) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format_args!("An error occurred: {e}"),
            ),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: Option<String>,
}

impl UserQuery {
    fn extract(
        query: Result<Query<Self>, QueryRejection>,
    ) -> Result<String, QueryError> {
        let Query(Self { user_id }) = query?;
        user_id
            .filter(|id| !id.is_empty())
            .ok_or(QueryError::MissingUserId)
    }
}

async fn fetch_user_tickets(
    State(state): State<SharedAppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<Vec<Holding>>, QueryError> {
    let user_id = UserQuery::extract(query)?;
    let holdings = state
        .store
        .fetch_user_tickets(&user_id, OffsetDateTime::now_utc())
        .await?;
    Ok(Json(holdings))
}

async fn fetch_overlapping_tickets(
    State(state): State<SharedAppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<Vec<Holding>>, QueryError> {
    let user_id = UserQuery::extract(query)?;
    let holdings = state.store.fetch_overlapping_tickets(&user_id).await?;
    Ok(Json(holdings))
}

async fn mark_duplicate_tickets(
    State(state): State<SharedAppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<String, QueryError> {
    let user_id = UserQuery::extract(query)?;
    let flagged = state.store.mark_duplicate_tickets(&user_id).await?;
    Ok(format!("Marked {flagged} duplicate tickets"))
}

#[derive(Debug, From)]
pub enum QueryError {
    #[from]
    Decode(QueryRejection),
    MissingUserId,
    #[from]
    Store(store::Error),
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        match self {
            Self::Decode(e) => error_response(
                StatusCode::BAD_REQUEST,
                format_args!("Invalid query: {e}"),
            ),
            Self::MissingUserId => error_response(
                StatusCode::BAD_REQUEST,
                "Missing userId parameter",
            ),
            Self::Store(e) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format_args!("An error occurred: {e}"),
            ),
        }
    }
}
