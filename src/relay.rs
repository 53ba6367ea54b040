//! Email relay: passes vendor mail on to a fixed downstream endpoint.
//!
//! Only one sender/recipient pair is relayed, compared case-insensitively.
//! Everything else is refused.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use derive_more::{Display, From};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{api::Email, config};

pub struct Relay {
    client: reqwest::Client,
    downstream_url: String,
    allowed_from: String,
    allowed_to: String,
}

impl Relay {
    pub fn new(config: &config::Relay) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(config.timeout)
                .build()?,
            downstream_url: config.downstream_url.clone(),
            allowed_from: config.allowed_from.to_lowercase(),
            allowed_to: config.allowed_to.to_lowercase(),
        })
    }

    pub fn is_allowed(&self, email: &Email) -> bool {
        email.from.to_lowercase() == self.allowed_from
            && email.to.to_lowercase() == self.allowed_to
    }

    /// Posts `email` downstream as is. Anything but `200 OK` is a failure.
    pub async fn forward(&self, email: &Email) -> Result<(), ForwardError> {
        let resp = self
            .client
            .post(&self.downstream_url)
            .json(email)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(ForwardError::Status { status, body });
        }
        Ok(())
    }
}

#[derive(Debug, Display, From)]
pub enum ForwardError {
    #[display("failed to send request: {_0}")]
    #[from]
    Send(reqwest::Error),
    #[display("received non-200 response: {status}, body: {body}")]
    Status { status: StatusCode, body: String },
}

impl std::error::Error for ForwardError {}

pub fn router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route("/forward-email", post(forward_email))
        .with_state(relay)
}

pub fn app(relay: Arc<Relay>) -> Router {
    router(relay).layer(TraceLayer::new_for_http())
}

async fn forward_email(
    State(relay): State<Arc<Relay>>,
    body: Result<Json<Email>, JsonRejection>,
) -> Result<&'static str, ForwardEmailError> {
    use ForwardEmailError as E;

    let Json(email) = body?;
    if !relay.is_allowed(&email) {
        return Err(E::Forbidden {
            from: email.from,
            to: email.to,
        });
    }

    relay.forward(&email).await?;
    info!(subject = %email.subject, "forwarded email");
    Ok("Email forwarded successfully")
}

#[derive(Debug, From)]
pub enum ForwardEmailError {
    #[from]
    Decode(JsonRejection),
    Forbidden {
        from: String,
        to: String,
    },
    #[from]
    Forward(ForwardError),
}

impl IntoResponse for ForwardEmailError {
    fn into_response(self) -> Response {
        match self {
            Self::Decode(e) => {
                warn!("invalid request body: {e}");
                (StatusCode::BAD_REQUEST, "Invalid request body")
            }
            Self::Forbidden { from, to } => {
                warn!(%from, %to, "refused to forward email");
                (
                    StatusCode::FORBIDDEN,
                    "Forbidden: Invalid sender or recipient",
                )
            }
            Self::Forward(e) => {
                error!("failed to forward email: {e}");
                (StatusCode::BAD_GATEWAY, "Failed to forward email")
            }
        }
        .into_response()
    }
}
