pub mod common;

use std::sync::{Arc, Mutex};

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::json;
use ticket_register::{api::Email, config, relay::Relay};

type Received = Arc<Mutex<Vec<Email>>>;

/// Downstream endpoint recording what it receives and answering `status`.
async fn downstream(status: StatusCode) -> (String, Received) {
    let received = Received::default();
    let app = Router::new()
        .route(
            "/forward",
            post(
                move |State(received): State<Received>,
                      Json(email): Json<Email>| async move {
                    received.lock().unwrap().push(email);
                    status
                },
            ),
        )
        .with_state(received.clone());
    let base_url = common::serve(app).await;
    (format!("{base_url}/forward"), received)
}

async fn relay(downstream_url: String) -> String {
    let relay = Relay::new(&config::Relay {
        downstream_url,
        ..config::Relay::default()
    })
    .unwrap();
    common::serve(ticket_register::relay::router(Arc::new(relay))).await
}

async fn send(relay_url: &str, body: serde_json::Value) -> (StatusCode, String) {
    let resp = reqwest::Client::new()
        .post(format!("{relay_url}/forward-email"))
        .json(&body)
        .send()
        .await
        .expect("failed to send a request");
    let status = resp.status();
    (status, resp.text().await.expect("failed to get a response"))
}

fn email(from: &str, to: &str) -> serde_json::Value {
    json!({
        "from": from,
        "to": to,
        "subject": "Your tickets",
        "body": "<p>Payment due</p>",
    })
}

#[tokio::test]
async fn forwards_allowed_pair_verbatim() {
    let (url, received) = downstream(StatusCode::OK).await;
    let relay_url = relay(url).await;

    let (status, text) =
        send(&relay_url, email("LT-Mail@L-Tike.com", "Tickets@Example.com"))
            .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Email forwarded successfully");

    let received = received.lock().unwrap();
    assert_eq!(
        *received,
        [Email {
            from: "LT-Mail@L-Tike.com".into(),
            to: "Tickets@Example.com".into(),
            subject: "Your tickets".into(),
            body: "<p>Payment due</p>".into(),
        }],
    );
}

#[tokio::test]
async fn refuses_other_senders_and_recipients() {
    let (url, received) = downstream(StatusCode::OK).await;
    let relay_url = relay(url).await;

    let (status, _) =
        send(&relay_url, email("spam@example.net", "tickets@example.com"))
            .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) =
        send(&relay_url, email("lt-mail@l-tike.com", "someone@example.com"))
            .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert!(received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reports_downstream_failure() {
    let (url, received) = downstream(StatusCode::SERVICE_UNAVAILABLE).await;
    let relay_url = relay(url).await;

    let (status, text) =
        send(&relay_url, email("lt-mail@l-tike.com", "tickets@example.com"))
            .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(text, "Failed to forward email");
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn rejects_malformed_body() {
    let (url, _) = downstream(StatusCode::OK).await;
    let relay_url = relay(url).await;

    let (status, _) = send(&relay_url, json!({ "from": "x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
