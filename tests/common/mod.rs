#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use reqwest::StatusCode;
use serde_json::Value;
use ticket_register::{api, db::MemoryStore, server};
use tokio::net::TcpListener;

/// Serves `app` on an ephemeral local port, returning its base URL.
pub async fn serve(app: axum::Router) -> String {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().expect("no local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server failed");
    });
    format!("http://{addr}")
}

/// Ticket API backed by a fresh in-memory store.
pub struct Server {
    pub store: Arc<MemoryStore>,
    pub client: Client,
}

impl Server {
    pub async fn spawn() -> Self {
        let store = Arc::new(MemoryStore::new());
        let base_url = serve(server::router(store.clone())).await;
        Self {
            store,
            client: Client::new(base_url),
        }
    }
}

pub struct Client {
    inner: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new(base_url: String) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url,
        }
    }

    async fn post_text(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<String, (StatusCode, String)> {
        let resp = self
            .inner
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .expect("failed to send a request");
        let status = resp.status();
        let text = resp.text().await.expect("failed to get a response");
        if status.is_success() {
            Ok(text)
        } else {
            Err((status, text))
        }
    }

    async fn get(&self, path: &str, user_id: Option<&str>) -> reqwest::Response {
        let mut req = self.inner.get(format!("{}{path}", self.base_url));
        if let Some(user_id) = user_id {
            req = req.query(&[("userId", user_id)]);
        }
        req.send().await.expect("failed to send a request")
    }

    pub async fn insert(
        &self,
        body: Value,
    ) -> Result<String, (StatusCode, String)> {
        self.post_text("/insert", &body).await
    }

    pub async fn update(
        &self,
        body: Value,
    ) -> Result<String, (StatusCode, String)> {
        self.post_text("/update", &body).await
    }

    pub async fn register_vendor_ticket(
        &self,
        body: Value,
    ) -> Result<String, (StatusCode, String)> {
        self.post_text("/register", &body).await
    }

    pub async fn post_raw(&self, path: &str, body: &'static str) -> StatusCode {
        self.inner
            .post(format!("{}{path}", self.base_url))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .expect("failed to send a request")
            .status()
    }

    pub async fn fetch_user_tickets(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<api::ticket::Holding>, StatusCode> {
        Ok(self
            .get("/fetchUserTickets", user_id)
            .await
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json()
            .await
            .expect("failed to get a response"))
    }

    pub async fn fetch_overlapping_tickets(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<api::ticket::Holding>, StatusCode> {
        Ok(self
            .get("/fetchOverlappingTickets", user_id)
            .await
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json()
            .await
            .expect("failed to get a response"))
    }

    pub async fn mark_duplicate_tickets(
        &self,
        user_id: Option<&str>,
    ) -> Result<String, StatusCode> {
        Ok(self
            .get("/markDuplicateTickets", user_id)
            .await
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .text()
            .await
            .expect("failed to get a response"))
    }
}
