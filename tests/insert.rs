pub mod common;

use reqwest::StatusCode;
use serde_json::{json, Value};
use ticket_register::api::ticket::{DuplicateIds, Id};

fn show(name: &str, date: &str, user_id: &str) -> Value {
    json!({
        "ticketService": "eplus",
        "eventName": name,
        "eventDate": date,
        "eventPlace": "Hall 1",
        "ticketCount": 2,
        "userId": user_id,
    })
}

fn ids(raw: &[i64]) -> DuplicateIds {
    raw.iter().copied().map(Id::from).collect()
}

#[tokio::test]
async fn registers_first_ticket_without_duplicates() {
    let server = common::Server::spawn().await;

    let message = server
        .client
        .insert(show("Show A", "2024-05-01", "u1"))
        .await
        .unwrap();
    assert_eq!(message, "Data inserted successfully");

    let tickets = server.store.tickets().await;
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].event_name, "Show A");
    assert_eq!(tickets[0].ticket_service, "eplus");

    let user_tickets = server.store.user_tickets().await;
    assert_eq!(user_tickets.len(), 1);
    assert_eq!(user_tickets[0].user_id, "u1");
    assert_eq!(user_tickets[0].ticket_id, tickets[0].id);
    assert_eq!(user_tickets[0].ticket_count, 2);
    assert!(!user_tickets[0].is_duplicate);
    assert!(user_tickets[0].duplicate_ticket_id.is_empty());
    assert_eq!(user_tickets[0].duplicate_ticket_id.encode(), "");
}

#[tokio::test]
async fn reuses_ticket_for_same_event_day() {
    let server = common::Server::spawn().await;

    server
        .client
        .insert(show("Show A", "2024-05-01T13:00:00Z", "u1"))
        .await
        .unwrap();
    server
        .client
        .insert(show("Show A", "2024-05-01T18:30:00Z", "u2"))
        .await
        .unwrap();

    let tickets = server.store.tickets().await;
    assert_eq!(tickets.len(), 1);

    let user_tickets = server.store.user_tickets().await;
    assert_eq!(user_tickets.len(), 2);
    assert!(user_tickets.iter().all(|ut| ut.ticket_id == tickets[0].id));
    assert!(user_tickets.iter().all(|ut| !ut.is_duplicate));
}

#[tokio::test]
async fn flags_same_day_tickets_both_ways() {
    let server = common::Server::spawn().await;

    server
        .client
        .insert(show("Show A", "2024-05-01", "u1"))
        .await
        .unwrap();
    server
        .client
        .insert(show("Show B", "2024-05-01T19:00:00+00:00", "u1"))
        .await
        .unwrap();

    let tickets = server.store.tickets().await;
    assert_eq!(tickets.len(), 2);
    let (show_a, show_b) = (tickets[0].id, tickets[1].id);
    assert_ne!(show_a, show_b);

    let user_tickets = server.store.user_tickets().await;
    let old = &user_tickets[0];
    let new = &user_tickets[1];
    assert_eq!(new.ticket_id, show_b);
    assert!(new.is_duplicate);
    assert_eq!(new.duplicate_ticket_id, ids(&[1]));
    assert!(new.duplicate_ticket_id.contains(show_a));

    assert_eq!(old.ticket_id, show_a);
    assert!(old.is_duplicate);
    assert!(old.duplicate_ticket_id.contains(show_b));
    assert!(!old.duplicate_ticket_id.contains(show_a));
}

#[tokio::test]
async fn keeps_duplicate_lists_symmetric_across_three_claims() {
    let server = common::Server::spawn().await;

    for name in ["Show A", "Show B", "Show C"] {
        server
            .client
            .insert(show(name, "2024-05-01", "u1"))
            .await
            .unwrap();
    }

    let user_tickets = server.store.user_tickets().await;
    let lists = user_tickets
        .iter()
        .map(|ut| ut.duplicate_ticket_id.encode())
        .collect::<Vec<_>>();
    assert_eq!(lists, ["2,3", "1,3", "1,2"]);
    assert!(user_tickets.iter().all(|ut| ut.is_duplicate));
}

#[tokio::test]
async fn flags_concurrent_same_day_registrations() {
    let server = common::Server::spawn().await;
    let client = &server.client;

    let (a, b, c) = tokio::join!(
        client.insert(show("Show A", "2024-05-01", "u1")),
        client.insert(show("Show B", "2024-05-01", "u1")),
        client.insert(show("Show C", "2024-05-01", "u1")),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    let user_tickets = server.store.user_tickets().await;
    assert_eq!(user_tickets.len(), 3);
    for ut in &user_tickets {
        assert!(ut.is_duplicate);
        assert_eq!(ut.duplicate_ticket_id.len(), 2);
        assert!(!ut.duplicate_ticket_id.contains(ut.ticket_id));
    }
}

#[tokio::test]
async fn ignores_other_users_and_other_days() {
    let server = common::Server::spawn().await;

    server
        .client
        .insert(show("Show A", "2024-05-01", "u1"))
        .await
        .unwrap();
    server
        .client
        .insert(show("Show B", "2024-05-01", "u2"))
        .await
        .unwrap();
    server
        .client
        .insert(show("Show C", "2024-05-02", "u1"))
        .await
        .unwrap();

    let user_tickets = server.store.user_tickets().await;
    assert_eq!(user_tickets.len(), 3);
    assert!(user_tickets.iter().all(|ut| !ut.is_duplicate));
}

#[tokio::test]
async fn rolls_back_new_ticket_when_user_ticket_fails() {
    let server = common::Server::spawn().await;

    let mut body = show("Show A", "2024-05-01", "u1");
    body["ticketCount"] = json!(0);
    let (status, message) = server.client.insert(body).await.unwrap_err();
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(message.contains("ticket_count"), "{message}");

    assert!(server.store.tickets().await.is_empty());
    assert!(server.store.user_tickets().await.is_empty());
}

#[tokio::test]
async fn rejects_malformed_body() {
    let server = common::Server::spawn().await;

    let status = server.client.post_raw("/insert", "{\"eventName\":").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut body = show("Show A", "2024-05-01", "u1");
    body["eventDate"] = json!("May 1st");
    let (status, _) = server.client.insert(body).await.unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(server.store.tickets().await.is_empty());
}
