//! The HTTP surface end to end, over the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use chrono::{FixedOffset, NaiveTime};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tablebook::notification::NotificationDispatcher;
use tablebook::server::{AppState, build_router};
use tablebook_core::slot::Venue;
use tablebook_testing::{InMemoryReservationStore, test_clock};

const ACTOR: HeaderName = HeaderName::from_static("x-actor");

fn server() -> TestServer {
    let store = Arc::new(InMemoryReservationStore::with_tables(&[(5, 4), (6, 2), (7, 6)]));
    let venue = Venue::new(
        FixedOffset::east_opt(0).unwrap(),
        NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
    )
    .unwrap();

    let state = AppState::new(
        store,
        Arc::new(venue),
        Arc::new(test_clock()),
        NotificationDispatcher::log_only(),
        Duration::from_secs(1),
    );
    TestServer::new(build_router(state)).unwrap()
}

fn booking(tables: &[u32]) -> Value {
    json!({
        "date": "2025-06-10",
        "timeSlot": "7:00pm",
        "name": "Ada Lovelace",
        "email": "ada@example.com",
        "phone": "555-0100",
        "tableIds": tables,
    })
}

async fn create(server: &TestServer, tables: &[u32]) -> i64 {
    let response = server.post("/api/reservation").json(&booking(tables)).await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["id"].as_i64().unwrap()
}

fn status_of(tables: &Value, id: u64) -> &str {
    tables["tables"]
        .as_array()
        .unwrap()
        .iter()
        .find(|table| table["id"] == id)
        .and_then(|table| table["status"].as_str())
        .unwrap()
}

#[tokio::test]
async fn booked_table_shows_as_unavailable() {
    let server = server();
    create(&server, &[5]).await;

    let tables = server
        .get("/api/tables")
        .add_query_param("date", "2025-06-10")
        .add_query_param("timeSlot", "7:00pm")
        .await
        .json::<Value>();

    assert_eq!(tables["isPast"], false);
    assert_eq!(status_of(&tables, 5), "unavailable");
    assert_eq!(status_of(&tables, 6), "available");
}

#[tokio::test]
async fn third_table_is_rejected() {
    let server = server();
    let response = server.post("/api/reservation").json(&booking(&[5, 6, 7])).await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["code"], "SELECTION_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn invalid_contact_lists_the_fields() {
    let server = server();
    let mut body = booking(&[5]);
    body["email"] = json!("not-an-email");
    body["name"] = json!("  ");

    let response = server.post("/api/reservation").json(&body).await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let body = response.json::<Value>();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|error| error["field"].as_str())
        .collect();
    assert!(fields.contains(&"email"));
    assert!(fields.contains(&"name"));
}

#[tokio::test]
async fn taken_table_conflicts() {
    let server = server();
    create(&server, &[5]).await;

    let response = server.post("/api/reservation").json(&booking(&[5, 6])).await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["code"], "SLOT_UNAVAILABLE");
}

#[tokio::test]
async fn missing_slot_is_a_bad_request() {
    let server = server();
    let mut body = booking(&[5]);
    body.as_object_mut().unwrap().remove("timeSlot");

    let response = server.post("/api/reservation").json(&body).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "INVALID_SLOT");
}

#[tokio::test]
async fn unknown_reservation_is_not_found() {
    let server = server();

    server
        .get("/api/reservation/4242")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .put("/api/unreserve")
        .add_query_param("reservationId", 4242)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unreserving_twice_logs_once() {
    let server = server();
    let id = create(&server, &[5, 6]).await;

    let first = server
        .put("/api/unreserve")
        .add_query_param("reservationId", id)
        .add_header(ACTOR, HeaderValue::from_static("staff"))
        .await;
    first.assert_status_ok();
    assert_eq!(first.json::<Value>()["alreadyCancelled"], false);

    let second = server
        .put("/api/unreserve")
        .add_query_param("reservationId", id)
        .await;
    second.assert_status_ok();
    assert_eq!(second.json::<Value>()["alreadyCancelled"], true);

    let logs = server
        .get(&format!("/api/reservation/{id}/logs"))
        .await
        .json::<Value>();
    let actions: Vec<&str> = logs
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|entry| entry["action"].as_str())
        .collect();
    assert_eq!(actions, vec!["created", "cancelled"]);

    let tables = server
        .get("/api/tables")
        .add_query_param("date", "2025-06-10")
        .add_query_param("timeSlot", "7:00pm")
        .await
        .json::<Value>();
    assert_eq!(status_of(&tables, 5), "available");
}

#[tokio::test]
async fn edit_moves_the_reservation() {
    let server = server();
    let id = create(&server, &[5]).await;

    let mut body = booking(&[6]);
    body["timeSlot"] = json!("8:30pm");
    let response = server
        .put(&format!("/api/reservation/{id}"))
        .json(&body)
        .await;
    response.assert_status_ok();

    let updated = response.json::<Value>();
    assert_eq!(updated["timeSlot"], "8:30pm");
    assert_eq!(updated["tables"], json!([6]));
}

#[tokio::test]
async fn unknown_actor_is_rejected() {
    let server = server();
    let response = server
        .post("/api/reservation")
        .add_header(ACTOR, HeaderValue::from_static("manager"))
        .json(&booking(&[5]))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_the_store() {
    let server = server();
    let response = server.get("/health").await;

    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["checks"][0]["component"], "reservation_store");
}
