//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use flux_api::state::AppState;
use flux_core::event::{Event, EventPayload};
use flux_core::store::EventStore;
use flux_test_support::{FixedClock, InMemoryEventStore};
use http_body_util::BodyExt;
use serde::Serialize;
use tower::ServiceExt;

/// Payload used by the feed tests.
#[derive(Debug, Serialize)]
pub struct Deposited {
    pub amount: u64,
}

impl EventPayload for Deposited {}

/// Build the full app router over an in-memory event store.
pub fn build_test_app(store: Arc<InMemoryEventStore>) -> Router {
    flux_api::build_app(AppState::new(store))
}

/// Persist `count` `Deposited` events for `aggregate_id`, returning them.
pub async fn seed(store: &InMemoryEventStore, aggregate_id: &str, count: i64) -> Vec<Event> {
    let at = FixedClock::reference().0;
    let events: Vec<Event> = (0..count)
        .map(|v| {
            Event::new_at(
                aggregate_id,
                "Account",
                v,
                &Deposited {
                    amount: u64::try_from(v).unwrap() * 10,
                },
                at,
            )
            .unwrap()
        })
        .collect();
    store.save_events(aggregate_id, &events).await.unwrap();
    events
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .header("host", "feed.test")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
