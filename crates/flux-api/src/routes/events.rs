//! Event feed endpoints.
//!
//! `GET /events?offset=N` serves one page of feed metadata,
//! `GET /events/{id}` serves the raw payload of a single event.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::HOST;
use axum::routing::get;
use axum::{Json, Router};
use flux_core::error::FluxError;
use flux_core::feed::FeedDocument;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Description carried by every feed page.
pub const FEED_DESCRIPTION: &str = "event feed";

/// Query parameters for the feed page. Kept as a string so a malformed
/// offset produces our validation error instead of the extractor's.
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    /// Feed position of the first entry.
    pub offset: Option<String>,
}

fn parse_offset(raw: Option<&str>) -> Result<i64, FluxError> {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return Ok(0);
    };
    let offset: i64 = raw
        .parse()
        .map_err(|_| FluxError::Validation(format!("invalid offset {raw:?}")))?;
    if offset < 0 {
        return Err(FluxError::Validation(format!("invalid offset {offset}")));
    }
    Ok(offset)
}

/// Absolute URL of the events collection, as seen by the client.
fn events_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    format!("{scheme}://{host}/events")
}

/// GET /events?offset=N
async fn list_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedDocument>, ApiError> {
    let offset = parse_offset(query.offset.as_deref())?;
    let metadata = state
        .event_store
        .get_event_metadata_from(offset, state.page_size)
        .await?;
    tracing::debug!(offset, entries = metadata.len(), "serving feed page");
    Ok(Json(state.feed.generate(
        &events_url(&headers),
        FEED_DESCRIPTION,
        &metadata,
    )))
}

/// GET /events/{id}
async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let event_id = Uuid::parse_str(&id)
        .map_err(|_| FluxError::Validation(format!("invalid event id {id:?}")))?;
    let event = state
        .event_store
        .get_event(event_id)
        .await?
        .ok_or(ApiError::EventNotFound(event_id))?;
    Ok(Json(event.payload))
}

/// Returns the router for the event feed.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events))
        .route("/events/{id}", get(get_event))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;
    use axum::http::header::HOST;
    use flux_core::error::FluxError;

    use super::{events_url, parse_offset};

    #[test]
    fn test_parse_offset_defaults_to_start() {
        assert_eq!(parse_offset(None).unwrap(), 0);
        assert_eq!(parse_offset(Some("")).unwrap(), 0);
        assert_eq!(parse_offset(Some("40")).unwrap(), 40);
    }

    #[test]
    fn test_parse_offset_rejects_negative_and_garbage() {
        assert!(matches!(parse_offset(Some("-1")), Err(FluxError::Validation(_))));
        assert!(matches!(parse_offset(Some("ten")), Err(FluxError::Validation(_))));
    }

    #[test]
    fn test_events_url_uses_host_and_forwarded_proto() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, "feed.example.com".parse().unwrap());
        headers.insert("x-forwarded-proto", "https".parse().unwrap());

        assert_eq!(events_url(&headers), "https://feed.example.com/events");
        assert_eq!(events_url(&HeaderMap::new()), "http://localhost/events");
    }
}
