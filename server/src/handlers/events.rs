//! Live event stream for one report.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use reportflow::UserEvent;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
const LAST_EVENT_ID: &str = "last-event-id";

fn last_event_id(headers: &HeaderMap) -> Option<i64> {
    headers
        .get(LAST_EVENT_ID)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn to_sse(event: &UserEvent) -> Option<Event> {
    match Event::default()
        .event(event.event_type.as_str())
        .id(event.id.to_string())
        .json_data(event)
    {
        Ok(sse) => Some(sse),
        Err(e) => {
            warn!(error = %e, "Failed to serialize event");
            None
        }
    }
}

/// GET /api/reports/:id/events/stream
///
/// Streams user-facing events appended after the client connected. A
/// reconnecting client that sends `Last-Event-ID` first gets the stored
/// events it missed; earlier history is served by the progress endpoint.
pub async fn stream(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if state.services.store.report(&report_id)?.is_none() {
        return Err(ApiError::not_found(format!(
            "Report '{}' not found",
            report_id
        )));
    }

    // Subscribe before reading the backlog so nothing falls in between.
    let mut rx = state.services.events.broadcaster().subscribe();
    let backlog: Vec<UserEvent> = match last_event_id(&headers) {
        Some(after_id) => state
            .services
            .store
            .events_after(&report_id, after_id)?
            .iter()
            .map(UserEvent::from)
            .collect(),
        None => Vec::new(),
    };
    debug!(report_id = %report_id, replayed = backlog.len(), "SSE client connected");

    let stream = async_stream::stream! {
        let mut last_sent = backlog.last().map(|e| e.id).unwrap_or(i64::MIN);
        for event in &backlog {
            if let Some(sse) = to_sse(event) {
                yield Ok::<_, Infallible>(sse);
            }
        }
        loop {
            match rx.recv().await {
                Ok(event) if event.report_id == report_id && event.id > last_sent => {
                    last_sent = event.id;
                    if let Some(sse) = to_sse(&event) {
                        yield Ok::<_, Infallible>(sse);
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(report_id = %report_id, skipped, "SSE client lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    ))
}
