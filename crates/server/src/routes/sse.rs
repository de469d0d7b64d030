use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::state::AppState;

pub const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Restrict the stream to one pipeline.
    pub pipeline_id: Option<Uuid>,
}

fn envelope_to_sse_event(envelope: &events::EventEnvelope) -> Event {
    let data = serde_json::to_string(envelope).unwrap_or_else(|_| "{}".to_string());
    Event::default()
        .id(envelope.id.to_string())
        .event(envelope.event.kind())
        .data(data)
}

/// Live event stream. Subscribers only see events published after they
/// connect; the durable history is `GET /api/pipelines/{id}/events`.
pub async fn events_stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_bus().subscribe();
    let wanted = query.pipeline_id;

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        futures::future::ready(match result {
            Ok(envelope) => {
                if wanted.is_some() && envelope.event.pipeline_id() != wanted {
                    None
                } else {
                    Some(Ok(envelope_to_sse_event(&envelope)))
                }
            }
            // Lagged receivers skip ahead; dropped events remain in the
            // audit log.
            Err(_) => None,
        })
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE_INTERVAL))
}
