//! Server-Sent Events stream
//!
//! Every client first receives the current display state, then every bus
//! event. Clients connecting with `?speech=true` are TV pages able to speak;
//! they count as the browser speech bridge while connected.

use crate::api::server::AppContext;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use chamador_common::events::ChamadorEvent;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

#[derive(Debug, Deserialize, Default)]
pub struct EventsQuery {
    /// The client will speak `SpeechRequested` events
    #[serde(default)]
    speech: bool,
}

/// GET /api/events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected (speech: {})", query.speech);

    // Subscribe before reading the snapshot so nothing falls in between
    let rx = ctx.tv.bus.subscribe();
    let initial = ChamadorEvent::DisplayChanged {
        state: ctx.tv.display.current(),
        timestamp: chrono::Utc::now(),
    };
    let page = query.speech.then(|| ctx.page_speech.connect());

    let stream = async_stream::stream! {
        // Held for the life of the stream: the page counts as connected
        let _page = page;

        if let Some(event) = to_sse(&initial) {
            yield Ok(event);
        }

        let mut events = BroadcastStream::new(rx);
        while let Some(result) = events.next().await {
            match result {
                Ok(event) => {
                    if let Some(sse) = to_sse(&event) {
                        yield Ok(sse);
                    }
                }
                Err(e) => {
                    // Lagged: the client missed events but the stream goes on
                    warn!("SSE stream error: {:?}", e);
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_sse(event: &ChamadorEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            None
        }
    }
}
