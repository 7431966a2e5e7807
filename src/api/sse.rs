//! Server-Sent Events support
//!
//! Observers get the current snapshot first, then every change as it happens.

use crate::runtime::SseEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert broadcast stream to SSE stream
pub fn sse_stream(
    init_event: SseEvent,
    broadcast_rx: tokio::sync::broadcast::Receiver<SseEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = futures::stream::once(async move { Ok(sse_event_to_axum(init_event)) });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(event) => Some(Ok(sse_event_to_axum(event))),
        Err(_) => None, // Skip lagged messages
    });

    let combined = init.chain(broadcasts);

    Sse::new(combined).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn sse_event_to_axum(event: SseEvent) -> Event {
    let (event_type, data) = event_payload(event);
    Event::default().event(event_type).data(data.to_string())
}

/// SSE event name and JSON body for one runtime event
fn event_payload(event: SseEvent) -> (&'static str, Value) {
    match event {
        SseEvent::Init { snapshot } => (
            "init",
            json!({
                "type": "init",
                "session": snapshot.session,
                "state": snapshot.state
            }),
        ),
        SseEvent::MessageAppended { message } => (
            "message",
            json!({
                "type": "message",
                "message": message
            }),
        ),
        SseEvent::Fragment { message_id, text } => (
            "fragment",
            json!({
                "type": "fragment",
                "message_id": message_id,
                "text": text
            }),
        ),
        SseEvent::MessageFinalized { message } => (
            "message_finalized",
            json!({
                "type": "message_finalized",
                "message": message
            }),
        ),
        SseEvent::MessagesRemoved { ids } => (
            "messages_removed",
            json!({
                "type": "messages_removed",
                "ids": ids
            }),
        ),
        SseEvent::TitleChanged { title } => (
            "title",
            json!({
                "type": "title",
                "title": title
            }),
        ),
        SseEvent::StateChange { state } => (
            "state_change",
            json!({
                "type": "state_change",
                "state": state
            }),
        ),
        SseEvent::Notice { event } => (
            "notice",
            json!({
                "type": "notice",
                "event": event
            }),
        ),
        SseEvent::Timer { timer } => (
            "timer",
            json!({
                "type": "timer",
                "timer": timer
            }),
        ),
        SseEvent::Error { message } => (
            "error",
            json!({
                "type": "error",
                "message": message
            }),
        ),
    }
}
