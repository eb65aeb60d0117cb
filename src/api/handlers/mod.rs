//! API request handlers.

/// Casual (retrieval-free) chat handler.
pub mod casual;
/// Health check handler.
pub mod health;
/// RAG chat and vector-store management handlers.
pub mod rag;

use crate::protocol::{encode_event, StreamEvent};
use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use std::convert::Infallible;

/// Wrap an event stream as a `text/event-stream` response body, one encoded
/// line per event.
pub(crate) fn event_stream_response<S>(events: S) -> Response
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    let body = Body::from_stream(events.map(|event| Ok::<_, Infallible>(encode_event(&event))));

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}
