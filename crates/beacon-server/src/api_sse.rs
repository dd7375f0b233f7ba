//! SSE change-event stream handler.

use crate::AppState;
use axum::{
    extract::Extension,
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
};
use futures_util::Stream;
use std::{convert::Infallible, sync::Arc};
use tokio_stream::StreamExt;

/// Handler for `GET /events/status`.
///
/// Registers one bus subscription per connection and streams change events
/// as JSON. A slow consumer loses events per the bus overflow policy instead
/// of blocking the publisher; the stream ends when the subscription is
/// closed.
pub async fn get_status_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.detector.bus().subscribe();
    tracing::debug!(subscriber = %subscription.id(), "status stream connected");

    let stream = futures_util::stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.recv().await?;
        Some((event, subscription))
    });

    let mapped_stream = stream.filter_map(|event| match serde_json::to_string(&event) {
        Ok(data) => Some(Ok(Event::default().data(data))),
        Err(e) => {
            tracing::error!("failed to serialize change event: {}", e);
            None
        }
    });

    Sse::new(mapped_stream).keep_alive(KeepAlive::default())
}
