use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::telemetry::TelemetryCollector;

pub type MetricStream = Sse<Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>>;

/// Build a Server-Sent Events stream of live telemetry.
///
/// A slow client that lags behind the broadcast buffer silently misses the
/// overwritten events; `/health` still reports the totals.
pub fn metric_events(telemetry: &TelemetryCollector) -> MetricStream {
    let receiver = telemetry.subscribe();

    let stream = BroadcastStream::new(receiver).filter_map(|result| async move {
        match result {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(payload) => Some(Ok(Event::default().event("metric").data(payload))),
                Err(_) => None,
            },
            Err(err) => {
                tracing::debug!("[HTTP] Event stream lagged: {}", err);
                None
            }
        }
    });

    Sse::new(Box::pin(stream) as Pin<Box<_>>).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}
