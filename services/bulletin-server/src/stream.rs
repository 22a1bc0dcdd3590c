//! Server-sent event streams that push a fresh snapshot on a fixed cadence.
//!
//! Each connection owns its interval. When the client goes away axum drops
//! the stream, which drops the interval and the connection guard exactly
//! once.

use std::convert::Infallible;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::Utc;
use futures::stream::{self, Stream};
use metrics::gauge;
use serde_json::Value;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, warn};

static CONNECTED: AtomicUsize = AtomicUsize::new(0);

/// Stream clients currently connected, across all events.
pub fn connected_clients() -> usize {
    CONNECTED.load(Ordering::SeqCst)
}

/// Tracks one connected client.
struct ConnectionGuard {
    event: &'static str,
}

impl ConnectionGuard {
    fn new(event: &'static str) -> Self {
        CONNECTED.fetch_add(1, Ordering::SeqCst);
        gauge!("stream_clients", "event" => event).increment(1.0);
        debug!(event, "Stream client connected");
        Self { event }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        CONNECTED.fetch_sub(1, Ordering::SeqCst);
        gauge!("stream_clients", "event" => self.event).decrement(1.0);
        debug!(event = self.event, "Stream client disconnected");
    }
}

struct StreamState<F> {
    ticker: Interval,
    snapshot: F,
    _guard: ConnectionGuard,
}

/// Build one SSE frame: `id` is the send time in epoch milliseconds.
pub fn snapshot_event(event: &'static str, payload: &Value) -> Event {
    let frame = Event::default()
        .id(Utc::now().timestamp_millis().to_string())
        .event(event);
    match frame.clone().json_data(payload) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(event, error = %e, "Failed to encode stream payload");
            frame.data("{}")
        }
    }
}

/// Stream `snapshot()` as `event` frames: one immediately, then one per
/// `period`.
pub fn snapshot_stream<F, Fut>(
    event: &'static str,
    period: Duration,
    snapshot: F,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Value> + Send + 'static,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let state = StreamState {
        ticker,
        snapshot,
        _guard: ConnectionGuard::new(event),
    };

    let frames = stream::unfold(state, move |mut state| async move {
        state.ticker.tick().await;
        let payload = (state.snapshot)().await;
        Some((Ok::<_, Infallible>(snapshot_event(event, &payload)), state))
    });

    Sse::new(frames).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_dropping_stream_releases_connection_once() {
        let before = connected_clients();

        let response = snapshot_stream("condition_update", Duration::from_secs(60), || async {
            json!({ "conditions": null })
        })
        .into_response();
        assert_eq!(connected_clients(), before + 1);

        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&first).contains("event: condition_update"));
        assert_eq!(connected_clients(), before + 1);

        drop(body);
        assert_eq!(connected_clients(), before);
    }
}
