/**
 * Change Notification Subscription Handler
 *
 * This module implements the `GET /api/progress/events` endpoint: a
 * long-lived response streaming newline-delimited JSON frames.
 *
 * # Stream Protocol
 *
 * - The first frame is always `{"type":"connected",...}` so a client
 *   knows the subscription is established before any change arrives.
 * - `file-change` frames follow as saves, syncs, clears, and poller
 *   detections are broadcast.
 * - A `heartbeat` frame is emitted after every `heartbeat_interval` of
 *   quiet to keep intermediaries from closing the connection.
 *
 * # Connection Management
 *
 * Lagged subscribers skip the missed frames and keep the connection;
 * the stream ends when the broadcast channel closes.
 */

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast;

use crate::backend::server::state::AppState;
use crate::shared::event::FileChangeEvent;

/// Handle an events subscription (GET /api/progress/events)
pub async fn subscribe_events(State(state): State<AppState>) -> Response {
    tracing::info!("[Realtime] Events subscription established");

    let rx = state.events.subscribe();
    let lines = event_lines(rx, state.config.heartbeat_interval);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(lines))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from("Internal Server Error"))
                .unwrap()
        })
}

/// Build the frame stream for one subscriber
///
/// Yields the `connected` frame first, then broadcast frames as they
/// arrive, with heartbeats after each quiet interval.
fn event_lines(
    rx: broadcast::Receiver<FileChangeEvent>,
    heartbeat: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    let opening = stream::once(async { Ok(ndjson_line(&FileChangeEvent::connected())) });

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let live = stream::unfold((rx, ticker), |(mut rx, mut ticker)| async move {
        loop {
            tokio::select! {
                result = rx.recv() => match result {
                    Ok(event) => {
                        // A delivered frame counts as traffic; push the
                        // next heartbeat out by a full interval.
                        ticker.reset();
                        return Some((Ok(ndjson_line(&event)), (rx, ticker)));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "[Realtime] Events subscriber lagged, skipped {} frame(s)",
                            skipped
                        );
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::warn!("[Realtime] Broadcast channel closed, ending stream");
                        return None;
                    }
                },
                _ = ticker.tick() => {
                    return Some((Ok(ndjson_line(&FileChangeEvent::heartbeat())), (rx, ticker)));
                }
            }
        }
    });

    opening.chain(live)
}

/// Serialize one frame as a newline-terminated JSON line
fn ndjson_line(event: &FileChangeEvent) -> Bytes {
    match serde_json::to_string(event) {
        Ok(mut line) => {
            line.push('\n');
            Bytes::from(line)
        }
        Err(e) => {
            tracing::error!("[Realtime] Failed to serialize event frame: {}", e);
            Bytes::new()
        }
    }
}
