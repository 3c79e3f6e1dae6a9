//! HTTP side of the relay: one axum POST route that authenticates the
//! token embedded in the path, parses the body into a Telegram `Update`, and
//! pushes it onto the in-process queue the dispatcher consumes.

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use futures::channel::mpsc;
use teloxide::stop::StopToken;
use teloxide::types::Update;
use teloxide::update_listeners::{StatefulListener, UpdateListener};
use thiserror::Error;
use tracing::{debug, warn};

// ── Update queue ───────────────────────────────────────────────────────────────

/// Items flowing from the HTTP handler to the dispatcher. The error side is
/// `Infallible`: a parsed update is already valid by the time it is queued.
pub type QueueItem = Result<Update, Infallible>;
pub type QueueReceiver = mpsc::UnboundedReceiver<QueueItem>;

/// Where the relay hands off a validated update. Trait-shaped so tests can
/// substitute a recording sink for the real dispatcher queue.
pub trait UpdateSink: Send + Sync {
    fn deliver(&self, update: Update) -> Result<()>;
}

/// Production sink: an unbounded channel drained by the dispatcher's update
/// listener.
#[derive(Clone)]
pub struct QueueSink {
    tx: mpsc::UnboundedSender<QueueItem>,
}

impl UpdateSink for QueueSink {
    fn deliver(&self, update: Update) -> Result<()> {
        self.tx
            .unbounded_send(Ok(update))
            .map_err(|_| anyhow::anyhow!("dispatcher queue is closed"))
    }
}

pub fn update_queue() -> (QueueSink, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded();
    (QueueSink { tx }, rx)
}

/// Wrap the queue's receiving half into the `UpdateListener` shape teloxide's
/// dispatcher expects. The stop token lets the caller tie the listener's
/// lifetime to the HTTP server shutdown.
pub fn queue_listener(
    rx: QueueReceiver,
    stop_token: StopToken,
) -> impl UpdateListener<Err = Infallible> {
    fn queue_stream(state: &mut (QueueReceiver, StopToken)) -> &mut QueueReceiver {
        &mut state.0
    }

    StatefulListener::new(
        (rx, stop_token),
        queue_stream,
        |state: &mut (QueueReceiver, StopToken)| state.1.clone(),
    )
}

// ── Relay errors ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RelayError {
    /// Trailing path segment did not match the configured bot token.
    #[error("Forbidden")]
    Forbidden,
    #[error("malformed update payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("dispatcher is not accepting updates")]
    Closed,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match self {
            RelayError::Forbidden => StatusCode::FORBIDDEN,
            RelayError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            RelayError::Closed => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

// ── Router ─────────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct RelayState {
    bot_token: Arc<str>,
    sink: Arc<dyn UpdateSink>,
}

/// Build the webhook router. The served route is `{base_path}/{token}`;
/// `base_path` must start with `/` and carry no trailing slash.
pub fn router(base_path: &str, bot_token: &str, sink: Arc<dyn UpdateSink>) -> Router {
    let state = RelayState {
        bot_token: Arc::from(bot_token),
        sink,
    };
    Router::new()
        .route(&format!("{base_path}/{{token}}"), post(receive_update))
        .with_state(state)
}

async fn receive_update(
    State(state): State<RelayState>,
    Path(token): Path<String>,
    body: Bytes,
) -> Result<StatusCode, RelayError> {
    // Token is checked before the body is even looked at
    if token != *state.bot_token {
        warn!("Rejected webhook call with mismatched token");
        return Err(RelayError::Forbidden);
    }

    let update: Update = serde_json::from_slice(&body)?;
    debug!("Relaying update {}", update.id.0);

    state.sink.deliver(update).map_err(|_| RelayError::Closed)?;
    Ok(StatusCode::OK)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use futures::StreamExt;
    use std::sync::Mutex;
    use teloxide::types::UpdateId;
    use tower::ServiceExt;

    const TOKEN: &str = "123456:test-token";

    const UPDATE_JSON: &str = r#"{
        "update_id": 10000,
        "message": {
            "message_id": 1365,
            "date": 1712345678,
            "chat": {"id": 42, "type": "private", "first_name": "Test"},
            "from": {"id": 42, "is_bot": false, "first_name": "Test"},
            "text": "hello"
        }
    }"#;

    #[derive(Default)]
    struct RecordingSink {
        updates: Mutex<Vec<Update>>,
    }

    impl UpdateSink for RecordingSink {
        fn deliver(&self, update: Update) -> Result<()> {
            self.updates.lock().unwrap().push(update);
            Ok(())
        }
    }

    struct ClosedSink;

    impl UpdateSink for ClosedSink {
        fn deliver(&self, _update: Update) -> Result<()> {
            anyhow::bail!("closed")
        }
    }

    fn post_update(path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_relays_update_once() {
        let sink = Arc::new(RecordingSink::default());
        let app = router("/webhook", TOKEN, sink.clone());

        let response = app
            .oneshot(post_update(&format!("/webhook/{TOKEN}"), UPDATE_JSON))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let updates = sink.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, UpdateId(10000));
    }

    #[tokio::test]
    async fn test_wrong_token_is_forbidden() {
        let sink = Arc::new(RecordingSink::default());
        let app = router("/webhook", TOKEN, sink.clone());

        let response = app
            .oneshot(post_update("/webhook/WRONGTOKEN", UPDATE_JSON))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(sink.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_token_wins_over_bad_body() {
        let sink = Arc::new(RecordingSink::default());
        let app = router("/webhook", TOKEN, sink.clone());

        let response = app
            .oneshot(post_update("/webhook/WRONGTOKEN", "not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(sink.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected_without_dispatch() {
        let sink = Arc::new(RecordingSink::default());
        let app = router("/webhook", TOKEN, sink.clone());

        let response = app
            .oneshot(post_update(&format!("/webhook/{TOKEN}"), "{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(sink.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_sink_is_a_server_error() {
        let app = router("/webhook", TOKEN, Arc::new(ClosedSink));

        let response = app
            .oneshot(post_update(&format!("/webhook/{TOKEN}"), UPDATE_JSON))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_queue_sink_feeds_receiver() {
        let (sink, mut rx) = update_queue();
        let update: Update = serde_json::from_str(UPDATE_JSON).unwrap();
        sink.deliver(update).unwrap();

        let queued = rx.next().await.unwrap().unwrap();
        assert_eq!(queued.id, UpdateId(10000));
    }
}
