use crate::state::AppState;
use axum::{
    extract::State,
    http::{self, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use serde::Serialize;
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use wren::errors::RelayError;
use wren::models::message::{ChatRequest, ChatResponse};

/// How often the relay task wakes up to check for a disconnected client
const HEARTBEAT: Duration = Duration::from_millis(500);

/// Error payload for non-stream failures
#[derive(Debug, Serialize)]
struct ErrorBody {
    error_kind: &'static str,
    message: String,
}

/// Terminal frame sent when a stream fails after it has started
#[derive(Debug, Serialize)]
struct ErrorEvent {
    error_kind: &'static str,
    message: String,
    is_final: bool,
}

// The transport is the only layer that maps taxonomy errors onto HTTP
// status codes.
fn error_response(error: RelayError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &error {
        RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        RelayError::UpstreamAuthError(_) => StatusCode::BAD_GATEWAY,
        RelayError::UpstreamQuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        RelayError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        RelayError::UpstreamMalformedResponse(_) => StatusCode::BAD_GATEWAY,
        RelayError::UpstreamStreamInterrupted(_) => StatusCode::BAD_GATEWAY,
    };

    (
        status,
        Json(ErrorBody {
            error_kind: error.kind(),
            message: error.to_string(),
        }),
    )
}

// Custom SSE response type; each channel item is one pre-framed `data:` line
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> axum::response::Response {
        let stream = self;
        let body = axum::body::Body::from_stream(stream);

        http::Response::builder()
            .header("Content-Type", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive")
            .body(body)
            .unwrap()
    }
}

fn frame<T: Serialize>(event: &T) -> String {
    let encoded = serde_json::to_string(event).unwrap_or_else(|_| String::new());
    format!("data: {}\n\n", encoded)
}

async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorBody>)> {
    match state.relay.respond(&request).await {
        Ok(response) => Ok(Json(response)),
        Err(error) => Err(error_response(error)),
    }
}

async fn stream_message(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<SseResponse, (StatusCode, Json<ErrorBody>)> {
    // Validation failures and errors opening the upstream call surface as a
    // plain JSON error; the SSE response only starts once events can flow.
    let mut events = match state.relay.respond_streaming(&request).await {
        Ok(events) => events,
        Err(error) => return Err(error_response(error)),
    };

    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);

    // Spawn task to forward relay events as SSE frames
    tokio::spawn(async move {
        loop {
            match timeout(HEARTBEAT, events.next()).await {
                Ok(Some(Ok(event))) => {
                    let is_final = event.is_final;
                    if tx.send(frame(&event)).await.is_err() {
                        // Receiver dropped: the client went away
                        break;
                    }
                    if is_final {
                        break;
                    }
                }
                Ok(Some(Err(error))) => {
                    tracing::error!("relay stream failed: {}", error);
                    let _ = tx
                        .send(frame(&ErrorEvent {
                            error_kind: error.kind(),
                            message: error.to_string(),
                            is_final: true,
                        }))
                        .await;
                    break;
                }
                Ok(None) => {
                    break;
                }
                Err(_) => {
                    // Heartbeat, used to detect disconnected clients so the
                    // upstream stream is dropped promptly
                    if tx.is_closed() {
                        break;
                    }
                }
            }
        }
    });

    Ok(SseResponse::new(stream))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/chat/messages", post(send_message))
        .route("/chat/messages/stream", post(stream_message))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_stream::stream;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;
    use wren::errors::RelayResult;
    use wren::models::message::{ChatMessage, StreamEvent};
    use wren::providers::base::{EventStream, Provider};
    use wren::relay::RelayService;

    /// Scriptable provider stub for endpoint tests
    struct StubProvider {
        response: RelayResult<ChatResponse>,
        events: Vec<RelayResult<StreamEvent>>,
        hang_after_events: bool,
        complete_calls: Arc<AtomicUsize>,
        stream_dropped: Arc<AtomicBool>,
    }

    impl StubProvider {
        fn replying(text: &str) -> Self {
            Self {
                response: Ok(ChatResponse::new(text)),
                events: Vec::new(),
                hang_after_events: false,
                complete_calls: Arc::new(AtomicUsize::new(0)),
                stream_dropped: Arc::new(AtomicBool::new(false)),
            }
        }

        fn failing(error: RelayError) -> Self {
            let mut stub = Self::replying("");
            stub.response = Err(error);
            stub
        }

        fn streaming(events: Vec<RelayResult<StreamEvent>>) -> Self {
            let mut stub = Self::replying("");
            stub.events = events;
            stub
        }

        fn hanging(events: Vec<RelayResult<StreamEvent>>) -> Self {
            let mut stub = Self::streaming(events);
            stub.hang_after_events = true;
            stub
        }
    }

    /// Sets its flag when the stub stream is dropped, so tests can observe
    /// cancellation propagating from the transport.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Provider for StubProvider {
        async fn complete(
            &self,
            _history: &[ChatMessage],
            _message: &str,
            _thinking_mode: bool,
        ) -> RelayResult<ChatResponse> {
            self.complete_calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }

        async fn complete_stream(
            &self,
            _history: &[ChatMessage],
            _message: &str,
            _thinking_mode: bool,
        ) -> RelayResult<EventStream> {
            if let Err(error) = &self.response {
                return Err(error.clone());
            }

            let events = self.events.clone();
            let hang = self.hang_after_events;
            let guard = DropFlag(self.stream_dropped.clone());

            let stream = stream! {
                let _guard = guard;
                for event in events {
                    yield event;
                }
                if hang {
                    futures::future::pending::<()>().await;
                }
            };
            Ok(stream.boxed())
        }
    }

    fn test_app(stub: StubProvider) -> Router {
        let state = AppState::new(RelayService::new(Box::new(stub)), "stub-model");
        routes(state)
    }

    fn chat_request(body: Value) -> Request<Body> {
        Request::builder()
            .uri("/chat/messages")
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn stream_request(body: Value) -> Request<Body> {
        Request::builder()
            .uri("/chat/messages/stream")
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn parse_frames(body: &str) -> Vec<Value> {
        body.split("\n\n")
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| {
                let data = chunk
                    .strip_prefix("data: ")
                    .expect("SSE frame should start with data:");
                serde_json::from_str(data).unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_send_message_returns_response() {
        let app = test_app(StubProvider::replying("Hello!"));

        let request = chat_request(json!({
            "message": "Hi",
            "history": [],
            "thinking_mode": false
        }));
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["content"], "Hello!");
        assert!(body["thoughts"].is_null());
    }

    #[tokio::test]
    async fn test_send_message_rejects_empty_message() {
        let stub = StubProvider::replying("unused");
        let complete_calls = stub.complete_calls.clone();
        let app = test_app(stub);

        let response = app
            .oneshot(chat_request(json!({"message": "   "})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error_kind"], "InvalidRequest");
        assert_eq!(complete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_send_message_rejects_unknown_role() {
        let app = test_app(StubProvider::replying("unused"));

        let response = app
            .oneshot(chat_request(json!({
                "message": "Hi",
                "history": [{"role": "moderator", "content": "hello"}]
            })))
            .await
            .unwrap();

        // Rejected by axum's JSON extractor before the relay runs
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_send_message_maps_auth_error() {
        let app = test_app(StubProvider::failing(RelayError::UpstreamAuthError(
            "API key not valid".into(),
        )));

        let response = app
            .oneshot(chat_request(json!({"message": "Hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["error_kind"], "UpstreamAuthError");
    }

    #[tokio::test]
    async fn test_send_message_maps_quota_error() {
        let app = test_app(StubProvider::failing(RelayError::UpstreamQuotaExceeded {
            message: "quota exhausted".into(),
            retry_after: Some(30),
        }));

        let response = app
            .oneshot(chat_request(json!({"message": "Hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["error_kind"], "UpstreamQuotaExceeded");
    }

    #[tokio::test]
    async fn test_send_message_maps_unavailable_error() {
        let app = test_app(StubProvider::failing(RelayError::UpstreamUnavailable(
            "connection refused".into(),
        )));

        let response = app
            .oneshot(chat_request(json!({"message": "Hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_stream_emits_sse_frames() {
        let app = test_app(StubProvider::streaming(vec![
            Ok(StreamEvent::text("Once")),
            Ok(StreamEvent::text(" upon")),
            Ok(StreamEvent::text(" a time").finishing()),
        ]));

        let response = app
            .oneshot(stream_request(json!({"message": "Tell me a story"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let frames = parse_frames(&String::from_utf8(bytes.to_vec()).unwrap());

        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames.iter().map(|f| f["is_final"].as_bool().unwrap()).collect::<Vec<_>>(),
            vec![false, false, true]
        );
        let full: String = frames
            .iter()
            .map(|f| f["content"].as_str().unwrap())
            .collect();
        assert_eq!(full, "Once upon a time");
    }

    #[tokio::test]
    async fn test_stream_invalid_request_rejected_before_sse() {
        let app = test_app(StubProvider::streaming(vec![Ok(StreamEvent::done())]));

        let response = app
            .oneshot(stream_request(json!({"message": ""})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error_kind"], "InvalidRequest");
    }

    #[tokio::test]
    async fn test_stream_upstream_failure_rejected_before_sse() {
        let app = test_app(StubProvider::failing(RelayError::UpstreamAuthError(
            "API key not valid".into(),
        )));

        let response = app
            .oneshot(stream_request(json!({"message": "Hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["error_kind"], "UpstreamAuthError");
    }

    #[tokio::test]
    async fn test_stream_emits_error_frame_on_interrupt() {
        let app = test_app(StubProvider::streaming(vec![
            Ok(StreamEvent::text("partial")),
            Err(RelayError::UpstreamStreamInterrupted("connection reset".into())),
        ]));

        let response = app
            .oneshot(stream_request(json!({"message": "Hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let frames = parse_frames(&String::from_utf8(bytes.to_vec()).unwrap());

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["content"], "partial");
        assert_eq!(frames[1]["error_kind"], "UpstreamStreamInterrupted");
        assert_eq!(frames[1]["is_final"], true);
    }

    #[tokio::test]
    async fn test_client_disconnect_cancels_adapter_stream() {
        let stub = StubProvider::hanging(vec![Ok(StreamEvent::text("one"))]);
        let stream_dropped = stub.stream_dropped.clone();
        let app = test_app(stub);

        let response = app
            .oneshot(stream_request(json!({"message": "Hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&first).contains("one"));

        // Hang up mid-stream; the heartbeat should notice and release the
        // adapter stream.
        drop(body);

        for _ in 0..20 {
            if stream_dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(stream_dropped.load(Ordering::SeqCst));
    }
}
