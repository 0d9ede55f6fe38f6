use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::RelayResult;
use crate::models::message::{ChatMessage, ChatResponse, StreamEvent};

/// A finite, ordered sequence of stream events for one chat turn. Events must
/// be consumed in order; the stream is not restartable.
pub type EventStream = BoxStream<'static, RelayResult<StreamEvent>>;

/// Base trait for upstream completion providers
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send the full conversation (history plus the new message) upstream in
    /// one request and wait for the complete answer.
    async fn complete(
        &self,
        history: &[ChatMessage],
        message: &str,
        thinking_mode: bool,
    ) -> RelayResult<ChatResponse>;

    /// Open a streaming completion. Each incremental chunk received from the
    /// provider becomes one event; the last event has `is_final` set. If the
    /// upstream stream ends before signalling completion, the sequence yields
    /// `UpstreamStreamInterrupted` instead of ending silently.
    async fn complete_stream(
        &self,
        history: &[ChatMessage],
        message: &str,
        thinking_mode: bool,
    ) -> RelayResult<EventStream>;
}
