use crate::errors::RelayResult;
use crate::models::message::{ChatRequest, ChatResponse};
use crate::providers::base::{EventStream, Provider};

/// RelayService runs single chat turns against the configured provider. It
/// validates input, delegates to the provider, and forwards the result
/// unchanged; provider failures propagate as-is, with no retries.
pub struct RelayService {
    provider: Box<dyn Provider>,
}

impl RelayService {
    /// Create a new relay with the specified provider
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self { provider }
    }

    /// Run one turn and wait for the full answer
    pub async fn respond(&self, request: &ChatRequest) -> RelayResult<ChatResponse> {
        request.validate()?;
        self.provider
            .complete(&request.history, &request.message, request.thinking_mode)
            .await
    }

    /// Run one turn, handing back the provider's event stream. Events are
    /// forwarded in production order with no buffering; the transport sees
    /// each one as soon as the provider yields it.
    pub async fn respond_streaming(&self, request: &ChatRequest) -> RelayResult<EventStream> {
        request.validate()?;
        self.provider
            .complete_stream(&request.history, &request.message, request.thinking_mode)
            .await
    }
}
