use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;

use super::base::{EventStream, Provider};
use crate::errors::{RelayError, RelayResult};
use crate::models::message::{ChatMessage, ChatResponse, StreamEvent};

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    responses: Arc<Mutex<Vec<ChatResponse>>>,
    events: Arc<Mutex<Vec<RelayResult<StreamEvent>>>>,
    error: Option<RelayError>,
    complete_calls: Arc<AtomicUsize>,
    stream_calls: Arc<AtomicUsize>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            events: Arc::new(Mutex::new(Vec::new())),
            error: None,
            complete_calls: Arc::new(AtomicUsize::new(0)),
            stream_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a mock provider that fails every call with the given error
    pub fn failing(error: RelayError) -> Self {
        let mut provider = Self::new(Vec::new());
        provider.error = Some(error);
        provider
    }

    /// Set the events the next streaming call will yield
    pub fn with_events(self, events: Vec<RelayResult<StreamEvent>>) -> Self {
        *self.events.lock().unwrap() = events;
        self
    }

    /// Counter incremented on every `complete` call
    pub fn complete_calls(&self) -> Arc<AtomicUsize> {
        self.complete_calls.clone()
    }

    /// Counter incremented on every `complete_stream` call
    pub fn stream_calls(&self) -> Arc<AtomicUsize> {
        self.stream_calls.clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        _history: &[ChatMessage],
        _message: &str,
        _thinking_mode: bool,
    ) -> RelayResult<ChatResponse> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            Ok(ChatResponse::new(""))
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn complete_stream(
        &self,
        _history: &[ChatMessage],
        _message: &str,
        _thinking_mode: bool,
    ) -> RelayResult<EventStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        let events: Vec<_> = self.events.lock().unwrap().drain(..).collect();
        Ok(futures::stream::iter(events).boxed())
    }
}
