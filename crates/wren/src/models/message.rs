use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::role::Role;
use crate::errors::{RelayError, RelayResult};

/// One turn in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        ChatMessage {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message with the current timestamp
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message with the current timestamp
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self::new(Role::System, content)
    }
}

/// Input for one chat turn: the new user text plus the prior conversation,
/// oldest first. The history is never mutated once handed to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub thinking_mode: bool,
}

impl ChatRequest {
    pub fn new<S: Into<String>>(message: S) -> Self {
        ChatRequest {
            message: message.into(),
            history: Vec::new(),
            thinking_mode: false,
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_thinking_mode(mut self, thinking_mode: bool) -> Self {
        self.thinking_mode = thinking_mode;
        self
    }

    /// Check the schema rules serde alone cannot express. Runs before any
    /// upstream call is attempted.
    pub fn validate(&self) -> RelayResult<()> {
        if self.message.trim().is_empty() {
            return Err(RelayError::InvalidRequest(
                "message must not be empty".to_string(),
            ));
        }
        for entry in &self.history {
            if entry.role != Role::System && entry.content.is_empty() {
                return Err(RelayError::InvalidRequest(
                    "history entries must have non-empty content".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// The assistant's full reply for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default)]
    pub thoughts: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ChatResponse {
    pub fn new<S: Into<String>>(content: S) -> Self {
        ChatResponse {
            content: content.into(),
            thoughts: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_thoughts<S: Into<String>>(mut self, thoughts: S) -> Self {
        self.thoughts = Some(thoughts.into());
        self
    }
}

/// One unit of a streaming reply. `content` and `thoughts` are independent
/// channels; a single event may carry either or both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub thoughts: Option<String>,
    #[serde(default)]
    pub is_final: bool,
}

impl StreamEvent {
    /// An incremental fragment of the final answer
    pub fn text<S: Into<String>>(content: S) -> Self {
        StreamEvent {
            content: content.into(),
            thoughts: None,
            is_final: false,
        }
    }

    /// An incremental fragment of the model's reasoning
    pub fn thinking<S: Into<String>>(thoughts: S) -> Self {
        StreamEvent {
            content: String::new(),
            thoughts: Some(thoughts.into()),
            is_final: false,
        }
    }

    /// The completion marker; carries no text of its own
    pub fn done() -> Self {
        StreamEvent {
            content: String::new(),
            thoughts: None,
            is_final: true,
        }
    }

    pub fn with_thoughts<S: Into<String>>(mut self, thoughts: S) -> Self {
        self.thoughts = Some(thoughts.into());
        self
    }

    pub fn finishing(mut self) -> Self {
        self.is_final = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_from_wire() {
        let request: ChatRequest = serde_json::from_str(r#"{"message": "Hi"}"#).unwrap();
        assert_eq!(request.message, "Hi");
        assert!(request.history.is_empty());
        assert!(!request.thinking_mode);
    }

    #[test]
    fn test_message_timestamp_defaults_when_omitted() {
        let message: ChatMessage =
            serde_json::from_str(r#"{"role": "user", "content": "Hi"}"#).unwrap();
        assert_eq!(message.role, Role::User);
        assert!(message.timestamp <= Utc::now());
    }

    #[test]
    fn test_invalid_history_role_is_rejected() {
        let result: Result<ChatRequest, _> = serde_json::from_str(
            r#"{"message": "Hi", "history": [{"role": "robot", "content": "beep"}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_empty_message() {
        let error = ChatRequest::new("").validate().unwrap_err();
        assert!(matches!(error, RelayError::InvalidRequest(_)));
    }

    #[test]
    fn test_validate_rejects_whitespace_message() {
        let error = ChatRequest::new("   \n\t ").validate().unwrap_err();
        assert!(matches!(error, RelayError::InvalidRequest(_)));
    }

    #[test]
    fn test_validate_rejects_empty_history_content() {
        let request = ChatRequest::new("Hi").with_history(vec![ChatMessage::assistant("")]);
        let error = request.validate().unwrap_err();
        assert!(matches!(error, RelayError::InvalidRequest(_)));
    }

    #[test]
    fn test_validate_accepts_normal_request() {
        let request = ChatRequest::new("Hi").with_history(vec![
            ChatMessage::system("Be brief."),
            ChatMessage::user("Hello"),
            ChatMessage::assistant("Hello! How can I help?"),
        ]);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_response_serializes_null_thoughts() {
        let response = ChatResponse::new("Hello!");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["content"], "Hello!");
        assert!(value["thoughts"].is_null());
    }

    #[test]
    fn test_stream_event_constructors() {
        assert!(!StreamEvent::text("chunk").is_final);
        assert_eq!(StreamEvent::thinking("hmm").thoughts.as_deref(), Some("hmm"));
        let done = StreamEvent::done();
        assert!(done.is_final);
        assert!(done.content.is_empty());
        assert!(done.thoughts.is_none());
    }
}
