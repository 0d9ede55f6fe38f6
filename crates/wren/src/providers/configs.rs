// Unified enum to wrap different provider configurations
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Gemini(GeminiProviderConfig),
}

#[derive(Debug, Clone)]
pub struct GeminiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
    /// Bound on a whole non-streaming call, in seconds
    pub timeout: Option<u64>,
    /// Longest gap tolerated between streamed chunks, in seconds
    pub stream_idle_timeout: Option<u64>,
}

impl GeminiProviderConfig {
    pub fn new<S: Into<String>>(host: S, api_key: S, model: S) -> Self {
        Self {
            host: host.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
            timeout: None,
            stream_idle_timeout: None,
        }
    }
}
