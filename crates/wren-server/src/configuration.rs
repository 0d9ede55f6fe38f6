use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use serde::Deserialize;
use std::net::SocketAddr;
use wren::providers::configs::{GeminiProviderConfig, ProviderConfig};
use wren::providers::gemini::{GEMINI_HOST, GEMINI_MODEL};

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Failed to parse socket address")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    Gemini {
        #[serde(default = "default_gemini_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
        #[serde(default)]
        timeout_secs: Option<u64>,
        #[serde(default)]
        stream_idle_timeout_secs: Option<u64>,
    },
}

impl ProviderSettings {
    /// The configured model identifier, reported by the status endpoint
    pub fn model(&self) -> &str {
        match self {
            ProviderSettings::Gemini { model, .. } => model,
        }
    }

    // Convert to the wren ProviderConfig
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::Gemini {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
                timeout_secs,
                stream_idle_timeout_secs,
            } => ProviderConfig::Gemini(GeminiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
                timeout: timeout_secs,
                stream_idle_timeout: stream_idle_timeout_secs,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        // Start with default configuration
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Provider defaults
            .set_default("provider.type", "gemini")?
            .set_default("provider.host", default_gemini_host())?
            .set_default("provider.model", default_model())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("WREN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        // Try to deserialize the configuration
        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Handle missing field errors specially
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Handle both NotFound and missing field message variants
                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // Extract field name from error message "missing field `api_key`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches("`");
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_gemini_host() -> String {
    GEMINI_HOST.to_string()
}

fn default_model() -> String {
    GEMINI_MODEL.to_string()
}
