use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: set the {env_var} environment variable")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Map a settings field reported by the config layer to the environment
/// variable that supplies it. Bare field names come from serde errors inside
/// the provider section, which is the only section with required fields.
pub fn to_env_var(field: &str) -> String {
    let path = field.replace('.', "__").to_uppercase();
    if path.contains("__") {
        format!("WREN_{}", path)
    } else {
        format!("WREN_PROVIDER__{}", path)
    }
}
