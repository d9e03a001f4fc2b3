use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Connection settings for the trusted gallery backend.
///
/// The credential is the operator's opaque session token; it is attached to
/// every backend call (target acquisition and record creation) and treated as
/// binary valid/invalid. No refresh handling here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the gallery backend, e.g. "https://gallery.example.com"
    pub base_url: String,
    /// Opaque session credential sent as a bearer token
    pub credential: String,
}

impl BackendConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Backend base URL cannot be empty".to_string(),
            ));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "Backend base URL must be http(s): {}",
                self.base_url
            )));
        }
        if self.credential.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Session credential cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str, credential: &str) -> BackendConfig {
        BackendConfig {
            base_url: base_url.to_string(),
            credential: credential.to_string(),
        }
    }

    #[test]
    fn accepts_https_base_url_and_credential() {
        assert!(config("https://gallery.example.com", "tok").validate().is_ok());
    }

    #[test]
    fn rejects_empty_credential() {
        assert!(config("https://gallery.example.com", "  ").validate().is_err());
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(config("ftp://gallery.example.com", "tok").validate().is_err());
    }
}
