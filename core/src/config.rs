//! Client settings and their TOML loader.
//!
//! # Design
//! Settings are immutable once loaded and shared by reference with every
//! request. All fields have defaults so a config file only needs the values
//! that differ; syntactic checks are left to serde and semantic checks run in
//! `validate_settings`, which reports every problem at once.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Request timeout used when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by every call a client makes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Application id issued by the catalog API.
    pub client_id: String,

    /// Secret for the OAuth token endpoint. Not needed for catalog calls.
    pub client_secret: Option<String>,

    /// Two-letter country the catalog is scoped to (e.g. "gb").
    pub country_code: String,

    /// Optional response language (e.g. "en").
    pub language: Option<String>,

    /// Base URI for plain catalog calls. Must end with '/'.
    pub api_base_uri: String,

    /// Base URI for authenticated calls. Must end with '/'.
    pub secure_api_base_uri: String,

    pub request_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            country_code: "gb".to_string(),
            language: None,
            api_base_uri: "http://api.mixrad.io/1.x/".to_string(),
            secure_api_base_uri: "https://sapi.mixrad.io/1.x/".to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ClientSettings {
    pub fn new(client_id: &str, country_code: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            country_code: country_code.to_lowercase(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: ClientSettings = toml::from_str(content)?;
        validate_settings(&settings).map_err(ConfigError::Validation)?;
        Ok(settings)
    }
}

/// Load and validate settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<ClientSettings, ConfigError> {
    let content = fs::read_to_string(path)?;
    ClientSettings::from_toml_str(&content)
}

/// Semantic checks that serde cannot express.
pub fn validate_settings(settings: &ClientSettings) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if settings.client_id.trim().is_empty() {
        errors.push("client_id must not be empty".to_string());
    }
    if settings.country_code.len() != 2 || !settings.country_code.chars().all(|c| c.is_ascii_alphabetic()) {
        errors.push(format!(
            "country_code must be a two-letter code, got {:?}",
            settings.country_code
        ));
    }
    for (name, uri) in [
        ("api_base_uri", &settings.api_base_uri),
        ("secure_api_base_uri", &settings.secure_api_base_uri),
    ] {
        match url::Url::parse(uri) {
            Ok(_) if !uri.ends_with('/') => errors.push(format!("{name} must end with '/'")),
            Ok(_) => {}
            Err(e) => errors.push(format!("{name} is not a valid URI: {e}")),
        }
    }
    if settings.request_timeout_ms == 0 {
        errors.push("request_timeout_ms must be greater than zero".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
