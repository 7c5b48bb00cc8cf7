//! Session configuration (layered: defaults > config file > env).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{LiveError, Result};
use crate::live::tools::FunctionDeclaration;

pub const DEFAULT_RELAY_URL: &str = "ws://localhost:8080";
pub const DEFAULT_MODEL: &str = "gemini-live-2.5-flash-native-audio";
pub const DEFAULT_LOCATION: &str = "us-central1";
pub const DEFAULT_VOICE: &str = "Kore";
pub const DEFAULT_TEMPERATURE: f64 = 0.9;
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Server-side voice activity detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityDetection {
    pub disabled: bool,
    pub silence_duration_ms: u32,
    pub prefix_padding_ms: u32,
}

impl Default for ActivityDetection {
    fn default() -> Self {
        Self {
            disabled: false,
            silence_duration_ms: 2000,
            prefix_padding_ms: 500,
        }
    }
}

/// Immutable configuration for one live session.
///
/// ```
/// use livelink::config::SessionConfig;
///
/// let config = SessionConfig::builder()
///     .relay_url("ws://127.0.0.1:8080/ws")
///     .system_instruction("You are a helpful assistant.")
///     .build();
/// assert_eq!(config.voice_name, "Kore");
/// ```
#[derive(Clone, Builder, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Relay endpoint the client dials.
    #[builder(into, default = DEFAULT_RELAY_URL.to_string())]
    pub relay_url: String,
    /// Downstream service URL forwarded to the relay. Derived from
    /// `location` when absent.
    #[builder(into)]
    pub service_url: Option<String>,
    /// Credential forwarded to the relay alongside the service URL.
    #[builder(into)]
    pub bearer_token: Option<String>,
    #[builder(into, default = DEFAULT_MODEL.to_string())]
    pub model: String,
    /// When set, `model` is expanded into a fully-qualified resource name.
    #[builder(into)]
    pub project_id: Option<String>,
    #[builder(into, default = DEFAULT_LOCATION.to_string())]
    pub location: String,
    #[builder(into, default)]
    pub system_instruction: String,
    #[builder(into, default = DEFAULT_VOICE.to_string())]
    pub voice_name: String,
    #[builder(default = DEFAULT_TEMPERATURE)]
    pub temperature: f64,
    #[builder(default)]
    pub activity_detection: ActivityDetection,
    #[builder(default)]
    pub tools: Vec<FunctionDeclaration>,
    /// Websocket ping cadence. No pings are sent when absent.
    pub heartbeat_interval_ms: Option<u64>,
    /// Capacity of the outbound frame queue.
    #[builder(default = DEFAULT_OUTBOUND_CAPACITY)]
    pub outbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("relay_url", &self.relay_url)
            .field("service_url", &self.service_url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| ".."))
            .field("model", &self.model)
            .field("project_id", &self.project_id)
            .field("location", &self.location)
            .field("voice_name", &self.voice_name)
            .field("temperature", &self.temperature)
            .field("activity_detection", &self.activity_detection)
            .field("tools", &self.tools.len())
            .field("heartbeat_interval_ms", &self.heartbeat_interval_ms)
            .field("outbound_capacity", &self.outbound_capacity)
            .finish()
    }
}

impl SessionConfig {
    /// Resolve configuration from the default config file (if any) and the
    /// environment, then validate it.
    pub fn load() -> Result<Self> {
        let base = match default_config_path() {
            Some(path) if path.exists() => Self::from_toml_file(&path)?,
            _ => Self::default(),
        };
        let config = base.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables on top of the defaults.
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env()
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source)
            .map_err(|error| LiveError::Configuration(format!("Invalid config file: {error}")))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Render as TOML with the bearer token removed.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        if redacted.bearer_token.is_some() {
            redacted.bearer_token = Some("<redacted>".into());
        }
        toml::to_string_pretty(&redacted)
            .map_err(|error| LiveError::Configuration(format!("Cannot render config: {error}")))
    }

    /// Override fields from `LIVELINK_*` environment variables (`.env` is
    /// loaded first when present).
    pub fn apply_env(mut self) -> Result<Self> {
        let _ = dotenvy::dotenv();

        if let Some(value) = env_value("LIVELINK_RELAY_URL") {
            self.relay_url = value;
        }
        if let Some(value) = env_value("LIVELINK_SERVICE_URL") {
            self.service_url = Some(value);
        }
        if let Some(value) = env_value("LIVELINK_BEARER_TOKEN") {
            self.bearer_token = Some(value);
        }
        if let Some(value) = env_value("LIVELINK_MODEL") {
            self.model = value;
        }
        if let Some(value) =
            env_value("LIVELINK_PROJECT_ID").or_else(|| env_value("GOOGLE_CLOUD_PROJECT"))
        {
            self.project_id = Some(value);
        }
        if let Some(value) = env_value("LIVELINK_LOCATION") {
            self.location = value;
        }
        if let Some(value) = env_value("LIVELINK_VOICE") {
            self.voice_name = value;
        }
        if let Some(value) = env_value("LIVELINK_SYSTEM_INSTRUCTION") {
            self.system_instruction = value;
        }
        if let Some(value) = env_value("LIVELINK_TEMPERATURE") {
            self.temperature = value.parse().map_err(|_| {
                LiveError::Configuration(format!("LIVELINK_TEMPERATURE is not a number: {value}"))
            })?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let relay = self.relay_url.trim();
        if relay.is_empty() {
            return Err(LiveError::Configuration(
                "Relay URL cannot be empty".into(),
            ));
        }
        if !(relay.starts_with("ws://") || relay.starts_with("wss://")) {
            return Err(LiveError::Configuration(format!(
                "Relay URL must use ws:// or wss://, got {relay}"
            )));
        }
        if self.model.trim().is_empty() {
            return Err(LiveError::Configuration("Model cannot be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(LiveError::Configuration(format!(
                "Temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.outbound_capacity == 0 {
            return Err(LiveError::Configuration(
                "Outbound capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Model identifier as sent in the setup frame.
    pub fn model_resource(&self) -> String {
        match &self.project_id {
            Some(project) if !self.model.starts_with("projects/") => format!(
                "projects/{project}/locations/{}/publishers/google/models/{}",
                self.location, self.model
            ),
            _ => self.model.clone(),
        }
    }

    /// Service URL forwarded in the routing directive.
    pub fn resolved_service_url(&self) -> String {
        self.service_url.clone().unwrap_or_else(|| {
            format!(
                "wss://{}-aiplatform.googleapis.com/ws/google.cloud.aiplatform.v1beta1.LlmBidiService/BidiGenerateContent",
                self.location
            )
        })
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// Platform config file location (`.../livelink/config.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "livelink")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_session() {
        let config = SessionConfig::default();
        assert_eq!(config.relay_url, DEFAULT_RELAY_URL);
        assert_eq!(config.voice_name, "Kore");
        assert_eq!(config.temperature, 0.9);
        assert_eq!(config.activity_detection.silence_duration_ms, 2000);
        assert_eq!(config.activity_detection.prefix_padding_ms, 500);
        assert!(!config.activity_detection.disabled);
        assert!(config.tools.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn model_resource_expands_with_project() {
        let config = SessionConfig::builder()
            .model("gemini-live")
            .project_id("demo-project")
            .build();
        assert_eq!(
            config.model_resource(),
            "projects/demo-project/locations/us-central1/publishers/google/models/gemini-live"
        );

        let bare = SessionConfig::builder().model("gemini-live").build();
        assert_eq!(bare.model_resource(), "gemini-live");
    }

    #[test]
    fn service_url_is_derived_from_location() {
        let config = SessionConfig::builder().location("europe-west4").build();
        assert!(config
            .resolved_service_url()
            .starts_with("wss://europe-west4-aiplatform.googleapis.com/ws/"));

        let explicit = SessionConfig::builder()
            .service_url("wss://example.test/live")
            .build();
        assert_eq!(explicit.resolved_service_url(), "wss://example.test/live");
    }

    #[test]
    fn debug_output_redacts_bearer_token() {
        let config = SessionConfig::builder().bearer_token("secret-token").build();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn zero_heartbeat_means_disabled() {
        let config = SessionConfig::builder().heartbeat_interval_ms(0).build();
        assert_eq!(config.heartbeat_interval(), None);
    }
}
