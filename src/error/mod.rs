//! Error types for livelink.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all live-session operations.
#[derive(Error, Debug)]
pub enum LiveError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Not connected: the session is not open")]
    NotConnected,

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<base64::DecodeError> for LiveError {
    fn from(error: base64::DecodeError) -> Self {
        Self::Encoding(format!("invalid base64 payload: {error}"))
    }
}

impl LiveError {
    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Connection(_) | Self::Io(_) => ErrorCategory::Connection,
            Self::NotConnected => ErrorCategory::NotConnected,
            Self::DeviceUnavailable(_) => ErrorCategory::Device,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Encoding(_) | Self::Image(_) => ErrorCategory::Media,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::InvalidState(_) => ErrorCategory::State,
        }
    }

    /// Whether retrying with a fresh session could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Connection | ErrorCategory::NotConnected
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Connection => RecoverySuggestion::ReconnectWithNewSession,
            ErrorCategory::NotConnected => RecoverySuggestion::WaitForSetup,
            ErrorCategory::Device => RecoverySuggestion::CheckDevicePermissions,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolImplementation,
            _ => RecoverySuggestion::ReportBug,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, LiveError>;
