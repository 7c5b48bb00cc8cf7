//! Error classification and recovery hints.

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Connection,
    NotConnected,
    Device,
    ToolExecution,
    Media,
    Serialization,
    State,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    ReconnectWithNewSession,
    WaitForSetup,
    CheckDevicePermissions,
    CheckConfiguration,
    CheckToolImplementation,
    ReportBug,
}
