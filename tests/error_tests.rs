//! Tests for the error system.

use livelink::error::unified::*;
use livelink::error::*;

#[test]
fn error_tool_creation() {
    let err = LiveError::tool("get_weather", "Unknown function");
    assert!(matches!(&err, LiveError::ToolExecution { tool_name, .. } if tool_name == "get_weather"));
    assert_eq!(
        err.to_string(),
        "Tool execution error: get_weather: Unknown function"
    );
}

#[test]
fn error_helper_mappings_are_stable_for_major_variants() {
    struct Case {
        error: LiveError,
        expected_category: ErrorCategory,
        expected_retryable: bool,
        expected_recovery: RecoverySuggestion,
    }

    let io_error = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
    let serde_error = serde_json::from_str::<serde_json::Value>("{not-json}").unwrap_err();

    let cases = vec![
        Case {
            error: LiveError::Connection("refused".to_string()),
            expected_category: ErrorCategory::Connection,
            expected_retryable: true,
            expected_recovery: RecoverySuggestion::ReconnectWithNewSession,
        },
        Case {
            error: LiveError::NotConnected,
            expected_category: ErrorCategory::NotConnected,
            expected_retryable: true,
            expected_recovery: RecoverySuggestion::WaitForSetup,
        },
        Case {
            error: LiveError::Configuration("bad-config".to_string()),
            expected_category: ErrorCategory::Configuration,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::CheckConfiguration,
        },
        Case {
            error: LiveError::DeviceUnavailable("permission denied".to_string()),
            expected_category: ErrorCategory::Device,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::CheckDevicePermissions,
        },
        Case {
            error: LiveError::tool("lookup", "boom"),
            expected_category: ErrorCategory::ToolExecution,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::CheckToolImplementation,
        },
        Case {
            error: LiveError::InvalidState("closed".to_string()),
            expected_category: ErrorCategory::State,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::ReportBug,
        },
        Case {
            error: LiveError::Encoding("odd length".to_string()),
            expected_category: ErrorCategory::Media,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::ReportBug,
        },
        Case {
            error: LiveError::Io(io_error),
            expected_category: ErrorCategory::Connection,
            expected_retryable: true,
            expected_recovery: RecoverySuggestion::ReconnectWithNewSession,
        },
        Case {
            error: LiveError::Serialization(serde_error),
            expected_category: ErrorCategory::Serialization,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::ReportBug,
        },
    ];

    for case in cases {
        assert_eq!(case.error.category(), case.expected_category, "{}", case.error);
        assert_eq!(case.error.is_retryable(), case.expected_retryable, "{}", case.error);
        assert_eq!(
            case.error.recovery_suggestion(),
            case.expected_recovery,
            "{}",
            case.error
        );
    }
}

#[test]
fn error_from_base64_is_encoding() {
    use base64::Engine;
    let decode_error = base64::engine::general_purpose::STANDARD
        .decode("!!!")
        .unwrap_err();
    let err: LiveError = decode_error.into();
    assert!(matches!(err, LiveError::Encoding(_)));
}

#[test]
fn error_from_serde_json() {
    let serde_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
    let err: LiveError = serde_err.into();
    assert!(matches!(err, LiveError::Serialization(_)));
}

#[test]
fn error_from_io() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: LiveError = io_err.into();
    assert!(matches!(err, LiveError::Io(_)));
}
