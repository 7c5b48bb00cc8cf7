//! Convenience re-exports for common use.

pub use crate::config::{ActivityDetection, SessionConfig};
pub use crate::error::{LiveError, Result};
pub use crate::live::{
    ConnectionState, EventSink, FunctionDeclaration, InboundEvent, LiveSession, MediaSender,
    Role, SessionEvent, SessionEvents, ToolCall, ToolHandler, ToolRegistry, ToolResult,
    TurnAccumulator, Utterance,
};
pub use crate::media::{CameraCapture, MicCapture, PlaybackScheduler, PlayerHandle};
