//! Live session client: connection lifecycle, wire protocol, inbound
//! classification, and turn tracking.

pub mod events;
pub mod protocol;
pub mod session;
pub mod sink;
pub mod state;
pub mod tools;
pub mod turn;

pub use events::{InboundEvent, SessionEvent, Transcript};
pub use protocol::OutboundMessage;
pub use session::{LiveSession, MediaSender, SessionEvents};
pub use sink::{dispatch, EventSink};
pub use state::ConnectionState;
pub use tools::{
    resolve_tool_calls, FunctionDeclaration, ToolCall, ToolHandler, ToolRegistry, ToolResult,
};
pub use turn::{Role, TurnAccumulator, TurnEnding, Utterance};
