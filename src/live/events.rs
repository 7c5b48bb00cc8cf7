//! Inbound event classification.

use serde_json::Value;

use super::state::ConnectionState;
use super::tools::ToolCall;

/// A transcript fragment for one direction of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transcript {
    pub text: String,
    pub finished: bool,
}

/// One classified relay frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    SetupComplete,
    TextDelta {
        text: String,
    },
    /// Base64 PCM16 audio, as received.
    AudioChunk {
        data: String,
        mime_type: Option<String>,
    },
    InputTranscript(Transcript),
    OutputTranscript(Transcript),
    TurnComplete,
    Interrupted,
    ToolCall {
        calls: Vec<ToolCall>,
    },
    /// The frame matched none of the known shapes.
    Unrecognized {
        frame: Value,
    },
}

impl InboundEvent {
    /// Classify a parsed relay frame. Total: every frame maps to exactly one
    /// event.
    ///
    /// Priority order: setup acknowledgment, turn completion, interruption,
    /// input transcript, output transcript, tool call, then the first content
    /// part (text before inline audio).
    pub fn classify(frame: &Value) -> Self {
        let content = field(frame, "serverContent", "server_content");

        if field(frame, "setupComplete", "setup_complete").is_some_and(is_present) {
            return Self::SetupComplete;
        }
        if content.is_some_and(|content| flag(content, "turnComplete", "turn_complete")) {
            return Self::TurnComplete;
        }
        if content.is_some_and(|content| flag(content, "interrupted", "interrupted")) {
            return Self::Interrupted;
        }
        if let Some(transcript) = content
            .and_then(|content| field(content, "inputTranscription", "input_transcription"))
            .filter(|value| is_present(value))
        {
            return Self::InputTranscript(parse_transcript(transcript));
        }
        if let Some(transcript) = content
            .and_then(|content| field(content, "outputTranscription", "output_transcription"))
            .filter(|value| is_present(value))
        {
            return Self::OutputTranscript(parse_transcript(transcript));
        }
        if let Some(tool_call) = field(frame, "toolCall", "tool_call").filter(|v| is_present(v)) {
            return Self::ToolCall {
                calls: parse_function_calls(tool_call),
            };
        }

        let first_part = content
            .and_then(|content| field(content, "modelTurn", "model_turn"))
            .and_then(|turn| turn.get("parts"))
            .and_then(Value::as_array)
            .and_then(|parts| parts.first());
        if let Some(part) = first_part {
            if let Some(text) = part
                .get("text")
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
            {
                return Self::TextDelta {
                    text: text.to_string(),
                };
            }
            if let Some(inline) = field(part, "inlineData", "inline_data") {
                if let Some(data) = inline.get("data").and_then(Value::as_str) {
                    return Self::AudioChunk {
                        data: data.to_string(),
                        mime_type: string_field(inline, "mimeType", "mime_type"),
                    };
                }
            }
        }

        Self::Unrecognized {
            frame: frame.clone(),
        }
    }

    /// Whether this event ends the current turn.
    pub fn ends_turn(&self) -> bool {
        matches!(self, Self::TurnComplete | Self::Interrupted)
    }
}

/// Everything a session reports to its caller, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Inbound(InboundEvent),
    StateChanged(ConnectionState),
    Error { message: String },
}

impl SessionEvent {
    pub(crate) fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

fn field<'a>(value: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    value.get(camel).or_else(|| value.get(snake))
}

fn string_field(value: &Value, camel: &str, snake: &str) -> Option<String> {
    field(value, camel, snake)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn flag(value: &Value, camel: &str, snake: &str) -> bool {
    field(value, camel, snake).is_some_and(is_present)
}

/// Truthiness of a JSON member: anything except null, false, 0 and "".
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn parse_transcript(value: &Value) -> Transcript {
    Transcript {
        text: value
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        finished: value.get("finished").is_some_and(is_present),
    }
}

fn parse_function_calls(tool_call: &Value) -> Vec<ToolCall> {
    field(tool_call, "functionCalls", "function_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .map(|call| ToolCall {
                    id: call
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    name: call
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    args: call
                        .get("args")
                        .cloned()
                        .unwrap_or_else(|| Value::Object(Default::default())),
                })
                .collect()
        })
        .unwrap_or_default()
}
