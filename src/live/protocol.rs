//! Outbound wire frames for the relay protocol.
//!
//! Every frame is a JSON text message. The first two frames of a connection
//! are always the routing directive and the setup frame, in that order.

use serde::Serialize;

use super::tools::{FunctionDeclaration, ToolResult};
use crate::config::SessionConfig;
use crate::error::Result;

pub const AUDIO_MIME_TYPE: &str = "audio/pcm";
pub const VIDEO_MIME_TYPE: &str = "image/jpeg";

/// A message queued for the connection, written in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// A complete user text turn.
    ClientText(String),
    /// Base64 PCM16 audio block.
    RealtimeAudio(String),
    /// Base64 JPEG still.
    RealtimeVideo(String),
    ToolResponse(Vec<ToolResult>),
}

impl OutboundMessage {
    /// Serialize into the JSON text of one websocket frame.
    pub fn to_frame(&self) -> Result<String> {
        let frame = match self {
            Self::ClientText(text) => serde_json::to_string(&ClientContentFrame {
                client_content: ClientContent {
                    turns: vec![Turn {
                        role: "user",
                        parts: vec![TextPart { text }],
                    }],
                    turn_complete: true,
                },
            })?,
            Self::RealtimeAudio(data) => media_frame(AUDIO_MIME_TYPE, data)?,
            Self::RealtimeVideo(data) => media_frame(VIDEO_MIME_TYPE, data)?,
            Self::ToolResponse(results) => serde_json::to_string(&ToolResponseFrame {
                tool_response: ToolResponseBody {
                    function_responses: results,
                },
            })?,
        };
        Ok(frame)
    }
}

fn media_frame(mime_type: &str, data: &str) -> Result<String> {
    Ok(serde_json::to_string(&RealtimeInputFrame {
        realtime_input: RealtimeInput {
            media_chunks: vec![MediaChunk { mime_type, data }],
        },
    })?)
}

/// First frame: tells the relay where to forward the session.
pub fn routing_directive(config: &SessionConfig) -> Result<String> {
    Ok(serde_json::to_string(&RoutingDirective {
        service_url: config.resolved_service_url(),
        bearer_token: config.bearer_token.as_deref(),
    })?)
}

/// Second frame: the session setup carrying the configuration.
pub fn setup_frame(config: &SessionConfig) -> Result<String> {
    let tools = if config.tools.is_empty() {
        None
    } else {
        Some(vec![ToolGroup {
            function_declarations: &config.tools,
        }])
    };

    Ok(serde_json::to_string(&SetupFrame {
        setup: Setup {
            model: config.model_resource(),
            generation_config: GenerationConfig {
                response_modalities: ["AUDIO"],
                temperature: config.temperature,
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: &config.voice_name,
                        },
                    },
                },
            },
            system_instruction: SystemInstruction {
                parts: vec![TextPart {
                    text: &config.system_instruction,
                }],
            },
            input_audio_transcription: Empty {},
            output_audio_transcription: Empty {},
            realtime_input_config: RealtimeInputConfig {
                automatic_activity_detection: AutomaticActivityDetection {
                    disabled: config.activity_detection.disabled,
                    silence_duration_ms: config.activity_detection.silence_duration_ms,
                    prefix_padding_ms: config.activity_detection.prefix_padding_ms,
                },
            },
            tools,
        },
    })?)
}

#[derive(Serialize)]
struct RoutingDirective<'a> {
    service_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    bearer_token: Option<&'a str>,
}

#[derive(Serialize)]
struct SetupFrame<'a> {
    setup: Setup<'a>,
}

#[derive(Serialize)]
struct Setup<'a> {
    model: String,
    generation_config: GenerationConfig<'a>,
    system_instruction: SystemInstruction<'a>,
    input_audio_transcription: Empty,
    output_audio_transcription: Empty,
    realtime_input_config: RealtimeInputConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolGroup<'a>>>,
}

#[derive(Serialize)]
struct GenerationConfig<'a> {
    response_modalities: [&'static str; 1],
    temperature: f64,
    speech_config: SpeechConfig<'a>,
}

#[derive(Serialize)]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Serialize)]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Serialize)]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct Empty {}

#[derive(Serialize)]
struct RealtimeInputConfig {
    automatic_activity_detection: AutomaticActivityDetection,
}

#[derive(Serialize)]
struct AutomaticActivityDetection {
    disabled: bool,
    silence_duration_ms: u32,
    prefix_padding_ms: u32,
}

#[derive(Serialize)]
struct ToolGroup<'a> {
    function_declarations: &'a [FunctionDeclaration],
}

#[derive(Serialize)]
struct ClientContentFrame<'a> {
    client_content: ClientContent<'a>,
}

#[derive(Serialize)]
struct ClientContent<'a> {
    turns: Vec<Turn<'a>>,
    turn_complete: bool,
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'static str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct RealtimeInputFrame<'a> {
    realtime_input: RealtimeInput<'a>,
}

#[derive(Serialize)]
struct RealtimeInput<'a> {
    media_chunks: Vec<MediaChunk<'a>>,
}

#[derive(Serialize)]
struct MediaChunk<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
struct ToolResponseFrame<'a> {
    tool_response: ToolResponseBody<'a>,
}

#[derive(Serialize)]
struct ToolResponseBody<'a> {
    function_responses: &'a [ToolResult],
}
