//! Event-sink abstraction: one method per event kind.

use serde_json::Value;

use super::events::{InboundEvent, SessionEvent, Transcript};
use super::state::ConnectionState;
use super::tools::ToolCall;

/// Receives session events. Every method has a no-op default, so an
/// implementation only overrides what it cares about.
pub trait EventSink {
    fn on_setup_complete(&mut self) {}

    fn on_text_delta(&mut self, _text: &str) {}

    /// Base64 PCM16 audio at the playback rate.
    fn on_audio_chunk(&mut self, _data: &str) {}

    fn on_input_transcript(&mut self, _transcript: &Transcript) {}

    fn on_output_transcript(&mut self, _transcript: &Transcript) {}

    fn on_turn_complete(&mut self) {}

    fn on_interrupted(&mut self) {}

    fn on_tool_call(&mut self, _calls: &[ToolCall]) {}

    fn on_unrecognized(&mut self, frame: &Value) {
        tracing::debug!(%frame, "ignoring unrecognized relay frame");
    }

    fn on_state_change(&mut self, _state: ConnectionState) {}

    fn on_error(&mut self, _message: &str) {}
}

/// Route one event to the matching sink method.
pub fn dispatch<S>(sink: &mut S, event: &SessionEvent)
where
    S: EventSink + ?Sized,
{
    match event {
        SessionEvent::Inbound(inbound) => match inbound {
            InboundEvent::SetupComplete => sink.on_setup_complete(),
            InboundEvent::TextDelta { text } => sink.on_text_delta(text),
            InboundEvent::AudioChunk { data, .. } => sink.on_audio_chunk(data),
            InboundEvent::InputTranscript(transcript) => sink.on_input_transcript(transcript),
            InboundEvent::OutputTranscript(transcript) => sink.on_output_transcript(transcript),
            InboundEvent::TurnComplete => sink.on_turn_complete(),
            InboundEvent::Interrupted => sink.on_interrupted(),
            InboundEvent::ToolCall { calls } => sink.on_tool_call(calls),
            InboundEvent::Unrecognized { frame } => sink.on_unrecognized(frame),
        },
        SessionEvent::StateChanged(state) => sink.on_state_change(*state),
        SessionEvent::Error { message } => sink.on_error(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<String>,
    }

    impl EventSink for Recorder {
        fn on_text_delta(&mut self, text: &str) {
            self.seen.push(format!("text:{text}"));
        }

        fn on_turn_complete(&mut self) {
            self.seen.push("turn_complete".into());
        }

        fn on_state_change(&mut self, state: ConnectionState) {
            self.seen.push(format!("state:{state}"));
        }

        fn on_error(&mut self, message: &str) {
            self.seen.push(format!("error:{message}"));
        }
    }

    #[test]
    fn dispatch_routes_each_kind_and_ignores_unhandled() {
        let mut sink = Recorder::default();
        let events = [
            SessionEvent::StateChanged(ConnectionState::Open),
            SessionEvent::Inbound(InboundEvent::TextDelta { text: "hi".into() }),
            SessionEvent::Inbound(InboundEvent::Interrupted),
            SessionEvent::Inbound(InboundEvent::TurnComplete),
            SessionEvent::Error {
                message: "boom".into(),
            },
        ];
        for event in &events {
            dispatch(&mut sink, event);
        }
        assert_eq!(
            sink.seen,
            vec!["state:open", "text:hi", "turn_complete", "error:boom"]
        );
    }
}
