//! Turn accumulation over the inbound event stream.

use strum::Display;

use super::events::InboundEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// How an assistant utterance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TurnEnding {
    Completed,
    Interrupted,
    /// Finished user transcript.
    Transcribed,
}

/// A completed utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub role: Role,
    pub text: String,
    pub ending: TurnEnding,
}

/// Folds text and transcript deltas into utterances.
///
/// There is one open assistant buffer at a time. `TurnComplete` and
/// `Interrupted` close it; the next delta opens a new turn.
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    current: String,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text accumulated for the open assistant turn.
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Feed one event. Returns an utterance when the event completes one.
    pub fn observe(&mut self, event: &InboundEvent) -> Option<Utterance> {
        match event {
            InboundEvent::TextDelta { text } => {
                self.current.push_str(text);
                None
            }
            InboundEvent::OutputTranscript(transcript) => {
                self.current.push_str(&transcript.text);
                None
            }
            InboundEvent::TurnComplete => self.close(TurnEnding::Completed),
            InboundEvent::Interrupted => self.close(TurnEnding::Interrupted),
            InboundEvent::InputTranscript(transcript) if transcript.finished => {
                let text = transcript.text.trim();
                (!text.is_empty()).then(|| Utterance {
                    role: Role::User,
                    text: text.to_string(),
                    ending: TurnEnding::Transcribed,
                })
            }
            _ => None,
        }
    }

    fn close(&mut self, ending: TurnEnding) -> Option<Utterance> {
        let text = std::mem::take(&mut self.current);
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| Utterance {
            role: Role::Assistant,
            text: trimmed.to_string(),
            ending,
        })
    }
}
