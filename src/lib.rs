//! Livelink: realtime voice, video and text sessions over a relay.
//!
//! A [`live::LiveSession`] dials a websocket relay, hands it the upstream
//! service address and a setup frame, then streams microphone audio, camera
//! frames and typed text up while classifying everything that comes back
//! (text, audio, transcripts, tool calls, turn boundaries).
//!
//! # Quick Start
//!
//! ```no_run
//! use livelink::prelude::*;
//!
//! # async fn example() -> livelink::error::Result<()> {
//! let config = SessionConfig::builder()
//!     .relay_url("ws://localhost:8080")
//!     .model("gemini-live-2.5-flash-native-audio")
//!     .build();
//! let session = LiveSession::new(config);
//! let mut events = session.take_events().expect("events are taken once");
//!
//! session.connect().await?;
//! let mut turns = TurnAccumulator::new();
//! while let Some(event) = events.next_event().await {
//!     if let SessionEvent::Inbound(inbound) = &event {
//!         if matches!(inbound, InboundEvent::SetupComplete) {
//!             session.send_text("Hello!")?;
//!         }
//!         if let Some(utterance) = turns.observe(inbound) {
//!             println!("{}", utterance.text);
//!             break;
//!         }
//!     }
//! }
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod live;
pub mod media;
pub mod prelude;

#[cfg(feature = "cli")]
pub mod cli;
