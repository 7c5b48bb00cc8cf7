//! Livelink CLI binary entry point.

use clap::Parser;
use livelink::cli::{resolve_config, ChatArgs, Cli, Commands, ConfigArgs};
use livelink::error::{LiveError, Result};
use livelink::live::{
    resolve_tool_calls, ConnectionState, InboundEvent, LiveSession, Role, SessionEvent,
    ToolRegistry, TurnAccumulator, TurnEnding, Utterance,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Chat(args) => handle_chat(args).await,
        Commands::Config(args) => handle_config(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("livelink=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_config(args: ConfigArgs) -> Result<()> {
    let config = resolve_config(args.file.as_deref())?;
    print!("{}", config.to_redacted_toml()?);
    Ok(())
}

async fn handle_chat(args: ChatArgs) -> Result<()> {
    let config = args.apply(resolve_config(None)?);
    let session = LiveSession::new(config);
    let mut events = session
        .take_events()
        .ok_or_else(|| LiveError::InvalidState("Session events already taken".into()))?;
    let media = devices::LocalMedia::start(args.mic, args.speaker, &session)?;

    if let Err(error) = session.connect().await {
        media.stop().await;
        return Err(error);
    }

    let registry = ToolRegistry::new();
    let mut turns = TurnAccumulator::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if let Err(error) = session.send_text(text) {
                    eprintln!("! {error}");
                }
            }
            event = events.next_event() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::StateChanged(ConnectionState::Closed) => break,
                    SessionEvent::StateChanged(state) => tracing::info!(%state, "connection"),
                    SessionEvent::Error { message } => eprintln!("! {message}"),
                    SessionEvent::Inbound(inbound) => {
                        match &inbound {
                            InboundEvent::SetupComplete => {
                                eprintln!("Connected. Type a message and press enter.");
                            }
                            InboundEvent::AudioChunk { data, .. } => media.play(data),
                            InboundEvent::Interrupted => media.interrupt(),
                            InboundEvent::ToolCall { calls } => {
                                let results = resolve_tool_calls(&registry, calls).await;
                                if let Err(error) = session.send_tool_response(results) {
                                    eprintln!("! {error}");
                                }
                            }
                            _ => {}
                        }
                        if let Some(utterance) = turns.observe(&inbound) {
                            print_utterance(&utterance);
                        }
                    }
                }
            }
        }
    }

    media.stop().await;
    session.disconnect().await
}

fn print_utterance(utterance: &Utterance) {
    let speaker = match utterance.role {
        Role::User => "you",
        Role::Assistant => "model",
    };
    if utterance.ending == TurnEnding::Interrupted {
        println!("{speaker}> {} [interrupted]", utterance.text);
    } else {
        println!("{speaker}> {}", utterance.text);
    }
}

#[cfg(feature = "cpal")]
mod devices {
    use livelink::error::Result;
    use livelink::live::LiveSession;
    use livelink::media::{
        spawn_player, CpalMicrophone, CpalSpeaker, MicCapture, PlaybackScheduler, PlayerHandle,
        DEFAULT_PLAYER_CAPACITY,
    };

    pub struct LocalMedia {
        mic: Option<MicCapture>,
        player: Option<PlayerHandle>,
    }

    impl LocalMedia {
        pub fn start(mic: bool, speaker: bool, session: &LiveSession) -> Result<Self> {
            let player = speaker.then(|| {
                spawn_player(
                    PlaybackScheduler::new(CpalSpeaker::default()),
                    DEFAULT_PLAYER_CAPACITY,
                )
            });
            let mic = if mic {
                let mut capture = MicCapture::default();
                capture.start_streaming(&CpalMicrophone::default(), session.media_sender())?;
                Some(capture)
            } else {
                None
            };
            Ok(Self { mic, player })
        }

        pub fn play(&self, chunk: &str) {
            if let Some(player) = &self.player {
                if !player.play(chunk) {
                    tracing::debug!("playback queue full; dropping chunk");
                }
            }
        }

        pub fn interrupt(&self) {
            if let Some(player) = &self.player {
                player.interrupt();
            }
        }

        pub async fn stop(mut self) {
            if let Some(mut mic) = self.mic.take() {
                mic.stop();
            }
            if let Some(player) = self.player.take() {
                player.shutdown().await;
            }
        }
    }
}

#[cfg(not(feature = "cpal"))]
mod devices {
    use livelink::error::{LiveError, Result};
    use livelink::live::LiveSession;

    pub struct LocalMedia;

    impl LocalMedia {
        pub fn start(mic: bool, speaker: bool, _session: &LiveSession) -> Result<Self> {
            if mic || speaker {
                return Err(LiveError::Configuration(
                    "--mic and --speaker require the `cpal` feature".into(),
                ));
            }
            Ok(Self)
        }

        pub fn play(&self, _chunk: &str) {}

        pub fn interrupt(&self) {}

        pub async fn stop(self) {}
    }
}
