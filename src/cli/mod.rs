//! Command-line front end for livelink.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::SessionConfig;
use crate::error::Result;

/// Livelink CLI
#[derive(Parser, Debug)]
#[command(name = "livelink", version, about = "Realtime voice and text sessions over a relay")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive session
    Chat(ChatArgs),
    /// Print the resolved configuration
    Config(ConfigArgs),
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Relay websocket URL (e.g. ws://localhost:8080)
    #[arg(short, long)]
    pub relay: Option<String>,

    /// Model name
    #[arg(short, long)]
    pub model: Option<String>,

    /// Prebuilt voice name
    #[arg(short, long)]
    pub voice: Option<String>,

    /// System instruction
    #[arg(short, long)]
    pub system: Option<String>,

    /// Stream the default microphone (requires the `cpal` feature)
    #[arg(long)]
    pub mic: bool,

    /// Play model audio on the default speaker (requires the `cpal` feature)
    #[arg(long)]
    pub speaker: bool,
}

impl ChatArgs {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply(&self, mut config: SessionConfig) -> SessionConfig {
        if let Some(relay) = &self.relay {
            config.relay_url = relay.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(voice) = &self.voice {
            config.voice_name = voice.clone();
        }
        if let Some(system) = &self.system {
            config.system_instruction = system.clone();
        }
        config
    }
}

/// Arguments for the `config` subcommand.
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Read this TOML file instead of the default location
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

/// Load configuration from `file` (or the default location) plus the
/// environment.
pub fn resolve_config(file: Option<&Path>) -> Result<SessionConfig> {
    match file {
        Some(path) => SessionConfig::from_toml_file(path)?.apply_env(),
        None => SessionConfig::load(),
    }
}
