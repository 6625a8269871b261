//! Nether Mix CLI - drive the mixing core from the command line
//!
//! # Commands
//!
//! - `nether-mix render` - Render the demo song to a WAV file
//! - `nether-mix play` - Play the demo song live (`playback` feature)
//! - `nether-mix config` - Show or create `mixer.toml`
//!
//! # Usage
//!
//! ```bash
//! # Ten seconds of the demo at 48 kHz with 16-tap sinc
//! nether-mix render demo.wav --seconds 10 --interpolation sinc16
//!
//! # Engine diagnostics
//! RUST_LOG=nether_mix=debug nether-mix play
//! ```

mod config;
mod demo;
#[cfg(feature = "playback")]
mod play;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Nether Mix - tracker mixing core demo
#[derive(Parser)]
#[command(name = "nether-mix")]
#[command(about = "Render or play the nether-mix demo song")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the demo song to a WAV file
    Render(render::RenderArgs),

    /// Play the demo song through the default audio device
    #[cfg(feature = "playback")]
    Play(play::PlayArgs),

    /// Show the effective mixer configuration
    Config(config::ConfigArgs),
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render(args) => render::execute(args),
        #[cfg(feature = "playback")]
        Commands::Play(args) => play::execute(args),
        Commands::Config(args) => config::execute(args),
    }
}
