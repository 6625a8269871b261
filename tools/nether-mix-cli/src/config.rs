//! Config command and the mixer options shared by render/play

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use nether_mix::config::{CONFIG_FILE, config_dir};
use nether_mix::{Interpolation, MixerConfig, OutputFormat};

/// Interpolation names accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum InterpolationArg {
    None,
    Linear,
    Quadratic,
    Cubic,
    Sinc8,
    Sinc16,
}

impl From<InterpolationArg> for Interpolation {
    fn from(arg: InterpolationArg) -> Self {
        match arg {
            InterpolationArg::None => Interpolation::None,
            InterpolationArg::Linear => Interpolation::Linear,
            InterpolationArg::Quadratic => Interpolation::Quadratic,
            InterpolationArg::Cubic => Interpolation::Cubic,
            InterpolationArg::Sinc8 => Interpolation::Sinc8,
            InterpolationArg::Sinc16 => Interpolation::Sinc16,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Int16,
    Float,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Int16 => OutputFormat::Int16,
            FormatArg::Float => OutputFormat::Float,
        }
    }
}

/// Mixer settings, layered over `mixer.toml`
#[derive(Args, Debug, Default)]
pub struct MixerOptions {
    /// Config file (defaults to mixer.toml in the config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output frequency in Hz
    #[arg(long)]
    pub frequency: Option<u32>,

    /// Resampling filter
    #[arg(long, value_enum)]
    pub interpolation: Option<InterpolationArg>,

    /// Output sample format
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Disable volume ramping
    #[arg(long)]
    pub no_ramping: bool,

    /// Amplification (1-32)
    #[arg(long)]
    pub amplification: Option<u8>,
}

impl MixerOptions {
    /// Load the config file and apply command-line overrides.
    pub fn resolve(&self) -> Result<MixerConfig> {
        let mut config = match &self.config {
            Some(path) => MixerConfig::load_from(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => MixerConfig::load(),
        };

        let audio = &mut config.audio;
        if let Some(frequency) = self.frequency {
            audio.frequency = frequency;
        }
        if let Some(interpolation) = self.interpolation {
            audio.interpolation = interpolation.into();
        }
        if let Some(format) = self.format {
            audio.output_format = format.into();
        }
        if self.no_ramping {
            audio.volume_ramping = false;
        }
        if let Some(amplification) = self.amplification {
            audio.amplification = amplification;
        }

        config.validate().context("Invalid mixer settings")?;
        Ok(config)
    }
}

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Write the default configuration to the config directory
    #[arg(long)]
    pub init: bool,
}

/// Execute the config command
pub fn execute(args: ConfigArgs) -> Result<()> {
    let path = config_dir().map(|dir| dir.join(CONFIG_FILE));
    match &path {
        Some(path) => println!("# {}", path.display()),
        None => println!("# (no config directory)"),
    }

    if args.init {
        let config = MixerConfig::default();
        config.save().context("Failed to write default config")?;
        println!("# written with defaults");
    }

    let config = MixerConfig::load();
    let content = toml::to_string_pretty(&config).context("Failed to serialize config")?;
    print!("{}", content);
    Ok(())
}
