//! Error types for the mixing core

use thiserror::Error;

/// Errors reported by the mixer at configuration boundaries.
///
/// Variants that can be produced while the audio callback holds the engine
/// (trigger validation, tempo changes from a replayer tick) only carry `Copy`
/// data, so returning them never allocates.
#[derive(Error, Debug)]
pub enum MixerError {
    /// A lookup table or buffer could not be allocated
    #[error("failed to allocate {what} ({bytes} bytes)")]
    Allocation { what: &'static str, bytes: usize },

    /// Sample data has no frames
    #[error("sample has no frames")]
    EmptySample,

    /// Sample data longer than a voice can address
    #[error("sample of {0} frames is too long")]
    SampleTooLong(usize),

    /// Loop points outside the sample data
    #[error("loop {start}+{length} does not fit in a sample of {sample_len} frames")]
    InvalidLoop {
        start: u32,
        length: u32,
        sample_len: u32,
    },

    /// Channel index beyond the voice arena
    #[error("channel {channel} out of range (max {max})")]
    ChannelOutOfRange { channel: usize, max: usize },

    /// Start offset at or past the end of the playable region
    #[error("start offset {start} is past the sample end {end}")]
    StartPastEnd { start: u32, end: u32 },

    /// Frequency ratio that cannot be represented as a 32.32 delta
    #[error("frequency ratio {0} out of range")]
    FrequencyRatioOutOfRange(f64),

    /// BPM outside 32..=255 (0 is accepted as "paused")
    #[error("BPM {0} out of range (32-255, or 0 to pause)")]
    BpmOutOfRange(u16),

    /// Speed outside 1..=31
    #[error("speed {0} out of range (1-31)")]
    SpeedOutOfRange(u8),

    /// Output frequency outside the supported range
    #[error("output frequency {0} Hz out of range (44100-96000)")]
    FrequencyOutOfRange(u32),

    /// Amplification factor outside 1..=32
    #[error("amplification {0} out of range (1-32)")]
    AmplificationOutOfRange(u8),

    /// Master volume outside 0..=256
    #[error("master volume {0} out of range (0-256)")]
    MasterVolumeOutOfRange(u16),

    /// Sync queue capacity that is not 2^n - 1
    #[error("sync queue capacity {0} must be a power of two minus one")]
    InvalidQueueCapacity(usize),

    /// Invalid configuration file contents
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration could not be parsed
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Audio device error
    #[error("audio device: {0}")]
    Device(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, MixerError>;

/// Reserve an exactly-sized vector, reporting allocation failure instead of aborting.
pub(crate) fn try_alloc<T: Clone>(what: &'static str, len: usize, value: T) -> Result<Vec<T>> {
    let mut vec = Vec::new();
    vec.try_reserve_exact(len)
        .map_err(|_| MixerError::Allocation {
            what,
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    vec.resize(len, value);
    Ok(vec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MixerError::BpmOutOfRange(300);
        assert_eq!(err.to_string(), "BPM 300 out of range (32-255, or 0 to pause)");

        let err = MixerError::ChannelOutOfRange { channel: 40, max: 32 };
        assert!(err.to_string().contains("40"));
    }

    #[test]
    fn test_try_alloc() {
        let vec = try_alloc("test table", 16, 0.5f32).unwrap();
        assert_eq!(vec.len(), 16);
        assert!(vec.iter().all(|&v| v == 0.5));

        let err = try_alloc("huge table", usize::MAX / 2, 0u64).unwrap_err();
        assert!(matches!(err, MixerError::Allocation { what: "huge table", .. }));
    }
}
