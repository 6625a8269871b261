//! Prepared sample data
//!
//! A [`Sample`] is immutable PCM copied once into a padded buffer so the
//! mixing routines can read interpolation taps around any playable position
//! without bounds arithmetic:
//!
//! ```text
//! [ 7 leading guard | frames 0..end | 8 trailing guard ]
//! ```
//!
//! The trailing guard holds what playback would read next: the loop start
//! again (forward), the mirrored loop tail (ping-pong) or silence (no loop).
//! A separate edge-tap buffer holds the view around the loop start once the
//! voice has looped, when the frames left of the loop start belong to the
//! loop tail rather than the pre-loop intro.
//!
//! Loop points are fixed per `Sample`; changing them means preparing a new one.

use crate::error::{MixerError, Result, try_alloc};
use crate::{MAX_LEFT_TAPS, MAX_RIGHT_TAPS};

/// Leading guard frames (widest kernel's left reach)
pub const LEFT_GUARD: usize = MAX_LEFT_TAPS;
/// Trailing guard frames (widest kernel's right reach)
pub const RIGHT_GUARD: usize = MAX_RIGHT_TAPS;
/// Edge-tap buffer length: positions `loopStart-7 ..= loopStart+15`
pub const EDGE_TAPS_LEN: usize = MAX_LEFT_TAPS * 2 + MAX_RIGHT_TAPS + 1;

/// Sample word size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitDepth {
    Bit8,
    Bit16,
}

/// How playback continues at the sample end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoopMode {
    #[default]
    None,
    Forward,
    PingPong,
}

/// A PCM word the mixer can read.
pub trait SampleWord: Copy + Default + Send + Sync + 'static {
    /// Scale from the raw word to [-1, 1)
    const SCALE: f32;

    fn to_f32(self) -> f32;

    /// Borrow the frames of `sample` if it is stored with this word size.
    fn frames(sample: &Sample) -> Option<&SampleFrames<Self>>;
}

impl SampleWord for i8 {
    const SCALE: f32 = 1.0 / 128.0;

    #[inline(always)]
    fn to_f32(self) -> f32 {
        self as f32
    }

    fn frames(sample: &Sample) -> Option<&SampleFrames<Self>> {
        match &sample.data {
            SampleData::Pcm8(frames) => Some(frames),
            SampleData::Pcm16(_) => None,
        }
    }
}

impl SampleWord for i16 {
    const SCALE: f32 = 1.0 / 32768.0;

    #[inline(always)]
    fn to_f32(self) -> f32 {
        self as f32
    }

    fn frames(sample: &Sample) -> Option<&SampleFrames<Self>> {
        match &sample.data {
            SampleData::Pcm16(frames) => Some(frames),
            SampleData::Pcm8(_) => None,
        }
    }
}

/// Padded frames plus the post-loop edge taps.
pub struct SampleFrames<T> {
    padded: Vec<T>,
    edge: [T; EDGE_TAPS_LEN],
}

impl<T: SampleWord> SampleFrames<T> {
    /// `width` taps starting `left` frames before `index`.
    #[inline(always)]
    pub(crate) fn taps(&self, index: isize, left: usize, width: usize) -> &[T] {
        let start = (index + LEFT_GUARD as isize) as usize - left;
        &self.padded[start..start + width]
    }

    /// Like [`taps`](Self::taps), for `index = loopStart + offset` after the
    /// voice has looped (`offset <= MAX_LEFT_TAPS`).
    #[inline(always)]
    pub(crate) fn edge_taps(&self, offset: usize, left: usize, width: usize) -> &[T] {
        let start = offset + MAX_LEFT_TAPS - left;
        &self.edge[start..start + width]
    }
}

enum SampleData {
    Pcm8(SampleFrames<i8>),
    Pcm16(SampleFrames<i16>),
}

/// Immutable, mixer-ready sample.
pub struct Sample {
    id: u32,
    len: u32,
    loop_mode: LoopMode,
    loop_start: u32,
    loop_length: u32,
    end: u32,
    data: SampleData,
}

/// Loop geometry resolved against the sample length
#[derive(Clone, Copy)]
struct LoopGeometry {
    mode: LoopMode,
    start: i64,
    length: i64,
    end: i64,
}

impl LoopGeometry {
    fn resolve(len: usize, mode: LoopMode, start: u32, length: u32) -> Result<Self> {
        if len == 0 {
            return Err(MixerError::EmptySample);
        }
        if len > i32::MAX as usize {
            return Err(MixerError::SampleTooLong(len));
        }
        let sample_len = len as u32;

        // Loops shorter than one frame play as one-shots
        if mode == LoopMode::None || length == 0 {
            return Ok(Self {
                mode: LoopMode::None,
                start: 0,
                length: 0,
                end: len as i64,
            });
        }

        if start.checked_add(length).is_none_or(|end| end > sample_len) {
            return Err(MixerError::InvalidLoop {
                start,
                length,
                sample_len,
            });
        }

        Ok(Self {
            mode,
            start: start as i64,
            length: length as i64,
            end: (start + length) as i64,
        })
    }

    /// Source frame for virtual position `pos`, or `None` for silence.
    ///
    /// `looped` selects the view after at least one loop cycle, where
    /// positions left of the loop start continue the loop backwards.
    fn source_index(&self, pos: i64, looped: bool) -> Option<usize> {
        let outside = pos >= self.end || (looped && pos < self.start);
        let wraps = self.mode != LoopMode::None && outside;
        if wraps {
            let rel = pos - self.start;
            let index = match self.mode {
                LoopMode::PingPong => {
                    let phase = rel.rem_euclid(self.length * 2);
                    if phase < self.length {
                        self.start + phase
                    } else {
                        self.start + self.length * 2 - 1 - phase
                    }
                }
                _ => self.start + rel.rem_euclid(self.length),
            };
            Some(index as usize)
        } else if pos < 0 || pos >= self.end {
            None
        } else {
            Some(pos as usize)
        }
    }

    fn build_frames<T: SampleWord>(&self, pcm: &[T]) -> Result<SampleFrames<T>> {
        let end = self.end as usize;
        let mut padded = try_alloc("sample frames", LEFT_GUARD + end + RIGHT_GUARD, T::default())?;
        for (i, slot) in padded.iter_mut().enumerate() {
            let pos = i as i64 - LEFT_GUARD as i64;
            if let Some(src) = self.source_index(pos, false) {
                *slot = pcm[src];
            }
        }

        let mut edge = [T::default(); EDGE_TAPS_LEN];
        if self.mode != LoopMode::None {
            let first = self.start - MAX_LEFT_TAPS as i64;
            for (i, slot) in edge.iter_mut().enumerate() {
                if let Some(src) = self.source_index(first + i as i64, true) {
                    *slot = pcm[src];
                }
            }
        }

        Ok(SampleFrames { padded, edge })
    }
}

impl Sample {
    /// Prepare 8-bit PCM.
    ///
    /// A `loop_length` of zero disables looping. Fails on empty data or a
    /// loop that does not fit.
    pub fn from_pcm8(
        id: u32,
        pcm: &[i8],
        loop_mode: LoopMode,
        loop_start: u32,
        loop_length: u32,
    ) -> Result<Self> {
        let geometry = LoopGeometry::resolve(pcm.len(), loop_mode, loop_start, loop_length)?;
        let frames = geometry.build_frames(pcm)?;
        Ok(Self::assemble(id, pcm.len(), geometry, SampleData::Pcm8(frames)))
    }

    /// Prepare 16-bit PCM. Same rules as [`from_pcm8`](Self::from_pcm8).
    pub fn from_pcm16(
        id: u32,
        pcm: &[i16],
        loop_mode: LoopMode,
        loop_start: u32,
        loop_length: u32,
    ) -> Result<Self> {
        let geometry = LoopGeometry::resolve(pcm.len(), loop_mode, loop_start, loop_length)?;
        let frames = geometry.build_frames(pcm)?;
        Ok(Self::assemble(id, pcm.len(), geometry, SampleData::Pcm16(frames)))
    }

    fn assemble(id: u32, len: usize, geometry: LoopGeometry, data: SampleData) -> Self {
        Self {
            id,
            len: len as u32,
            loop_mode: geometry.mode,
            loop_start: geometry.start as u32,
            loop_length: geometry.length as u32,
            end: geometry.end as u32,
            data,
        }
    }

    /// Caller-assigned identifier, reported in channel snapshots
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Number of source frames
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bit_depth(&self) -> BitDepth {
        match self.data {
            SampleData::Pcm8(_) => BitDepth::Bit8,
            SampleData::Pcm16(_) => BitDepth::Bit16,
        }
    }

    /// Effective loop mode (`None` when the loop was empty)
    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn loop_start(&self) -> u32 {
        self.loop_start
    }

    pub fn loop_length(&self) -> u32 {
        self.loop_length
    }

    /// End of the playable region: loop end for looped samples, else the length
    pub fn end(&self) -> u32 {
        self.end
    }
}

impl std::fmt::Debug for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sample")
            .field("id", &self.id)
            .field("len", &self.len)
            .field("bit_depth", &self.bit_depth())
            .field("loop_mode", &self.loop_mode)
            .field("loop_start", &self.loop_start)
            .field("loop_length", &self.loop_length)
            .finish()
    }
}
