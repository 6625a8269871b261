//! Interpolation lookup tables
//!
//! Every resampling filter wider than two taps is precomputed once into a
//! phase-indexed table of `f32` coefficients. The mixing routines pick the
//! phase from the top bits of a voice's 32-bit position fraction.
//!
//! - Quadratic spline: 3 taps (offsets 0..=2)
//! - Cubic spline: 4 taps (offsets -1..=2)
//! - Windowed sinc: 8 taps (-3..=4) and 16 taps (-7..=8), Kaiser-Bessel
//!   window, three (beta, cutoff) variants chosen by resampling ratio
//!
//! Linear interpolation is computed inline and has no table.

use std::f64::consts::PI;

use tracing::debug;

use crate::error::{Result, try_alloc};
use crate::{MIXER_FRAC_BITS, MIXER_FRAC_SCALE};

// =============================================================================
// Table geometry
// =============================================================================

/// log2 of the number of spline phases
pub const SPLINE_PHASES_BITS: u32 = 13;
/// Number of phases in the quadratic and cubic spline tables
pub const SPLINE_PHASES: usize = 1 << SPLINE_PHASES_BITS;

/// Taps per phase of the quadratic spline
pub const QUADRATIC_SPLINE_WIDTH: usize = 3;
/// Taps per phase of the cubic spline
pub const CUBIC_SPLINE_WIDTH: usize = 4;

/// log2 of the number of sinc phases
pub const SINC_PHASES_BITS: u32 = 13;
/// Number of phases in each sinc table
pub const SINC_PHASES: usize = 1 << SINC_PHASES_BITS;

/// Number of sinc kernels per width
pub const SINC_KERNELS: usize = 3;

/// (Kaiser beta, cutoff) per sinc kernel, widest passband first
const SINC_KERNEL_CONFIG: [(f64, f64); SINC_KERNELS] = [(9.6377, 1.0), (8.5, 0.75), (7.3, 0.425)];

/// Deltas up to 1.1875 use the full-band kernel
const SINC_RATIO_WIDE: u64 = MIXER_FRAC_SCALE * 19 / 16;
/// Deltas up to 1.5 use the medium kernel, anything above the narrowest
const SINC_RATIO_MEDIUM: u64 = MIXER_FRAC_SCALE * 3 / 2;

/// Phase index for a 32-bit position fraction
#[inline(always)]
pub(crate) fn phase_index(frac: u64, phase_bits: u32) -> usize {
    (frac >> (MIXER_FRAC_BITS - phase_bits)) as usize
}

/// Pick the sinc kernel for a 32.32 position delta.
pub fn sinc_kernel_for_delta(delta: u64) -> usize {
    if delta <= SINC_RATIO_WIDE {
        0
    } else if delta <= SINC_RATIO_MEDIUM {
        1
    } else {
        2
    }
}

/// Precomputed interpolation tables, shared read-only by every voice.
pub struct Kernels {
    quadratic: Vec<f32>,
    cubic: Vec<f32>,
    sinc8: [Vec<f32>; SINC_KERNELS],
    sinc16: [Vec<f32>; SINC_KERNELS],
}

impl Kernels {
    /// Build every table. Fails only if memory cannot be reserved.
    pub fn new() -> Result<Self> {
        let kernels = Self {
            quadratic: quadratic_spline_table()?,
            cubic: cubic_spline_table()?,
            sinc8: [sinc_table(8, 0)?, sinc_table(8, 1)?, sinc_table(8, 2)?],
            sinc16: [sinc_table(16, 0)?, sinc_table(16, 1)?, sinc_table(16, 2)?],
        };
        debug!(
            "Interpolation tables ready ({} KiB)",
            kernels.footprint_bytes() / 1024
        );
        Ok(kernels)
    }

    /// Quadratic spline coefficients, `QUADRATIC_SPLINE_WIDTH` per phase
    pub fn quadratic(&self) -> &[f32] {
        &self.quadratic
    }

    /// Cubic spline coefficients, `CUBIC_SPLINE_WIDTH` per phase
    pub fn cubic(&self) -> &[f32] {
        &self.cubic
    }

    /// 8-tap sinc coefficients for kernel `index`
    pub fn sinc8(&self, index: usize) -> &[f32] {
        &self.sinc8[index.min(SINC_KERNELS - 1)]
    }

    /// 16-tap sinc coefficients for kernel `index`
    pub fn sinc16(&self, index: usize) -> &[f32] {
        &self.sinc16[index.min(SINC_KERNELS - 1)]
    }

    fn footprint_bytes(&self) -> usize {
        let floats = self.quadratic.len()
            + self.cubic.len()
            + self.sinc8.iter().map(Vec::len).sum::<usize>()
            + self.sinc16.iter().map(Vec::len).sum::<usize>();
        floats * std::mem::size_of::<f32>()
    }
}

fn quadratic_spline_table() -> Result<Vec<f32>> {
    let len = SPLINE_PHASES * QUADRATIC_SPLINE_WIDTH;
    let mut table = try_alloc("quadratic spline table", len, 0.0)?;
    for (phase, taps) in table.chunks_exact_mut(QUADRATIC_SPLINE_WIDTH).enumerate() {
        let x = phase as f64 / SPLINE_PHASES as f64;
        let x2 = x * x;
        taps[0] = (1.0 - 1.5 * x + 0.5 * x2) as f32;
        taps[1] = (2.0 * x - x2) as f32;
        taps[2] = (0.5 * x2 - 0.5 * x) as f32;
    }
    Ok(table)
}

fn cubic_spline_table() -> Result<Vec<f32>> {
    let mut table = try_alloc("cubic spline table", SPLINE_PHASES * CUBIC_SPLINE_WIDTH, 0.0)?;
    for (phase, taps) in table.chunks_exact_mut(CUBIC_SPLINE_WIDTH).enumerate() {
        let x = phase as f64 / SPLINE_PHASES as f64;
        let x2 = x * x;
        let x3 = x2 * x;
        taps[0] = (-0.5 * x + x2 - 0.5 * x3) as f32;
        taps[1] = (1.0 - 2.5 * x2 + 1.5 * x3) as f32;
        taps[2] = (0.5 * x + 2.0 * x2 - 1.5 * x3) as f32;
        taps[3] = (-0.5 * x2 + 0.5 * x3) as f32;
    }
    Ok(table)
}

/// Zeroth-order modified Bessel function of the first kind.
fn bessel_i0(z: f64) -> f64 {
    let zz = z * z;
    let mut sum = 1.0;
    let mut term = 1.0;
    let mut d = 2.0;
    loop {
        term *= zz / (d * d);
        sum += term;
        d += 2.0;
        if term <= sum * 1e-12 {
            return sum;
        }
    }
}

fn sinc(x: f64, cutoff: f64) -> f64 {
    if x == 0.0 {
        cutoff
    } else {
        let x = x * PI;
        (cutoff * x).sin() / x
    }
}

/// Kaiser-Bessel windowed sinc, `taps` coefficients per phase.
///
/// Tap `j` of phase `p` sits at distance `(j - (taps/2 - 1)) - p/SINC_PHASES`
/// from the interpolated position.
fn sinc_table(taps: usize, kernel: usize) -> Result<Vec<f32>> {
    let (beta, cutoff) = SINC_KERNEL_CONFIG[kernel];
    let what = if taps == 8 { "8-tap sinc table" } else { "16-tap sinc table" };
    let mut table = try_alloc(what, SINC_PHASES * taps, 0.0)?;

    let center = (taps / 2 - 1) as f64;
    let half_width = (taps / 2) as f64;
    let i0_beta = bessel_i0(beta);

    for (phase, row) in table.chunks_exact_mut(taps).enumerate() {
        let offset = phase as f64 / SINC_PHASES as f64;
        for (j, coeff) in row.iter_mut().enumerate() {
            let x = (j as f64 - center) - offset;
            let n = x / half_width;
            let window = bessel_i0(beta * (1.0 - n * n).max(0.0).sqrt()) / i0_beta;
            *coeff = (sinc(x, cutoff) * window) as f32;
        }
    }
    Ok(table)
}
