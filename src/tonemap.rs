//! Percentile-based global tone mapping.
//!
//! One exposure scale is chosen per image so that a given percentile of the
//! (gamma-corrected) sample values lands on `max_mapping`. A single global
//! scale keeps the operator deterministic and order-independent across a
//! dataset. The percentile is taken over strictly positive samples only:
//! probe renders have large constant-zero background regions that would
//! otherwise drag the percentile to zero.

use crate::error::{ProbeError, ProbeResult};
use crate::hdr::HdrImage;

/// Guards the exposure division against a zero-valued percentile.
const SCALE_EPSILON: f32 = 1e-10;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToneMapParams {
    /// Display gamma applied as `v^(1/gamma)` before scaling.
    pub gamma: f32,
    /// Percentile of positive samples mapped to `max_mapping`, in (0, 100].
    pub percentile: f32,
    /// Target display value for the chosen percentile.
    pub max_mapping: f32,
}

impl ToneMapParams {
    pub fn validate(&self) -> ProbeResult<()> {
        if !(self.gamma > 0.0) {
            return Err(ProbeError::config("tone-map gamma must be positive"));
        }
        if !(self.percentile > 0.0 && self.percentile <= 100.0) {
            return Err(ProbeError::config(
                "tone-map percentile must lie in (0, 100]",
            ));
        }
        if !(self.max_mapping > 0.0) {
            return Err(ProbeError::config("tone-map max_mapping must be positive"));
        }
        Ok(())
    }
}

impl Default for ToneMapParams {
    fn default() -> Self {
        Self {
            gamma: 2.4,
            percentile: 97.5,
            max_mapping: 0.9,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ToneMapResult {
    /// Tone-mapped samples clamped to [0, 1]. When `clip` was false this is
    /// simply a copy of `unclipped` (kept for parity with the scaled output;
    /// callers that disable clipping get unbounded values in both fields).
    pub clipped: HdrImage,
    /// The exposure scale that was applied. Always positive.
    pub scale: f32,
    /// Tone-mapped samples without range clamping.
    pub unclipped: HdrImage,
}

#[derive(Clone, Copy, Debug)]
pub struct ToneMapper {
    params: ToneMapParams,
}

impl ToneMapper {
    pub fn new(params: ToneMapParams) -> ProbeResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> ToneMapParams {
        self.params
    }

    /// Tone-map one HDR image.
    ///
    /// `explicit_scale` overrides the percentile-derived exposure, letting a
    /// caller reuse one exposure across related images. `apply_gamma` first
    /// raises samples to `1/gamma` (callers are expected to supply
    /// non-negative HDR input; negative bases yield NaN and are treated as
    /// garbage-in).
    pub fn apply(
        &self,
        image: &HdrImage,
        clip: bool,
        explicit_scale: Option<f32>,
        apply_gamma: bool,
    ) -> ToneMapResult {
        let powered = if apply_gamma {
            let inv_gamma = 1.0 / self.params.gamma;
            image.map(|v| v.powf(inv_gamma))
        } else {
            image.clone()
        };

        let scale = match explicit_scale {
            Some(scale) => scale,
            None => {
                let reference = positive_percentile(powered.samples(), self.params.percentile);
                // An all-non-positive image would make the reference negative
                // and flip the exposure sign; floor it at zero so the epsilon
                // keeps the scale finite and positive.
                self.params.max_mapping / (reference.max(0.0) + SCALE_EPSILON)
            }
        };

        let unclipped = powered.map(|v| v * scale);
        let clipped = if clip {
            unclipped.map(|v| v.clamp(0.0, 1.0))
        } else {
            unclipped.clone()
        };

        ToneMapResult {
            clipped,
            scale,
            unclipped,
        }
    }
}

/// Percentile over the strictly positive subset of `samples`, falling back to
/// the full set when nothing is positive. Linear interpolation between the
/// two nearest ranks, matching the common statistics-library definition.
fn positive_percentile(samples: &[f32], pct: f32) -> f32 {
    let positive: Vec<f32> = samples.iter().copied().filter(|&v| v > 0.0).collect();
    if positive.is_empty() {
        percentile(samples, pct)
    } else {
        percentile(&positive, pct)
    }
}

fn percentile(samples: &[f32], pct: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f32::total_cmp);

    let rank = (f64::from(pct) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = (rank - lo as f64) as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
