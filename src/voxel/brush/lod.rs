//! Carve resolution from stone scale
//!
//! When the stone is shrunk below its initial scale the user cannot see
//! single cells, so carving samples a coarser grid. At or above the initial
//! scale every cell is sampled (stride 1); below it the stride climbs from
//! `finest_reduced_stride` to `coarsest_stride` as the scale drops to
//! `min_scale_ratio` of the initial one.

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

/// Largest stride the carving engine accepts
pub const MAX_STRIDE: u32 = 6;

/// Parameters of the scale -> stride curve
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    /// Scale ratio at which the stride saturates
    pub min_scale_ratio: f32,
    /// Stride just below the initial scale
    pub finest_reduced_stride: u32,
    /// Stride at or below `min_scale_ratio`
    pub coarsest_stride: u32,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            min_scale_ratio: 0.25,
            finest_reduced_stride: 2,
            coarsest_stride: MAX_STRIDE,
        }
    }
}

impl LodConfig {
    /// Stride for the current stone scale
    pub fn stride_for_scale(&self, scale: f32, initial_scale: f32) -> u32 {
        if !(initial_scale > 0.0) || scale >= initial_scale {
            return 1;
        }
        let min_scale = initial_scale * self.min_scale_ratio;
        let clamped = scale.clamp(min_scale, initial_scale);
        let t = (clamped - min_scale) / (initial_scale - min_scale);
        let coarse = self.coarsest_stride as f32;
        let fine = self.finest_reduced_stride as f32;
        let stride = (coarse + (fine - coarse) * t).round_ties_even() as u32;
        stride.clamp(self.finest_reduced_stride, self.coarsest_stride)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min_scale_ratio > 0.0 && self.min_scale_ratio < 1.0) {
            return Err(Error::Config(format!(
                "min_scale_ratio {} outside (0, 1)",
                self.min_scale_ratio
            )));
        }
        if self.finest_reduced_stride < 1
            || self.finest_reduced_stride > self.coarsest_stride
            || self.coarsest_stride > MAX_STRIDE
        {
            return Err(Error::Config(format!(
                "stride range {}..={} must lie within 1..={MAX_STRIDE}",
                self.finest_reduced_stride, self.coarsest_stride
            )));
        }
        Ok(())
    }
}

/// Stride using the default curve
pub fn stride_for_scale(scale: f32, initial_scale: f32) -> u32 {
    LodConfig::default().stride_for_scale(scale, initial_scale)
}
