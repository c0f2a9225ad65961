//! hs-core: Shared types and utilities for HeadStage
//!
//! This crate provides the foundational types used across the HeadStage
//! crates: the sample type, channel limits, decibel conversions, and the
//! atomic parameter cell used for lock-free control updates.

mod params;
mod sample;

pub use params::*;
pub use sample::*;

/// Decibel value wrapper
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Decibels(pub f32);

impl Decibels {
    pub const ZERO: Self = Self(0.0);
    pub const NEG_INF: Self = Self(f32::NEG_INFINITY);

    #[inline]
    pub fn from_gain(gain: f32) -> Self {
        if gain <= 0.0 {
            Self::NEG_INF
        } else {
            Self(20.0 * gain.log10())
        }
    }

    #[inline]
    pub fn to_gain(self) -> f32 {
        if self.0 <= -144.0 {
            0.0
        } else {
            10.0_f32.powf(self.0 / 20.0)
        }
    }
}

impl Default for Decibels {
    fn default() -> Self {
        Self::ZERO
    }
}
