//! hs-dsp: Headphone playback processing chain
//!
//! Realtime post-processing for interleaved PCM blocks, applied in place on
//! the host's audio callback thread.
//!
//! ## DSP Modules
//! - `biquad` - Direct Form I biquad (low shelf, peaking, high shelf)
//! - `crossfeed` - Headphone crossfeed (delayed, low-passed opposite channel)
//! - `eq` - 10-band parametric EQ on ISO octave centers
//! - `spatial` - Binaural spatializer (Woodworth ITD + head shadow)
//! - `dynamics` - Lookahead peak limiter with makeup, balance, soft clip
//! - `pitch` - Dual delay-line pitch shifter (not wired into the chain)
//!
//! ## Chain
//! - `chain` - Fixed-order stage pipeline plus PCM16 marshaling
//!
//! Control-thread parameter updates go through the per-stage control blocks
//! (atomics plus short mutex snapshots); the audio thread owns the chain
//! mutably and never allocates outside of sample-rate changes.

pub mod biquad;
pub mod chain;
pub mod crossfeed;
pub mod dynamics;
pub mod eq;
pub mod pitch;
pub mod spatial;

pub use biquad::{Biquad, BiquadCoeffs, FilterType};
pub use chain::{ChainController, EffectsChain};
pub use crossfeed::Crossfeed;
pub use dynamics::{Limiter, LimiterParams};
pub use eq::ParametricEq;
pub use pitch::PitchShifter;
pub use spatial::Spatializer;

/// Trait for all chain stages
pub trait Processor {
    /// Reset processor state
    fn reset(&mut self);

    /// Get latency in samples
    fn latency(&self) -> usize {
        0
    }
}
