//! Fixed-order processing chain and PCM16 marshaling
//!
//! Stage order is part of the contract and is audible:
//! crossfeed -> EQ -> spatializer -> limiter. Disabled stages are no-ops.
//!
//! The chain is owned mutably by the audio thread. The control thread gets a
//! [`ChainController`] (cloned `Arc`s over the per-stage control blocks) and
//! publishes parameter changes that become visible at the next block
//! boundary.

use hs_core::Sample;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::crossfeed::{Crossfeed, CrossfeedControl};
use crate::dynamics::{Limiter, LimiterControl};
use crate::eq::{EqControl, ParametricEq};
use crate::spatial::{Spatializer, SpatializerControl};
use crate::Processor;

/// PCM16 to float divisor
const PCM16_IN_SCALE: f32 = 32768.0;

/// Float to PCM16 multiplier
const PCM16_OUT_SCALE: f32 = 32767.0;

/// The full playback chain. One instance per host audio session.
pub struct EffectsChain {
    crossfeed: Crossfeed,
    eq: ParametricEq,
    spatializer: Spatializer,
    limiter: Limiter,

    // Reused float staging for the PCM16 path; grows, never shrinks
    scratch: Vec<Sample>,
    reset_pending: Arc<AtomicBool>,
}

impl EffectsChain {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            crossfeed: Crossfeed::new(),
            eq: ParametricEq::new(sample_rate),
            spatializer: Spatializer::new(),
            limiter: Limiter::new(),
            scratch: Vec::new(),
            reset_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build a control-thread handle for this chain
    pub fn controller(&self) -> ChainController {
        ChainController {
            crossfeed: self.crossfeed.control(),
            eq: self.eq.control(),
            spatializer: self.spatializer.control(),
            limiter: self.limiter.control(),
            reset_pending: Arc::clone(&self.reset_pending),
        }
    }

    /// Samples of delay the chain introduces (the limiter lookahead, once it
    /// has seen a block)
    pub fn latency(&self) -> usize {
        self.limiter.latency()
    }

    /// Process an interleaved stereo float block in place
    pub fn process_float(
        &mut self,
        buffer: &mut [Sample],
        azimuth: f32,
        elevation: f32,
        sample_rate: u32,
    ) {
        let frames = buffer.len() / 2;
        if frames == 0 {
            return;
        }
        let len = frames * 2;
        self.run(&mut buffer[..len], frames, 2, azimuth, elevation, sample_rate);
    }

    /// Process an interleaved PCM16 block in place: marshal to float, run
    /// the chain, clamp and truncate back
    pub fn process_pcm16(
        &mut self,
        buffer: &mut [i16],
        frames: usize,
        channels: usize,
        sample_rate: u32,
        azimuth: f32,
        elevation: f32,
    ) {
        if frames == 0 || channels == 0 {
            return;
        }
        let needed = frames * channels;
        if needed > buffer.len() {
            return;
        }

        if self.scratch.len() < needed {
            self.scratch.resize(needed, 0.0);
        }
        let mut scratch = std::mem::take(&mut self.scratch);

        for (dst, &src) in scratch.iter_mut().zip(buffer[..needed].iter()) {
            *dst = src as f32 / PCM16_IN_SCALE;
        }

        self.run(&mut scratch[..needed], frames, channels, azimuth, elevation, sample_rate);

        for (dst, &src) in buffer[..needed].iter_mut().zip(scratch.iter()) {
            *dst = (src.clamp(-1.0, 1.0) * PCM16_OUT_SCALE) as i16;
        }

        self.scratch = scratch;
    }

    fn run(
        &mut self,
        buffer: &mut [Sample],
        frames: usize,
        channels: usize,
        azimuth: f32,
        elevation: f32,
        sample_rate: u32,
    ) {
        if self.reset_pending.swap(false, Ordering::AcqRel) {
            self.reset();
        }

        self.crossfeed.process(buffer, frames, channels, sample_rate);
        self.eq.process(buffer, frames, channels, sample_rate);
        self.spatializer
            .process(buffer, frames, channels, azimuth, elevation, sample_rate);
        self.limiter.process(buffer, frames, channels, sample_rate);
    }

    /// Reset every stage's state
    pub fn reset(&mut self) {
        self.crossfeed.reset();
        self.eq.reset();
        self.spatializer.reset();
        self.limiter.reset();
    }
}

/// Cloneable control-thread handle over the chain parameters. All setters
/// are safe to call while the audio thread is processing; changes land on
/// the next block boundary.
#[derive(Clone)]
pub struct ChainController {
    crossfeed: Arc<CrossfeedControl>,
    eq: Arc<EqControl>,
    spatializer: Arc<SpatializerControl>,
    limiter: Arc<LimiterControl>,
    reset_pending: Arc<AtomicBool>,
}

impl ChainController {
    pub fn set_crossfeed_params(&self, enabled: bool, strength: f32) {
        self.crossfeed.set_params(enabled, strength);
    }

    pub fn set_eq_enabled(&self, enabled: bool) {
        self.eq.set_enabled(enabled);
    }

    pub fn set_eq_band(&self, band: usize, gain_db: f32) {
        self.eq.set_band_gain(band, gain_db);
    }

    pub fn set_spatializer_enabled(&self, enabled: bool) {
        self.spatializer.set_enabled(enabled);
    }

    pub fn set_limiter_enabled(&self, enabled: bool) {
        self.limiter.set_enabled(enabled);
    }

    pub fn set_limiter_params(
        &self,
        threshold_db: f32,
        ratio: f32,
        attack_ms: f32,
        release_ms: f32,
        makeup_db: f32,
    ) {
        self.limiter
            .set_params(threshold_db, ratio, attack_ms, release_ms, makeup_db);
    }

    pub fn set_limiter_balance(&self, balance: f32) {
        self.limiter.set_balance(balance);
    }

    /// Schedule a full state reset, applied by the audio thread at the next
    /// block boundary
    pub fn reset(&self) {
        self.reset_pending.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_disabled_is_bit_identical() {
        let mut chain = EffectsChain::new(48000);

        let mut buffer = vec![0.2f32; 480 * 2];
        let original = buffer.clone();
        chain.process_float(&mut buffer, 0.0, 0.0, 48000);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_pcm16_round_trip_within_one_lsb() {
        let mut chain = EffectsChain::new(48000);

        let mut buffer: Vec<i16> = (0..960)
            .map(|i| ((i as i32 * 37 % 65536) - 32768) as i16)
            .collect();
        let original = buffer.clone();
        chain.process_pcm16(&mut buffer, 480, 2, 48000, 0.0, 0.0);

        for (out, orig) in buffer.iter().zip(original.iter()) {
            assert!((*out as i32 - *orig as i32).abs() <= 1, "{out} vs {orig}");
        }
    }

    #[test]
    fn test_scratch_grows_and_never_shrinks() {
        let mut chain = EffectsChain::new(48000);

        let mut large = vec![0i16; 4096 * 2];
        chain.process_pcm16(&mut large, 4096, 2, 48000, 0.0, 0.0);
        let grown = chain.scratch.len();
        assert_eq!(grown, 4096 * 2);

        let mut small = vec![0i16; 128 * 2];
        chain.process_pcm16(&mut small, 128, 2, 48000, 0.0, 0.0);
        assert_eq!(chain.scratch.len(), grown);
    }

    #[test]
    fn test_short_buffer_is_ignored() {
        let mut chain = EffectsChain::new(48000);
        let mut buffer = vec![1000i16; 16];
        let original = buffer.clone();
        chain.process_pcm16(&mut buffer, 480, 2, 48000, 0.0, 0.0);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_controller_reset_applies_on_next_block() {
        let mut chain = EffectsChain::new(48000);
        let controller = chain.controller();
        controller.set_limiter_enabled(true);

        let mut loud = vec![0.9f32; 2048];
        chain.process_float(&mut loud, 0.0, 0.0, 48000);

        controller.reset();

        let mut silence = vec![0.0f32; 2048];
        chain.process_float(&mut silence, 0.0, 0.0, 48000);
        assert!(silence.iter().all(|&x| x == 0.0));
    }
}
