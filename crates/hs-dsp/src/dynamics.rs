//! Lookahead peak limiter
//!
//! Peak limiter with makeup gain, stereo balance, envelope smoothing and a
//! soft clipper. The signal path is delayed by 5 ms so the gain computer
//! sees peaks before they reach the output. Makeup and balance are applied
//! ahead of detection so boosted peaks are still caught.

use hs_core::{Decibels, Sample, MAX_CHANNELS};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::Processor;

/// Lookahead window
pub const LOOKAHEAD_MS: f32 = 5.0;

/// One-pole smoothing weight for the applied gain (zipper-noise suppression)
const GAIN_SMOOTHING: f32 = 0.95;

/// Third-order soft clip coefficient
const SOFT_CLIP_CUBIC: f32 = 0.1481;

/// Limiter parameter group, updated together under the control mutex
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimiterParams {
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub makeup_db: f32,
    /// -1.0 (full left) to 1.0 (full right), 0.0 centered
    pub balance: f32,
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self {
            threshold_db: -0.1,
            ratio: 20.0,
            attack_ms: 0.1,
            release_ms: 100.0,
            makeup_db: 0.0,
            balance: 0.0,
        }
    }
}

/// Control-thread handle for the limiter
#[derive(Debug)]
pub struct LimiterControl {
    enabled: AtomicBool,
    params: Mutex<LimiterParams>,
    generation: AtomicU64,
    reset_pending: AtomicBool,
}

impl LimiterControl {
    fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            params: Mutex::new(LimiterParams::default()),
            generation: AtomicU64::new(0),
            reset_pending: AtomicBool::new(false),
        }
    }

    /// Toggle the limiter. Disabling also schedules a state reset so the
    /// envelope and lookahead buffer come back clean on re-enable.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        if !enabled {
            self.reset_pending.store(true, Ordering::Release);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Update the gain computer parameters. Balance is left untouched.
    pub fn set_params(
        &self,
        threshold_db: f32,
        ratio: f32,
        attack_ms: f32,
        release_ms: f32,
        makeup_db: f32,
    ) {
        {
            let mut params = self.params.lock();
            params.threshold_db = threshold_db;
            params.ratio = ratio;
            params.attack_ms = attack_ms;
            params.release_ms = release_ms;
            params.makeup_db = makeup_db;
        }
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Set the stereo balance, clamped to [-1, 1]
    pub fn set_balance(&self, balance: f32) {
        self.params.lock().balance = balance.clamp(-1.0, 1.0);
        self.generation.fetch_add(1, Ordering::Release);
    }

    pub fn params(&self) -> LimiterParams {
        *self.params.lock()
    }
}

/// Lookahead peak limiter stage. Handles up to `MAX_CHANNELS` interleaved
/// channels; channels beyond the limit pass through.
#[derive(Debug)]
pub struct Limiter {
    control: Arc<LimiterControl>,

    // Snapshot of the control parameters and derived quantities
    threshold: f32,
    ratio: f32,
    makeup: f32,
    attack_ms: f32,
    release_ms: f32,
    attack_coeff: f32,
    release_coeff: f32,
    balance_gain_left: f32,
    balance_gain_right: f32,
    seen_generation: u64,

    // Runtime state
    envelope: f32,
    smoothed_gain: f32,
    delay_buffer: Vec<Sample>,
    delay_write_index: usize,
    delay_frames: usize,
    sample_rate: u32,
    channels: usize,
}

impl Limiter {
    pub fn new() -> Self {
        let control = Arc::new(LimiterControl::new());
        let params = control.params();

        let mut limiter = Self {
            control,
            threshold: Decibels(params.threshold_db).to_gain(),
            ratio: params.ratio,
            makeup: Decibels(params.makeup_db).to_gain(),
            attack_ms: params.attack_ms,
            release_ms: params.release_ms,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            balance_gain_left: 1.0,
            balance_gain_right: 1.0,
            seen_generation: 0,
            envelope: 0.0,
            smoothed_gain: 1.0,
            delay_buffer: Vec::new(),
            delay_write_index: 0,
            delay_frames: 0,
            sample_rate: 0,
            channels: 0,
        };
        limiter.apply_params(params);
        limiter
    }

    pub fn control(&self) -> Arc<LimiterControl> {
        Arc::clone(&self.control)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.control.set_enabled(enabled);
    }

    fn apply_params(&mut self, params: LimiterParams) {
        self.threshold = Decibels(params.threshold_db).to_gain();
        self.ratio = params.ratio;
        self.makeup = Decibels(params.makeup_db).to_gain();
        self.attack_ms = params.attack_ms;
        self.release_ms = params.release_ms;
        self.balance_gain_left = 1.0 - params.balance.max(0.0);
        self.balance_gain_right = 1.0 + params.balance.min(0.0);
        self.update_coefficients();
    }

    fn update_coefficients(&mut self) {
        if self.sample_rate == 0 {
            return;
        }
        let attack_samples = self.attack_ms * self.sample_rate as f32 / 1000.0;
        let release_samples = self.release_ms * self.sample_rate as f32 / 1000.0;

        self.attack_coeff = if attack_samples < 1.0 {
            0.0
        } else {
            (-1.0 / attack_samples).exp()
        };
        self.release_coeff = if release_samples < 1.0 {
            0.0
        } else {
            (-1.0 / release_samples).exp()
        };
    }

    fn reallocate(&mut self, sample_rate: u32, channels: usize) {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self.delay_frames =
            ((LOOKAHEAD_MS * sample_rate as f32 / 1000.0).round() as usize).max(1);
        self.delay_buffer = vec![0.0; self.delay_frames * channels];
        self.delay_write_index = 0;
        self.update_coefficients();
        log::debug!(
            "limiter delay buffer sized for {} Hz, {} channels ({} frames)",
            sample_rate,
            channels,
            self.delay_frames
        );
    }

    fn reset_state(&mut self) {
        self.envelope = 0.0;
        self.smoothed_gain = 1.0;
        self.delay_buffer.fill(0.0);
        self.delay_write_index = 0;
    }

    #[inline]
    fn soft_clip(raw: Sample) -> Sample {
        if raw.abs() > 1.5 {
            raw.clamp(-1.0, 1.0)
        } else {
            (raw - SOFT_CLIP_CUBIC * raw * raw * raw).clamp(-1.0, 1.0)
        }
    }

    /// Process an interleaved block in place
    pub fn process(&mut self, buffer: &mut [Sample], frames: usize, channels: usize, sample_rate: u32) {
        if self.control.reset_pending.swap(false, Ordering::AcqRel) {
            self.reset_state();
        }
        if !self.control.is_enabled() {
            return;
        }
        if frames == 0 || channels == 0 {
            return;
        }

        let generation = self.control.generation.load(Ordering::Acquire);
        if generation != self.seen_generation {
            let params = self.control.params();
            self.apply_params(params);
            self.seen_generation = generation;
        }
        if sample_rate != self.sample_rate || channels != self.channels {
            self.reallocate(sample_rate, channels);
        }

        let active = channels.min(MAX_CHANNELS);
        let mut frame_values = [0.0f32; MAX_CHANNELS];

        for frame in 0..frames {
            let base = frame * channels;

            // Makeup and balance ahead of detection
            let mut peak = 0.0f32;
            for ch in 0..active {
                let mut value = buffer[base + ch] * self.makeup;
                if ch == 0 {
                    value *= self.balance_gain_left;
                } else if ch == 1 {
                    value *= self.balance_gain_right;
                }
                frame_values[ch] = value;
                peak = peak.max(value.abs());
            }

            // Peak envelope follower
            let coeff = if peak > self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = coeff * self.envelope + (1.0 - coeff) * peak;

            // Gain computer, in the dB domain above threshold
            let mut gain = 1.0f32;
            if self.envelope > self.threshold {
                let envelope_db = 20.0 * (self.envelope + 1e-6).log10();
                let threshold_db = 20.0 * (self.threshold + 1e-6).log10();
                let reduction_db = (envelope_db - threshold_db) * (1.0 / self.ratio - 1.0);
                gain = 10.0_f32.powf(reduction_db / 20.0);
            }

            self.smoothed_gain =
                GAIN_SMOOTHING * self.smoothed_gain + (1.0 - GAIN_SMOOTHING) * gain;

            // Swap through the lookahead buffer, then gain and clip
            for ch in 0..active {
                let position = self.delay_write_index * channels + ch;
                let delayed = self.delay_buffer[position];
                self.delay_buffer[position] = frame_values[ch];

                buffer[base + ch] = Self::soft_clip(delayed * self.smoothed_gain);
            }

            self.delay_write_index += 1;
            if self.delay_write_index >= self.delay_frames {
                self.delay_write_index = 0;
            }
        }
    }
}

impl Default for Limiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Limiter {
    fn reset(&mut self) {
        self.reset_state();
    }

    fn latency(&self) -> usize {
        self.delay_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_block(frames: usize, freq: f32, amplitude: f32, sample_rate: u32) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let t = i as f32 / sample_rate as f32;
                let v = (2.0 * std::f32::consts::PI * freq * t).sin() * amplitude;
                [v, v]
            })
            .collect()
    }

    #[test]
    fn test_disabled_is_bypass() {
        let mut limiter = Limiter::new();
        let mut buffer = sine_block(480, 1000.0, 2.0, 48000);
        let original = buffer.clone();
        limiter.process(&mut buffer, 480, 2, 48000);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_output_bounded() {
        let mut limiter = Limiter::new();
        limiter.set_enabled(true);
        limiter
            .control()
            .set_params(-0.1, 20.0, 0.1, 100.0, 0.0);

        let frames = 48000;
        let mut buffer = sine_block(frames, 1000.0, 2.0, 48000);
        limiter.process(&mut buffer, frames, 2, 48000);

        // Every sample is clamped, the first 5 ms included
        for &sample in &buffer {
            assert!(sample.abs() <= 1.0, "sample {sample} out of range");
        }
    }

    #[test]
    fn test_loud_input_is_reduced() {
        let mut limiter = Limiter::new();
        limiter.set_enabled(true);
        limiter.control().set_params(-6.0, 20.0, 0.1, 50.0, 0.0);

        let frames = 48000;
        let mut buffer = sine_block(frames, 440.0, 1.0, 48000);
        limiter.process(&mut buffer, frames, 2, 48000);

        // Steady state should sit near the -6 dB threshold, well below 1.0
        let tail_peak = buffer[frames..]
            .iter()
            .fold(0.0f32, |m, &x| m.max(x.abs()));
        assert!(tail_peak < 0.75, "tail peak {tail_peak}");
        assert!(tail_peak > 0.3);
    }

    #[test]
    fn test_makeup_gain_applied() {
        let mut limiter = Limiter::new();
        limiter.set_enabled(true);
        limiter.control().set_params(0.0, 1.0, 0.1, 100.0, 6.0);

        let frames = 4800;
        let mut buffer = sine_block(frames, 440.0, 0.1, 48000);
        limiter.process(&mut buffer, frames, 2, 48000);

        let peak = buffer.iter().fold(0.0f32, |m, &x| m.max(x.abs()));
        let expected = 0.1 * Decibels(6.0).to_gain();
        assert!((peak - expected).abs() < 0.02, "peak {peak}");
    }

    #[test]
    fn test_balance_attenuates_one_side() {
        let mut limiter = Limiter::new();
        limiter.set_enabled(true);
        limiter.control().set_params(0.0, 1.0, 0.1, 100.0, 0.0);
        limiter.control().set_balance(1.0);

        let frames = 2400;
        let mut buffer = sine_block(frames, 440.0, 0.5, 48000);
        limiter.process(&mut buffer, frames, 2, 48000);

        // Full right balance mutes the left channel
        for frame in 0..frames {
            assert_eq!(buffer[frame * 2], 0.0);
        }
        let right_peak = (0..frames).fold(0.0f32, |m, f| m.max(buffer[f * 2 + 1].abs()));
        assert!(right_peak > 0.4);
    }

    #[test]
    fn test_disable_resets_state() {
        let mut limiter = Limiter::new();
        limiter.set_enabled(true);

        let mut buffer = sine_block(4800, 440.0, 2.0, 48000);
        limiter.process(&mut buffer, 4800, 2, 48000);

        limiter.set_enabled(false);
        limiter.set_enabled(true);

        let mut silence = vec![0.0f32; 9600];
        limiter.process(&mut silence, 4800, 2, 48000);
        assert!(silence.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_soft_clip_regions() {
        assert_eq!(Limiter::soft_clip(2.0), 1.0);
        assert_eq!(Limiter::soft_clip(-2.0), -1.0);
        let mid = Limiter::soft_clip(1.0);
        assert!((mid - (1.0 - SOFT_CLIP_CUBIC)).abs() < 1e-6);
        assert_eq!(Limiter::soft_clip(0.0), 0.0);
    }
}
