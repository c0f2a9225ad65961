//! Headphone crossfeed
//!
//! Feeds a short-delayed, low-passed copy of the opposite channel into each
//! ear, approximating the acoustic path around the head that headphones
//! remove. The opposite channel is delayed by ~300 us and rolled off with a
//! one-pole low-pass at 700 Hz before mixing.

use hs_core::{AtomicParam, Sample};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::Processor;

/// Fixed delay line length in samples
pub const DELAY_BUFFER_SIZE: usize = 128;

/// Opposite-channel path delay
const DELAY_SECONDS: f32 = 300e-6;

/// Head-shadow low-pass corner
const LOWPASS_HZ: f32 = 700.0;

/// Control-thread handle for the crossfeed parameters
#[derive(Debug)]
pub struct CrossfeedControl {
    enabled: AtomicBool,
    strength: AtomicParam,
}

impl CrossfeedControl {
    fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            strength: AtomicParam::new(0.15),
        }
    }

    /// Update both parameters. Strength is clamped to [0, 1].
    pub fn set_params(&self, enabled: bool, strength: f32) {
        self.strength.set(strength.clamp(0.0, 1.0));
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn strength(&self) -> f32 {
        self.strength.get()
    }
}

/// Crossfeed stage. Stereo only; other channel counts pass through.
#[derive(Debug)]
pub struct Crossfeed {
    control: Arc<CrossfeedControl>,

    delay_left: [Sample; DELAY_BUFFER_SIZE],
    delay_right: [Sample; DELAY_BUFFER_SIZE],
    write_index: usize,
    delay_samples: usize,

    // One-pole low-pass state per feed direction
    lowpass_to_left: Sample,
    lowpass_to_right: Sample,
    lowpass_a0: f32,
    lowpass_b1: f32,

    sample_rate: u32,
}

impl Crossfeed {
    pub fn new() -> Self {
        Self {
            control: Arc::new(CrossfeedControl::new()),
            delay_left: [0.0; DELAY_BUFFER_SIZE],
            delay_right: [0.0; DELAY_BUFFER_SIZE],
            write_index: 0,
            delay_samples: 0,
            lowpass_to_left: 0.0,
            lowpass_to_right: 0.0,
            lowpass_a0: 0.0,
            lowpass_b1: 0.0,
            sample_rate: 0,
        }
    }

    pub fn control(&self) -> Arc<CrossfeedControl> {
        Arc::clone(&self.control)
    }

    /// Convenience setter forwarding to the control block
    pub fn set_params(&self, enabled: bool, strength: f32) {
        self.control.set_params(enabled, strength);
    }

    fn configure(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.delay_samples = ((DELAY_SECONDS * sample_rate as f32).round() as usize)
            .min(DELAY_BUFFER_SIZE - 1);
        let x = (-2.0 * std::f32::consts::PI * LOWPASS_HZ / sample_rate as f32).exp();
        self.lowpass_a0 = 1.0 - x;
        self.lowpass_b1 = x;
        self.clear_state();
    }

    fn clear_state(&mut self) {
        self.delay_left = [0.0; DELAY_BUFFER_SIZE];
        self.delay_right = [0.0; DELAY_BUFFER_SIZE];
        self.write_index = 0;
        self.lowpass_to_left = 0.0;
        self.lowpass_to_right = 0.0;
    }

    /// Process an interleaved block in place
    pub fn process(&mut self, buffer: &mut [Sample], frames: usize, channels: usize, sample_rate: u32) {
        if !self.control.is_enabled() {
            return;
        }
        if channels != 2 || frames == 0 {
            return;
        }
        if sample_rate != self.sample_rate {
            self.configure(sample_rate);
        }

        let strength = self.control.strength();
        let dry = 1.0 - 0.5 * strength;
        let read_offset = DELAY_BUFFER_SIZE - self.delay_samples;

        for frame in 0..frames {
            let left_in = buffer[frame * 2];
            let right_in = buffer[frame * 2 + 1];

            self.delay_left[self.write_index] = left_in;
            self.delay_right[self.write_index] = right_in;

            let read_index = (self.write_index + read_offset) % DELAY_BUFFER_SIZE;
            let left_delayed = self.delay_left[read_index];
            let right_delayed = self.delay_right[read_index];

            self.lowpass_to_left =
                self.lowpass_a0 * right_delayed + self.lowpass_b1 * self.lowpass_to_left;
            self.lowpass_to_right =
                self.lowpass_a0 * left_delayed + self.lowpass_b1 * self.lowpass_to_right;

            buffer[frame * 2] = left_in * dry + self.lowpass_to_left * strength;
            buffer[frame * 2 + 1] = right_in * dry + self.lowpass_to_right * strength;

            self.write_index = (self.write_index + 1) % DELAY_BUFFER_SIZE;
        }
    }
}

impl Default for Crossfeed {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Crossfeed {
    fn reset(&mut self) {
        self.clear_state();
    }
}
