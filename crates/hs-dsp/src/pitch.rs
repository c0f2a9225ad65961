//! Dual delay-line pitch shifter
//!
//! Shifts pitch by sliding two read taps through a delay line at a rate
//! proportional to the pitch ratio, crossfading between them with a
//! triangular window as each tap wraps. Smoother than naive resampling for
//! moderate shifts. Not part of the playback chain; hosts that expose a
//! pitch control run it between the EQ and the spatializer.

use hs_core::{AtomicParam, Sample};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::Processor;

/// Tap wander window in frames
const WANDER_WINDOW: f32 = 4096.0;

/// Delay line capacity in frames (stereo interleaved)
const BUFFER_FRAMES: usize = 8192;

/// Ratios this close to unity bypass the shifter entirely
const UNITY_EPSILON: f32 = 0.01;

/// Control-thread handle for the pitch shifter
#[derive(Debug)]
pub struct PitchShifterControl {
    enabled: AtomicBool,
    ratio: AtomicParam,
}

impl PitchShifterControl {
    fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            ratio: AtomicParam::new(1.0),
        }
    }

    /// Set the pitch ratio, clamped to [0.1, 5.0]. Ratios within 0.01 of
    /// unity disable processing.
    pub fn set_ratio(&self, ratio: f32) {
        let clamped = ratio.clamp(0.1, 5.0);
        self.ratio.set(clamped);
        self.enabled
            .store((clamped - 1.0).abs() > UNITY_EPSILON, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn ratio(&self) -> f32 {
        self.ratio.get()
    }
}

/// Pitch shifter for mono or stereo blocks
#[derive(Debug)]
pub struct PitchShifter {
    control: Arc<PitchShifterControl>,
    delay_buffer: Vec<Sample>,
    write_index: usize,
    tap_a: f32,
    tap_b: f32,
}

impl PitchShifter {
    pub fn new() -> Self {
        Self {
            control: Arc::new(PitchShifterControl::new()),
            delay_buffer: vec![0.0; BUFFER_FRAMES * 2],
            write_index: 0,
            tap_a: 0.0,
            tap_b: WANDER_WINDOW / 2.0,
        }
    }

    pub fn control(&self) -> Arc<PitchShifterControl> {
        Arc::clone(&self.control)
    }

    pub fn set_ratio(&self, ratio: f32) {
        self.control.set_ratio(ratio);
    }

    fn read_delayed(&self, channel: usize, offset: f32, channels: usize) -> Sample {
        let buffer_frames = self.delay_buffer.len() / channels;
        let mut read_index = self.write_index as f32 - offset;
        while read_index < 0.0 {
            read_index += buffer_frames as f32;
        }

        let i0 = (read_index as usize) % buffer_frames;
        let i1 = (i0 + 1) % buffer_frames;
        let frac = read_index - read_index.floor();

        let v0 = self.delay_buffer[i0 * channels + channel];
        let v1 = self.delay_buffer[i1 * channels + channel];
        v0 + frac * (v1 - v0)
    }

    /// Process an interleaved block in place. Rejects more than two
    /// channels.
    pub fn process(&mut self, buffer: &mut [Sample], frames: usize, channels: usize) {
        if !self.control.is_enabled() {
            return;
        }
        if channels == 0 || channels > 2 || frames == 0 {
            return;
        }

        let ratio = self.control.ratio();
        let rate = 1.0 - ratio;
        let buffer_frames = self.delay_buffer.len() / channels;
        let half_window = WANDER_WINDOW / 2.0;

        for frame in 0..frames {
            // Triangular crossfade as tap A sweeps the wander window
            let crossfade = (self.tap_a - half_window).abs() / half_window;

            for ch in 0..channels {
                let input = buffer[frame * channels + ch];
                self.delay_buffer[self.write_index * channels + ch] = input;

                let out_a = self.read_delayed(ch, self.tap_a, channels);
                let out_b = self.read_delayed(ch, self.tap_b, channels);

                buffer[frame * channels + ch] = out_a * (1.0 - crossfade) + out_b * crossfade;
            }

            self.tap_a += rate;
            while self.tap_a >= WANDER_WINDOW {
                self.tap_a -= WANDER_WINDOW;
            }
            while self.tap_a < 0.0 {
                self.tap_a += WANDER_WINDOW;
            }
            self.tap_b = self.tap_a + half_window;
            while self.tap_b >= WANDER_WINDOW {
                self.tap_b -= WANDER_WINDOW;
            }

            self.write_index = (self.write_index + 1) % buffer_frames;
        }
    }
}

impl Default for PitchShifter {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for PitchShifter {
    fn reset(&mut self) {
        self.delay_buffer.fill(0.0);
        self.write_index = 0;
        self.tap_a = 0.0;
        self.tap_b = WANDER_WINDOW / 2.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_ratio_is_bypass() {
        let mut shifter = PitchShifter::new();
        shifter.set_ratio(1.0);

        let mut buffer: Vec<f32> = (0..256).map(|i| ((i as f32) * 0.1).sin()).collect();
        let original = buffer.clone();
        shifter.process(&mut buffer, 128, 2);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_ratio_clamped() {
        let shifter = PitchShifter::new();
        shifter.set_ratio(100.0);
        assert_eq!(shifter.control().ratio(), 5.0);
        shifter.set_ratio(0.0);
        assert_eq!(shifter.control().ratio(), 0.1);
    }

    #[test]
    fn test_rejects_more_than_two_channels() {
        let mut shifter = PitchShifter::new();
        shifter.set_ratio(1.5);

        let mut buffer = vec![0.5f32; 4 * 64];
        let original = buffer.clone();
        shifter.process(&mut buffer, 64, 4);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_shifted_output_is_finite_and_nonzero() {
        let mut shifter = PitchShifter::new();
        shifter.set_ratio(1.5);

        let frames = 8192;
        let mut buffer: Vec<f32> = (0..frames * 2)
            .map(|i| ((i as f32) * 0.02).sin() * 0.5)
            .collect();
        shifter.process(&mut buffer, frames, 2);

        assert!(buffer.iter().all(|x| x.is_finite()));
        let peak = buffer[frames..].iter().fold(0.0f32, |m, &x| m.max(x.abs()));
        assert!(peak > 0.05);
    }

    #[test]
    fn test_reset_clears_buffer() {
        let mut shifter = PitchShifter::new();
        shifter.set_ratio(2.0);

        let mut buffer = vec![0.7f32; 1024];
        shifter.process(&mut buffer, 512, 2);
        shifter.reset();

        let mut silence = vec![0.0f32; 1024];
        shifter.process(&mut silence, 512, 2);
        assert!(silence.iter().all(|&x| x == 0.0));
    }
}
