//! Binaural spatializer
//!
//! Positions a stereo source at (azimuth, elevation) using the Woodworth
//! spherical-head model: the far ear receives the signal late (ITD) and
//! attenuated (ILD, head shadow), elevation scales both ears. Delays are
//! applied through per-ear ring buffers with fractional linear-interpolated
//! reads.

use hs_core::Sample;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::Processor;

/// Fixed per-ear ring buffer length in samples
pub const DELAY_BUFFER_SIZE: usize = 4096;

/// Spherical head radius in meters
const HEAD_RADIUS: f32 = 0.0875;

/// Speed of sound in m/s
const SPEED_OF_SOUND: f32 = 343.0;

/// Maximum head-shadow attenuation on the far ear
const HEAD_SHADOW: f32 = 0.6;

/// Control-thread handle for the spatializer
#[derive(Debug)]
pub struct SpatializerControl {
    enabled: AtomicBool,
}

impl SpatializerControl {
    fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

/// Binaural spatializer stage. Stereo only; other channel counts pass
/// through.
#[derive(Debug)]
pub struct Spatializer {
    control: Arc<SpatializerControl>,
    delay_left: Vec<Sample>,
    delay_right: Vec<Sample>,
    write_index: usize,
}

impl Spatializer {
    pub fn new() -> Self {
        Self {
            control: Arc::new(SpatializerControl::new()),
            delay_left: vec![0.0; DELAY_BUFFER_SIZE],
            delay_right: vec![0.0; DELAY_BUFFER_SIZE],
            write_index: 0,
        }
    }

    pub fn control(&self) -> Arc<SpatializerControl> {
        Arc::clone(&self.control)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.control.set_enabled(enabled);
    }

    /// Woodworth ITD magnitude in samples for a source at `theta` radians
    /// off center, clamped to the ring buffer.
    fn itd_samples(theta: f32, sample_rate: u32) -> f32 {
        let itd = (HEAD_RADIUS / SPEED_OF_SOUND) * (theta.sin() + theta) * sample_rate as f32;
        itd.min((DELAY_BUFFER_SIZE - 1) as f32)
    }

    /// Fractional-delay read with linear interpolation. The integer index is
    /// clamped after wrapping so numerical edge cases can never run past the
    /// buffer.
    fn read_delayed(buffer: &[Sample], write_index: usize, delay_samples: f32) -> Sample {
        let mut read_index = write_index as f32 - delay_samples;
        if read_index < 0.0 {
            read_index += DELAY_BUFFER_SIZE as f32;
        }

        let i0 = (read_index as usize).min(DELAY_BUFFER_SIZE - 1);
        let i1 = (i0 + 1) % DELAY_BUFFER_SIZE;
        let frac = read_index - read_index.floor();

        buffer[i0] * (1.0 - frac) + buffer[i1] * frac
    }

    /// Process an interleaved stereo block in place
    pub fn process(
        &mut self,
        buffer: &mut [Sample],
        frames: usize,
        channels: usize,
        azimuth: f32,
        elevation: f32,
        sample_rate: u32,
    ) {
        if !self.control.is_enabled() {
            return;
        }
        if channels != 2 || frames == 0 {
            return;
        }

        let theta = azimuth.abs();
        let itd = Self::itd_samples(theta, sample_rate);

        // The contralateral ear is delayed; the near ear is read straight.
        let (delay_left, delay_right) = if azimuth > 0.0 {
            (itd, 0.0)
        } else if azimuth < 0.0 {
            (0.0, itd)
        } else {
            (0.0, 0.0)
        };

        // Head shadow on the far ear, elevation rolloff on both
        let shadow = 1.0 - HEAD_SHADOW * theta.sin();
        let elevation_gain = elevation.cos();
        let (mut gain_left, mut gain_right) = if azimuth > 0.0 {
            (shadow, 1.0)
        } else if azimuth < 0.0 {
            (1.0, shadow)
        } else {
            (1.0, 1.0)
        };
        gain_left *= elevation_gain;
        gain_right *= elevation_gain;

        for frame in 0..frames {
            let left_in = buffer[frame * 2];
            let right_in = buffer[frame * 2 + 1];

            self.delay_left[self.write_index] = left_in;
            self.delay_right[self.write_index] = right_in;

            buffer[frame * 2] =
                Self::read_delayed(&self.delay_left, self.write_index, delay_left) * gain_left;
            buffer[frame * 2 + 1] =
                Self::read_delayed(&self.delay_right, self.write_index, delay_right) * gain_right;

            self.write_index = (self.write_index + 1) % DELAY_BUFFER_SIZE;
        }
    }
}

impl Default for Spatializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Spatializer {
    fn reset(&mut self) {
        self.delay_left.fill(0.0);
        self.delay_right.fill(0.0);
        self.write_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn impulse_block(frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0f32; frames * 2];
        buffer[0] = 1.0;
        buffer[1] = 1.0;
        buffer
    }

    #[test]
    fn test_disabled_is_bypass() {
        let mut spatializer = Spatializer::new();
        let mut buffer = impulse_block(64);
        let original = buffer.clone();
        spatializer.process(&mut buffer, 64, 2, 1.0, 0.5, 48000);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_center_source_passes_through() {
        let mut spatializer = Spatializer::new();
        spatializer.set_enabled(true);

        let mut buffer = impulse_block(64);
        spatializer.process(&mut buffer, 64, 2, 0.0, 0.0, 48000);

        assert_eq!(buffer[0], 1.0);
        assert_eq!(buffer[1], 1.0);
    }

    #[test]
    fn test_right_source_delays_and_shadows_left() {
        let mut spatializer = Spatializer::new();
        spatializer.set_enabled(true);

        let frames = 128;
        let mut buffer = impulse_block(frames);
        spatializer.process(&mut buffer, frames, 2, FRAC_PI_2, 0.0, 44100);

        // Right (near) ear: impulse at frame 0, full level
        assert!((buffer[1] - 1.0).abs() < 1e-6);

        // Left (far) ear: impulse lands around the Woodworth delay, at the
        // head-shadowed level of 1 - 0.6 = 0.4 spread over two samples by
        // the fractional read.
        let (peak_frame, peak) = (0..frames)
            .map(|f| (f, buffer[f * 2]))
            .max_by(|a, b| a.1.abs().partial_cmp(&b.1.abs()).unwrap())
            .unwrap();
        let expected_delay =
            (HEAD_RADIUS / SPEED_OF_SOUND) * (1.0 + FRAC_PI_2) * 44100.0;
        assert_eq!(peak_frame, expected_delay.ceil() as usize);
        assert!(peak > 0.2 && peak < 0.45, "far ear peak {peak}");
    }

    #[test]
    fn test_azimuth_sign_swaps_ears() {
        let frames = 256;

        let mut left_source = Spatializer::new();
        left_source.set_enabled(true);
        let mut buffer_a = impulse_block(frames);
        left_source.process(&mut buffer_a, frames, 2, -0.8, 0.0, 48000);

        let mut right_source = Spatializer::new();
        right_source.set_enabled(true);
        let mut buffer_b = impulse_block(frames);
        right_source.process(&mut buffer_b, frames, 2, 0.8, 0.0, 48000);

        for frame in 0..frames {
            assert!((buffer_a[frame * 2] - buffer_b[frame * 2 + 1]).abs() < 1e-6);
            assert!((buffer_a[frame * 2 + 1] - buffer_b[frame * 2]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_elevation_attenuates_both_ears() {
        let mut spatializer = Spatializer::new();
        spatializer.set_enabled(true);

        let mut buffer = impulse_block(8);
        spatializer.process(&mut buffer, 8, 2, 0.0, 1.0, 48000);

        let expected = 1.0f32.cos();
        assert!((buffer[0] - expected).abs() < 1e-6);
        assert!((buffer[1] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_reset_clears_delay_lines() {
        let mut spatializer = Spatializer::new();
        spatializer.set_enabled(true);

        let mut buffer = impulse_block(32);
        spatializer.process(&mut buffer, 32, 2, 1.2, 0.0, 48000);
        spatializer.reset();

        let mut silence = vec![0.0f32; 256];
        spatializer.process(&mut silence, 128, 2, 1.2, 0.0, 48000);
        assert!(silence.iter().all(|&x| x == 0.0));
    }
}
