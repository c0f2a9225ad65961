//! Biquad filter implementation using Direct Form I
//!
//! DF-I keeps two past inputs and two past outputs per channel, which lets a
//! single filter instance run coherently over interleaved multi-channel
//! blocks. Coefficients follow the RBJ audio EQ cookbook and are stored
//! post-normalization (divided by a0).

use hs_core::{Sample, MAX_CHANNELS};
use std::f32::consts::PI;

use crate::Processor;

/// Biquad filter types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    LowShelf,
    Peaking,
    HighShelf,
}

/// Normalized biquad coefficients
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoeffs {
    /// Calculate low shelf filter coefficients
    pub fn low_shelf(freq: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha);
        let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega);
        let b2 = a * ((a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha);
        let a0 = (a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha;
        let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega);
        let a2 = (a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Calculate peaking EQ filter coefficients
    pub fn peaking(freq: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_omega;
        let b2 = 1.0 - alpha * a;
        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha / a;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Calculate high shelf filter coefficients
    pub fn high_shelf(freq: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha);
        let a0 = (a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_omega);
        let a2 = (a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Bypass (unity gain, no filtering)
    pub fn bypass() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    fn compute(filter_type: FilterType, freq: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        match filter_type {
            FilterType::LowShelf => Self::low_shelf(freq, q, gain_db, sample_rate),
            FilterType::Peaking => Self::peaking(freq, q, gain_db, sample_rate),
            FilterType::HighShelf => Self::high_shelf(freq, q, gain_db, sample_rate),
        }
    }
}

/// Gain changes below this threshold do not trigger a coefficient update,
/// which keeps UI slider jitter from churning the filter.
const GAIN_EPSILON_DB: f32 = 0.01;

/// Direct Form I biquad with per-channel state for interleaved blocks
#[derive(Debug, Clone)]
pub struct Biquad {
    filter_type: FilterType,
    frequency: f32,
    q: f32,
    gain_db: f32,
    sample_rate: u32,
    coeffs: BiquadCoeffs,
    x1: [Sample; MAX_CHANNELS],
    x2: [Sample; MAX_CHANNELS],
    y1: [Sample; MAX_CHANNELS],
    y2: [Sample; MAX_CHANNELS],
}

impl Biquad {
    pub fn new(filter_type: FilterType, frequency: f32, q: f32, sample_rate: u32) -> Self {
        let mut filter = Self {
            filter_type,
            frequency,
            q,
            gain_db: 0.0,
            sample_rate,
            coeffs: BiquadCoeffs::bypass(),
            x1: [0.0; MAX_CHANNELS],
            x2: [0.0; MAX_CHANNELS],
            y1: [0.0; MAX_CHANNELS],
            y2: [0.0; MAX_CHANNELS],
        };
        filter.recompute();
        filter
    }

    /// Reconfigure the filter. Not for use on the audio thread.
    pub fn set_params(
        &mut self,
        filter_type: FilterType,
        frequency: f32,
        q: f32,
        gain_db: f32,
        sample_rate: u32,
    ) {
        self.filter_type = filter_type;
        self.frequency = frequency;
        self.q = q;
        self.gain_db = gain_db;
        self.sample_rate = sample_rate;
        self.recompute();
    }

    /// Update only the gain, keeping the delay line intact. Changes smaller
    /// than 0.01 dB are ignored.
    pub fn update_gain(&mut self, gain_db: f32) {
        if (self.gain_db - gain_db).abs() < GAIN_EPSILON_DB {
            return;
        }
        self.gain_db = gain_db;
        self.recompute();
    }

    /// Retune the filter for a new sample rate, keeping type, frequency, Q
    /// and gain.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.recompute();
    }

    #[inline]
    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    #[inline]
    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    fn recompute(&mut self) {
        self.coeffs = BiquadCoeffs::compute(
            self.filter_type,
            self.frequency,
            self.q,
            self.gain_db,
            self.sample_rate as f32,
        );
    }

    /// Filter an interleaved block in place. Channels beyond `MAX_CHANNELS`
    /// pass through untouched so out-of-range indices never alias state.
    pub fn process(&mut self, buffer: &mut [Sample], frames: usize, channels: usize) {
        if channels == 0 {
            return;
        }
        let active = channels.min(MAX_CHANNELS);
        let c = self.coeffs;

        for frame in 0..frames {
            let base = frame * channels;
            for ch in 0..active {
                let x = buffer[base + ch];
                let y = c.b0 * x + c.b1 * self.x1[ch] + c.b2 * self.x2[ch]
                    - c.a1 * self.y1[ch]
                    - c.a2 * self.y2[ch];

                self.x2[ch] = self.x1[ch];
                self.x1[ch] = x;
                self.y2[ch] = self.y1[ch];
                self.y1[ch] = y;

                buffer[base + ch] = y;
            }
        }
    }
}

impl Processor for Biquad {
    fn reset(&mut self) {
        self.x1 = [0.0; MAX_CHANNELS];
        self.x2 = [0.0; MAX_CHANNELS];
        self.y1 = [0.0; MAX_CHANNELS];
        self.y2 = [0.0; MAX_CHANNELS];
        self.recompute();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_gain_is_identity() {
        let mut filter = Biquad::new(FilterType::Peaking, 1000.0, 1.41, 48000);

        let mut buffer: Vec<f32> = (0..256).map(|i| ((i as f32) * 0.1).sin() * 0.5).collect();
        let original = buffer.clone();
        let frames = buffer.len() / 2;
        filter.process(&mut buffer, frames, 2);

        for (out, orig) in buffer.iter().zip(original.iter()) {
            assert!((out - orig).abs() < 1e-5);
        }
    }

    #[test]
    fn test_peaking_boost_raises_center_frequency() {
        let mut filter = Biquad::new(FilterType::Peaking, 1000.0, 1.41, 48000);
        filter.update_gain(12.0);

        // Mono sine at the center frequency
        let mut buffer: Vec<f32> = (0..48000)
            .map(|i| (2.0 * PI * 1000.0 * i as f32 / 48000.0).sin() * 0.1)
            .collect();
        let frames = buffer.len();
        filter.process(&mut buffer, frames, 1);

        let rms: f32 =
            (buffer[4800..].iter().map(|x| x * x).sum::<f32>() / (frames - 4800) as f32).sqrt();
        let input_rms = 0.1 / 2.0_f32.sqrt();
        let gain_db = 20.0 * (rms / input_rms).log10();
        assert!(gain_db > 10.0, "expected ~12 dB boost, got {gain_db}");
    }

    #[test]
    fn test_update_gain_dead_zone() {
        let mut filter = Biquad::new(FilterType::Peaking, 1000.0, 1.41, 48000);
        filter.update_gain(6.0);
        let before = *filter.coeffs();
        filter.update_gain(6.005);
        let after = *filter.coeffs();
        assert_eq!(before.b0, after.b0);
        assert_eq!(filter.gain_db(), 6.0);
    }

    #[test]
    fn test_channels_do_not_alias() {
        let mut filter = Biquad::new(FilterType::Peaking, 1000.0, 1.41, 48000);
        filter.update_gain(12.0);

        // Impulse on channel 0 only; channel 1 must stay silent
        let mut buffer = vec![0.0f32; 64];
        buffer[0] = 1.0;
        filter.process(&mut buffer, 32, 2);

        for frame in 0..32 {
            assert_eq!(buffer[frame * 2 + 1], 0.0);
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let mut filter = Biquad::new(FilterType::LowShelf, 31.0, 1.41, 48000);
        filter.update_gain(9.0);

        let mut buffer = vec![0.5f32; 128];
        filter.process(&mut buffer, 64, 2);

        filter.reset();

        let mut silence = vec![0.0f32; 128];
        filter.process(&mut silence, 64, 2);
        assert!(silence.iter().all(|&x| x == 0.0));
    }
}
