//! 10-band parametric EQ
//!
//! Fixed cascade of biquads on the ISO octave centers from 31 Hz to 16 kHz.
//! Band 0 is a low shelf, band 9 a high shelf, everything between is a
//! peaking filter at the octave Q of 1.41. Gains come in from the control
//! thread and are folded into coefficients on the next block.

use hs_core::Sample;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::biquad::{Biquad, FilterType};
use crate::Processor;

/// Number of EQ bands
pub const EQ_BANDS: usize = 10;

/// ISO octave center frequencies
pub const BAND_FREQUENCIES: [f32; EQ_BANDS] = [
    31.0, 62.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Octave-band Q shared by all bands
pub const BAND_Q: f32 = 1.41;

/// Band gains are clamped to this range at ingress
pub const MAX_BAND_GAIN_DB: f32 = 15.0;

/// Control-thread handle for the EQ
#[derive(Debug)]
pub struct EqControl {
    enabled: AtomicBool,
    gains: Mutex<[f32; EQ_BANDS]>,
    generation: AtomicU64,
}

impl EqControl {
    fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            gains: Mutex::new([0.0; EQ_BANDS]),
            generation: AtomicU64::new(0),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Set one band's gain in dB, clamped to +/-15. Out-of-range band
    /// indices are ignored.
    pub fn set_band_gain(&self, band: usize, gain_db: f32) {
        if band >= EQ_BANDS {
            return;
        }
        self.gains.lock()[band] = gain_db.clamp(-MAX_BAND_GAIN_DB, MAX_BAND_GAIN_DB);
        self.generation.fetch_add(1, Ordering::Release);
    }

    pub fn band_gains(&self) -> [f32; EQ_BANDS] {
        *self.gains.lock()
    }
}

/// 10-band EQ stage
#[derive(Debug)]
pub struct ParametricEq {
    control: Arc<EqControl>,
    bands: [Biquad; EQ_BANDS],
    seen_generation: u64,
    sample_rate: u32,
}

impl ParametricEq {
    pub fn new(sample_rate: u32) -> Self {
        let bands = std::array::from_fn(|i| {
            let filter_type = match i {
                0 => FilterType::LowShelf,
                n if n == EQ_BANDS - 1 => FilterType::HighShelf,
                _ => FilterType::Peaking,
            };
            Biquad::new(filter_type, BAND_FREQUENCIES[i], BAND_Q, sample_rate)
        });

        Self {
            control: Arc::new(EqControl::new()),
            bands,
            seen_generation: 0,
            sample_rate,
        }
    }

    pub fn control(&self) -> Arc<EqControl> {
        Arc::clone(&self.control)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.control.set_enabled(enabled);
    }

    pub fn set_band_gain(&self, band: usize, gain_db: f32) {
        self.control.set_band_gain(band, gain_db);
    }

    /// Retune every band for a new sample rate and clear filter state. The
    /// configured gains survive the retune.
    fn retune(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        for band in &mut self.bands {
            band.set_sample_rate(sample_rate);
            band.reset();
        }
        log::debug!("eq retuned for {} Hz", sample_rate);
    }

    /// Process an interleaved block in place through the band cascade
    pub fn process(&mut self, buffer: &mut [Sample], frames: usize, channels: usize, sample_rate: u32) {
        if !self.control.is_enabled() {
            return;
        }
        if frames == 0 || channels == 0 {
            return;
        }
        if sample_rate != self.sample_rate {
            self.retune(sample_rate);
        }

        let generation = self.control.generation.load(Ordering::Acquire);
        if generation != self.seen_generation {
            let gains = self.control.band_gains();
            for (band, &gain_db) in self.bands.iter_mut().zip(gains.iter()) {
                band.update_gain(gain_db);
            }
            self.seen_generation = generation;
        }

        for band in &mut self.bands {
            band.process(buffer, frames, channels);
        }
    }
}

impl Processor for ParametricEq {
    fn reset(&mut self) {
        for band in &mut self.bands {
            band.reset();
        }
    }
}
