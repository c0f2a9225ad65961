//! Atomic parameter cell for lock-free control-thread updates

use std::sync::atomic::{AtomicU32, Ordering};

/// Single-word parameter published from the control thread and read on the
/// audio thread without locking. The value is stored as raw f32 bits.
#[derive(Debug)]
pub struct AtomicParam {
    bits: AtomicU32,
}

impl AtomicParam {
    pub fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }
}

impl Default for AtomicParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}
