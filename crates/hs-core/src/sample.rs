//! Sample type and channel definitions

/// Type alias for audio samples (f32 end to end, matching the host's PCM path)
pub type Sample = f32;

/// Maximum number of interleaved channels any processor carries state for.
/// Channels beyond this limit pass through untouched.
pub const MAX_CHANNELS: usize = 8;
