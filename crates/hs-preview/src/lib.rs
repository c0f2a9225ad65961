//! hs-preview: Waveform peak extraction for scrub-bar previews
//!
//! Summarizes a raw 16-bit mono PCM file into a fixed number of peak
//! buckets. The file is memory-mapped read-only so multi-megabyte files are
//! never copied into user memory; the OS page cache absorbs repeated scans
//! while the user scrubs. The mapping is dropped on every exit path.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;

/// Sub-sampling stride inside each bucket. Scanning every 100th sample
/// trades exactness for scan latency, which is fine for a seek bar.
pub const SCAN_STRIDE: usize = 100;

/// Preview extraction error
#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid point count: {0}")]
    InvalidPointCount(usize),

    #[error("file too small: {0} bytes")]
    FileTooSmall(u64),
}

/// Result type alias
pub type PreviewResult<T> = Result<T, PreviewError>;

/// Extract `num_points` waveform peaks from a raw 16-bit little-endian PCM
/// file.
///
/// Returns `min(num_points, samples)` values in [0, 1], one per bucket,
/// where each value is the peak of a stride-100 scan over the bucket's
/// sample range.
pub fn extract_peaks(path: &Path, num_points: usize) -> PreviewResult<Vec<f32>> {
    if num_points == 0 {
        return Err(PreviewError::InvalidPointCount(num_points));
    }

    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    if file_len < 2 {
        return Err(PreviewError::FileTooSmall(file_len));
    }

    // Safety: the mapping is read-only and private; concurrent truncation of
    // the underlying file is the caller's responsibility, as with any mmap.
    let mmap = unsafe { Mmap::map(&file)? };

    let num_samples = mmap.len() / 2;
    let actual_points = num_points.min(num_samples);
    let samples_per_point = num_samples / actual_points;

    let mut peaks = vec![0.0f32; actual_points];
    for (point, peak) in peaks.iter_mut().enumerate() {
        let start = point * samples_per_point;
        let end = ((point + 1) * samples_per_point).min(num_samples);

        let mut max_value = 0.0f32;
        let mut index = start;
        while index < end {
            let byte = index * 2;
            let sample = i16::from_le_bytes([mmap[byte], mmap[byte + 1]]);
            let value = (sample as f32).abs() / 32768.0;
            if value > max_value {
                max_value = value;
            }
            index += SCAN_STRIDE;
        }
        *peak = max_value;
    }

    Ok(peaks)
}
