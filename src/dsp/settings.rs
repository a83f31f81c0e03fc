//! Lock-free analyzer knobs shared between the UI/host side and the audio thread.
//!
//! Same storage trick as `crate::meters`: `f32` values are kept as raw bits in
//! `AtomicU32` with relaxed ordering. There is no cross-field atomicity; a stale
//! read costs at most one block of wrong gating.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Default gate threshold (linear amplitude).
pub const DEFAULT_THRESHOLD: f32 = 0.001;
/// Upper end of the threshold range offered to the user.
pub const MAX_THRESHOLD: f32 = 0.5;
/// Default smoothing coefficient.
pub const DEFAULT_VARIATION_SPEED: f32 = 0.5;
/// Default integration period, in blocks.
pub const DEFAULT_RMS_BLOCKS: usize = 4;
/// Longest integration period the analyzer accepts, in blocks.
pub const MAX_RMS_BLOCKS: usize = 10;

/// Frequency search band limits, Hz.
pub const MIN_FREQUENCY_HZ: f32 = 20.0;
pub const MAX_FREQUENCY_HZ: f32 = 20000.0;
pub const DEFAULT_MIN_FREQUENCY: f32 = 50.0;
pub const DEFAULT_MAX_FREQUENCY: f32 = MAX_FREQUENCY_HZ;
/// Default smoothing coefficient for the dominant frequency.
pub const DEFAULT_FFT_SPEED: f32 = 0.5;

#[derive(Debug)]
pub struct AnalyzerSettings {
    threshold: AtomicU32,
    rms_blocks_length: AtomicUsize,
    variation_speed: AtomicU32,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            threshold: AtomicU32::new(DEFAULT_THRESHOLD.to_bits()),
            rms_blocks_length: AtomicUsize::new(DEFAULT_RMS_BLOCKS),
            variation_speed: AtomicU32::new(DEFAULT_VARIATION_SPEED.to_bits()),
        }
    }
}

impl AnalyzerSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_threshold(&self, val: f32) {
        let val = if val.is_finite() { val.max(0.0) } else { 0.0 };
        self.threshold.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn set_rms_blocks_length(&self, blocks: usize) {
        self.rms_blocks_length
            .store(blocks.clamp(1, MAX_RMS_BLOCKS), Ordering::Relaxed);
    }

    pub fn set_variation_speed(&self, val: f32) {
        let val = if val.is_finite() {
            val.clamp(0.0, 1.0)
        } else {
            DEFAULT_VARIATION_SPEED
        };
        self.variation_speed.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn threshold(&self) -> f32 {
        f32::from_bits(self.threshold.load(Ordering::Relaxed))
    }

    pub fn rms_blocks_length(&self) -> usize {
        self.rms_blocks_length.load(Ordering::Relaxed)
    }

    pub fn variation_speed(&self) -> f32 {
        f32::from_bits(self.variation_speed.load(Ordering::Relaxed))
    }

    /// Copy of all three knobs, taken once at the start of a block.
    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            threshold: self.threshold(),
            rms_blocks_length: self.rms_blocks_length(),
            variation_speed: self.variation_speed(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SettingsSnapshot {
    pub threshold: f32,
    pub rms_blocks_length: usize,
    pub variation_speed: f32,
}

/// Band and smoothing knobs for the frequency analyzer.
#[derive(Debug)]
pub struct SpectrumSettings {
    min_frequency: AtomicU32,
    max_frequency: AtomicU32,
    fft_speed: AtomicU32,
}

impl Default for SpectrumSettings {
    fn default() -> Self {
        Self {
            min_frequency: AtomicU32::new(DEFAULT_MIN_FREQUENCY.to_bits()),
            max_frequency: AtomicU32::new(DEFAULT_MAX_FREQUENCY.to_bits()),
            fft_speed: AtomicU32::new(DEFAULT_FFT_SPEED.to_bits()),
        }
    }
}

fn clamp_hz(val: f32, fallback: f32) -> f32 {
    if val.is_finite() {
        val.clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ)
    } else {
        fallback
    }
}

impl SpectrumSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_min_frequency(&self, hz: f32) {
        let hz = clamp_hz(hz, DEFAULT_MIN_FREQUENCY);
        self.min_frequency.store(hz.to_bits(), Ordering::Relaxed);
    }

    pub fn set_max_frequency(&self, hz: f32) {
        let hz = clamp_hz(hz, DEFAULT_MAX_FREQUENCY);
        self.max_frequency.store(hz.to_bits(), Ordering::Relaxed);
    }

    pub fn set_fft_speed(&self, val: f32) {
        let val = if val.is_finite() {
            val.clamp(0.0, 1.0)
        } else {
            DEFAULT_FFT_SPEED
        };
        self.fft_speed.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn min_frequency(&self) -> f32 {
        f32::from_bits(self.min_frequency.load(Ordering::Relaxed))
    }

    pub fn max_frequency(&self) -> f32 {
        f32::from_bits(self.max_frequency.load(Ordering::Relaxed))
    }

    pub fn fft_speed(&self) -> f32 {
        f32::from_bits(self.fft_speed.load(Ordering::Relaxed))
    }

    /// Band edges come back ordered even if the UI crossed them.
    pub fn snapshot(&self) -> SpectrumSnapshot {
        let a = self.min_frequency();
        let b = self.max_frequency();
        SpectrumSnapshot {
            min_frequency: a.min(b),
            max_frequency: a.max(b),
            fft_speed: self.fft_speed(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpectrumSnapshot {
    pub min_frequency: f32,
    pub max_frequency: f32,
    pub fft_speed: f32,
}

/// Converts an integration length in milliseconds to a whole number of blocks.
///
/// Truncates like the period counter does, then clamps to `[1, MAX_RMS_BLOCKS]`
/// so a short length or a large block never yields an empty period.
pub fn blocks_from_millis(sample_rate: f32, length_ms: f32, samples_per_block: usize) -> usize {
    if samples_per_block == 0 || !(sample_rate > 0.0) || !length_ms.is_finite() {
        return 1;
    }
    let samples = (sample_rate / 1000.0) * length_ms.max(0.0);
    let blocks = (samples / samples_per_block as f32) as usize;
    blocks.clamp(1, MAX_RMS_BLOCKS)
}

/// Inverse of [`blocks_from_millis`], used for display.
pub fn millis_from_blocks(sample_rate: f32, blocks: usize, samples_per_block: usize) -> f32 {
    if !(sample_rate > 0.0) {
        return 0.0;
    }
    (blocks * samples_per_block) as f32 * 1000.0 / sample_rate
}
