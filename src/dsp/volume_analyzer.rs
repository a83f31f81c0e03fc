//! Block-integrated RMS analyzer with a threshold gate.
//!
//! # Behavior
//! - Squares of every sample on every channel are summed over an integration
//!   period of `rms_blocks_length` blocks.
//! - At the end of a period the raw RMS is computed, clamped to zero when it
//!   is below the threshold, and the displayed value moves toward it by
//!   `variation_speed` (single-pole smoothing).
//! - The gate for the next period's blocks opens when the smoothed value is at
//!   or above the threshold. Whole blocks are passed or muted.
//!
//! # Real-time notes
//! No allocation and no locking. Knobs are read from `AnalyzerSettings` once
//! per block.

use crate::dsp::settings::AnalyzerSettings;
use crate::dsp::utils::sum_squares;
use crate::dsp::{Analyzer, AnalyzerError, AnalyzerKind, BlockReport, GateState, PeriodEvent};
use std::sync::Arc;

pub struct VolumeAnalyzer {
    settings: Arc<AnalyzerSettings>,

    sample_rate: f32,
    samples_per_block: usize,
    prepared: bool,

    // Integration state
    samples_squares_sum: f32,
    samples_accumulated: usize,
    block_index: usize,

    // Output state
    last_rms_value: f32,
    new_rms_value: f32,
    gate: GateState,

    sample_index: u64,
}

impl VolumeAnalyzer {
    pub fn new(settings: Arc<AnalyzerSettings>) -> Self {
        Self {
            settings,
            sample_rate: 0.0,
            samples_per_block: 0,
            prepared: false,
            samples_squares_sum: 0.0,
            samples_accumulated: 0,
            block_index: 0,
            last_rms_value: 0.0,
            new_rms_value: 0.0,
            gate: GateState::Below,
            sample_index: 0,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn samples_per_block(&self) -> usize {
        self.samples_per_block
    }

    /// Blocks accumulated in the current, still open period.
    ///
    /// Never above the current `rms_blocks_length`: when the length shrinks
    /// mid-period the count is capped until the next block closes the period.
    pub fn block_index(&self) -> usize {
        self.block_index.min(self.settings.rms_blocks_length())
    }

    /// Raw (clamped) RMS of the last completed period.
    pub fn new_rms_value(&self) -> f32 {
        self.new_rms_value
    }

    fn end_integration_period(&mut self, threshold: f32, variation_speed: f32) -> Option<PeriodEvent> {
        if self.samples_accumulated == 0 {
            return None;
        }

        let raw = (self.samples_squares_sum / self.samples_accumulated as f32).sqrt();
        // Raw value is clamped before smoothing
        self.new_rms_value = if raw < threshold { 0.0 } else { raw };

        self.samples_squares_sum = 0.0;
        self.samples_accumulated = 0;
        self.block_index = 0;

        let variation = (self.new_rms_value - self.last_rms_value) * variation_speed;
        self.last_rms_value = (self.last_rms_value + variation).max(0.0);
        self.gate = GateState::evaluate(self.last_rms_value, threshold);

        Some(PeriodEvent {
            sample_index: self.sample_index,
            raw_value: self.new_rms_value,
            value: self.last_rms_value,
            gate: self.gate,
        })
    }
}

impl Analyzer for VolumeAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Volume
    }

    fn prepare(
        &mut self,
        sample_rate: f32,
        samples_per_block: usize,
    ) -> Result<(), AnalyzerError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(AnalyzerError::InvalidSampleRate(sample_rate));
        }
        if samples_per_block == 0 {
            return Err(AnalyzerError::InvalidBlockSize(samples_per_block));
        }
        self.sample_rate = sample_rate;
        self.samples_per_block = samples_per_block;
        self.prepared = true;
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.prepared
    }

    fn process(&mut self, channels: &mut [&mut [f32]]) -> BlockReport {
        let frames = channels.iter().map(|c| c.len()).max().unwrap_or(0);
        let gate = self.gate;

        if !self.prepared {
            for channel in channels.iter_mut() {
                channel.fill(0.0);
            }
            return BlockReport {
                frames,
                gate: GateState::Below,
                silenced: true,
                period: None,
            };
        }

        // Zero-length block: nothing to integrate, the period does not advance
        let block_samples: usize = channels.iter().map(|c| c.len()).sum();
        if block_samples == 0 {
            return BlockReport {
                frames,
                gate,
                silenced: false,
                period: None,
            };
        }

        let settings = self.settings.snapshot();

        let mut block_sum = 0.0f32;
        for channel in channels.iter() {
            block_sum += sum_squares(channel);
        }

        self.sample_index += frames as u64;

        if !block_sum.is_finite() {
            for channel in channels.iter_mut() {
                channel.fill(0.0);
            }
            return BlockReport {
                frames,
                gate,
                silenced: true,
                period: None,
            };
        }

        self.samples_squares_sum += block_sum;
        self.samples_accumulated += block_samples;

        if !gate.is_open() {
            for channel in channels.iter_mut() {
                channel.fill(0.0);
            }
        }

        self.block_index += 1;
        let period = if self.block_index >= settings.rms_blocks_length {
            self.end_integration_period(settings.threshold, settings.variation_speed)
        } else {
            None
        };

        BlockReport {
            frames,
            gate,
            silenced: false,
            period,
        }
    }

    fn reset(&mut self) {
        self.samples_squares_sum = 0.0;
        self.samples_accumulated = 0;
        self.block_index = 0;
        self.last_rms_value = 0.0;
        self.new_rms_value = 0.0;
        self.gate = GateState::Below;
    }

    fn last_value(&self) -> f32 {
        self.last_rms_value
    }

    fn gate(&self) -> GateState {
        self.gate
    }

    fn sample_index(&self) -> u64 {
        self.sample_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::utils::SILENCE_DB;

    fn analyzer(threshold: f32, blocks: usize, speed: f32) -> VolumeAnalyzer {
        let settings = Arc::new(AnalyzerSettings::new());
        settings.set_threshold(threshold);
        settings.set_rms_blocks_length(blocks);
        settings.set_variation_speed(speed);
        let mut a = VolumeAnalyzer::new(settings);
        a.prepare(48000.0, 128).unwrap();
        a
    }

    fn run_block(a: &mut VolumeAnalyzer, value: f32, frames: usize) -> (BlockReport, Vec<f32>) {
        let mut l = vec![value; frames];
        let mut r = vec![value; frames];
        let report = {
            let mut chans: [&mut [f32]; 2] = [&mut l, &mut r];
            a.process(&mut chans)
        };
        assert_eq!(l, r);
        (report, l)
    }

    #[test]
    fn test_prepare_rejects_bad_config() {
        let mut a = VolumeAnalyzer::new(Arc::new(AnalyzerSettings::new()));
        assert_eq!(
            a.prepare(0.0, 128),
            Err(AnalyzerError::InvalidSampleRate(0.0))
        );
        assert!(a.prepare(-44100.0, 128).is_err());
        assert!(a.prepare(f32::NAN, 128).is_err());
        assert_eq!(
            a.prepare(48000.0, 0),
            Err(AnalyzerError::InvalidBlockSize(0))
        );
        assert!(!a.is_prepared());
        assert!(a.prepare(48000.0, 256).is_ok());
        assert!(a.is_prepared());
        assert_eq!(a.sample_rate(), 48000.0);
        assert_eq!(a.samples_per_block(), 256);
        assert_eq!(a.kind(), AnalyzerKind::Volume);
    }

    #[test]
    fn test_unprepared_passes_silence() {
        let mut a = VolumeAnalyzer::new(Arc::new(AnalyzerSettings::new()));
        let mut l = vec![0.7; 64];
        let report = {
            let mut chans: [&mut [f32]; 1] = [&mut l];
            a.process(&mut chans)
        };
        assert!(report.silenced);
        assert!(l.iter().all(|&s| s == 0.0));
        assert_eq!(a.sample_index(), 0);
    }

    #[test]
    fn test_four_block_scenario() {
        let mut a = analyzer(0.1, 4, 0.5);

        for i in 0..4 {
            let (report, out) = run_block(&mut a, 1.0, 128);
            assert_eq!(report.gate, GateState::Below);
            assert!(out.iter().all(|&s| s == 0.0), "block {} leaked", i + 1);
            if i < 3 {
                assert!(report.period.is_none());
            } else {
                let period = report.period.expect("period should close on block 4");
                assert!((period.raw_value - 1.0).abs() < 1e-6);
                assert!((period.value - 0.5).abs() < 1e-6);
                assert_eq!(period.sample_index, 4 * 128);
                assert_eq!(period.gate, GateState::Above);
            }
        }

        assert!((a.last_value() - 0.5).abs() < 1e-6);

        let (report, out) = run_block(&mut a, 1.0, 128);
        assert_eq!(report.gate, GateState::Above);
        assert!(out.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_below_threshold_clamps_to_zero() {
        let mut a = analyzer(0.5, 1, 0.5);
        // Open the gate first
        for _ in 0..4 {
            run_block(&mut a, 1.0, 128);
        }
        let opened = a.last_value();
        assert!(opened > 0.5);

        let (report, _) = run_block(&mut a, 0.3, 128);
        let period = report.period.unwrap();
        assert_eq!(period.raw_value, 0.0);
        assert_eq!(a.new_rms_value(), 0.0);
        assert!((a.last_value() - opened * 0.5).abs() < 1e-6);

        for _ in 0..40 {
            run_block(&mut a, 0.3, 128);
        }
        assert!(a.last_value() < 1e-6);
        assert_eq!(a.gate(), GateState::Below);
    }

    #[test]
    fn test_silence_converges_to_zero() {
        let mut a = analyzer(0.01, 3, 0.4);
        for _ in 0..12 {
            run_block(&mut a, 0.8, 256);
        }
        assert!(a.gate().is_open());

        for _ in 0..(3 * 60) {
            run_block(&mut a, 0.0, 256);
        }
        assert!(a.last_value() < 1e-6);
        assert_eq!(a.gate(), GateState::Below);
    }

    #[test]
    fn test_geometric_convergence() {
        let amplitude = 0.6;
        let speed = 0.25;
        let mut a = analyzer(0.05, 2, speed);

        let mut prev_err = amplitude;
        let mut periods = 0;
        for _ in 0..40 {
            let (report, _) = run_block(&mut a, amplitude, 100);
            if let Some(p) = report.period {
                let err = amplitude - p.value;
                assert!(err >= -1e-6, "overshoot");
                assert!((err - prev_err * (1.0 - speed)).abs() < 1e-4);
                prev_err = err;
                periods += 1;
            }
        }
        assert_eq!(periods, 20);
    }

    #[test]
    fn test_block_index_stays_in_range() {
        let settings = Arc::new(AnalyzerSettings::new());
        settings.set_rms_blocks_length(5);
        let mut a = VolumeAnalyzer::new(settings.clone());
        a.prepare(44100.0, 64).unwrap();

        for i in 0..23 {
            run_block(&mut a, 0.2, 64);
            assert!(a.block_index() < settings.rms_blocks_length());
            if i == 11 {
                // Shrinking the period closes the open one on the next block
                settings.set_rms_blocks_length(2);
            }
        }
    }

    #[test]
    fn test_shrunk_length_caps_block_index() {
        let settings = Arc::new(AnalyzerSettings::new());
        settings.set_threshold(0.0);
        settings.set_rms_blocks_length(10);
        let mut a = VolumeAnalyzer::new(settings.clone());
        a.prepare(44100.0, 64).unwrap();

        for _ in 0..8 {
            let (report, _) = run_block(&mut a, 0.2, 64);
            assert!(report.period.is_none());
        }
        assert_eq!(a.block_index(), 8);

        settings.set_rms_blocks_length(2);
        assert!(a.block_index() <= settings.rms_blocks_length());

        // All nine blocks land in the closing period
        let (report, _) = run_block(&mut a, 0.2, 64);
        let period = report.period.unwrap();
        assert!((period.raw_value - 0.2).abs() < 1e-5);
        assert_eq!(a.block_index(), 0);
    }

    #[test]
    fn test_zero_length_block_is_ignored() {
        let mut a = analyzer(0.0, 1, 1.0);
        let mut empty: [&mut [f32]; 2] = [&mut [], &mut []];
        let report = a.process(&mut empty);
        assert!(report.period.is_none());
        assert_eq!(a.block_index(), 0);
        assert_eq!(a.sample_index(), 0);
        assert!(a.last_value().is_finite());
    }

    #[test]
    fn test_mismatched_block_length() {
        let mut a = analyzer(0.1, 1, 1.0);
        // Prepared for 128, fed 37
        let (report, _) = run_block(&mut a, 0.5, 37);
        assert_eq!(report.frames, 37);
        assert!((a.last_value() - 0.5).abs() < 1e-6);
        assert_eq!(a.sample_index(), 37);
    }

    #[test]
    fn test_non_finite_block_is_silenced() {
        let mut a = analyzer(0.0, 2, 1.0);
        let mut l = vec![0.5; 32];
        l[3] = f32::NAN;
        let report = {
            let mut chans: [&mut [f32]; 1] = [&mut l];
            a.process(&mut chans)
        };
        assert!(report.silenced);
        assert!(l.iter().all(|&s| s == 0.0));
        assert_eq!(a.block_index(), 0);

        run_block(&mut a, 0.5, 32);
        let (report, _) = run_block(&mut a, 0.5, 32);
        assert!(report.period.is_some());
        assert!(a.last_value().is_finite());
    }

    #[test]
    fn test_db_readout() {
        let mut a = analyzer(0.0, 1, 1.0);
        assert_eq!(a.last_value_db(), SILENCE_DB);
        run_block(&mut a, 0.5, 64);
        assert!((a.last_value_db() + 6.0206).abs() < 1e-3);
    }

    #[test]
    fn test_reset_keeps_sample_counter() {
        let mut a = analyzer(0.0, 1, 1.0);
        run_block(&mut a, 0.5, 64);
        a.reset();
        assert_eq!(a.last_value(), 0.0);
        assert_eq!(a.gate(), GateState::Below);
        assert_eq!(a.sample_index(), 64);
    }
}
