//! Dominant-frequency tracker.
//!
//! Channels are mixed to mono into a circular history of `FFT_SIZE` samples.
//! Every `FFT_HOP` samples the history is windowed and transformed, the
//! strongest bin inside the `[min_frequency, max_frequency]` band is refined
//! by parabolic interpolation, and the tracked value moves toward it by
//! `fft_speed`.
//!
//! The analyzer only observes: audio passes through unchanged and the gate
//! always reads `Above`. Frames whose in-band peak is below `MAG_FLOOR` are
//! treated as silence and produce no event.

use crate::dsp::settings::SpectrumSettings;
use crate::dsp::utils::make_hann_window;
use crate::dsp::{Analyzer, AnalyzerError, AnalyzerKind, BlockReport, GateState, PeriodEvent};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

pub const FFT_SIZE: usize = 2048;
pub const FFT_HOP: usize = FFT_SIZE / 2;

/// Peak amplitude (window-normalized) below which a frame counts as silent.
const MAG_FLOOR: f32 = 1e-4;

pub struct FrequencyAnalyzer {
    settings: Arc<SpectrumSettings>,
    fft: Arc<dyn Fft<f32>>,

    window: Vec<f32>,
    window_gain: f32,
    history: Vec<f32>,
    write_pos: usize,
    hop_fill: usize,

    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,

    sample_rate: f32,
    prepared: bool,

    raw_frequency: f32,
    last_frequency: f32,
    sample_index: u64,
}

impl FrequencyAnalyzer {
    pub fn new(settings: Arc<SpectrumSettings>) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let scratch_len = fft.get_inplace_scratch_len();

        let window = make_hann_window(FFT_SIZE);
        let window_gain = window.iter().sum::<f32>();

        Self {
            settings,
            fft,
            window,
            window_gain,
            history: vec![0.0; FFT_SIZE],
            write_pos: 0,
            hop_fill: 0,
            spectrum: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            sample_rate: 0.0,
            prepared: false,
            raw_frequency: 0.0,
            last_frequency: 0.0,
            sample_index: 0,
        }
    }

    /// Interpolated peak frequency of the last non-silent frame, Hz.
    pub fn raw_frequency(&self) -> f32 {
        self.raw_frequency
    }

    /// Width of one FFT bin at the prepared rate, Hz.
    pub fn bin_width(&self) -> f32 {
        self.sample_rate / FFT_SIZE as f32
    }

    fn hz_to_bin(&self, hz: f32) -> usize {
        let bin = (hz / self.bin_width()).round();
        (bin.max(1.0) as usize).min(FFT_SIZE / 2)
    }

    fn analyze_frame(&mut self) -> Option<PeriodEvent> {
        let band = self.settings.snapshot();

        for k in 0..FFT_SIZE {
            let s = self.history[(self.write_pos + k) % FFT_SIZE];
            self.spectrum[k] = Complex::new(s * self.window[k], 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let lo = self.hz_to_bin(band.min_frequency);
        let hi = self.hz_to_bin(band.max_frequency).max(lo);

        let mut peak_bin = lo;
        let mut peak_mag = 0.0f32;
        for bin in lo..=hi {
            let mag = self.spectrum[bin].norm();
            if mag > peak_mag {
                peak_mag = mag;
                peak_bin = bin;
            }
        }

        if 2.0 * peak_mag / self.window_gain < MAG_FLOOR {
            return None;
        }

        // Parabolic refinement, only with both neighbours inside the band
        let mut offset = 0.0f32;
        if peak_bin > lo && peak_bin < hi {
            let a = self.spectrum[peak_bin - 1].norm();
            let c = self.spectrum[peak_bin + 1].norm();
            let denom = a - 2.0 * peak_mag + c;
            if denom.abs() > f32::EPSILON {
                offset = (0.5 * (a - c) / denom).clamp(-0.5, 0.5);
            }
        }

        self.raw_frequency = (peak_bin as f32 + offset) * self.bin_width();
        if self.last_frequency <= 0.0 {
            // First detection seeds the tracker instead of sweeping up from 0 Hz
            self.last_frequency = self.raw_frequency;
        } else {
            self.last_frequency += (self.raw_frequency - self.last_frequency) * band.fft_speed;
        }

        Some(PeriodEvent {
            sample_index: self.sample_index,
            raw_value: self.raw_frequency,
            value: self.last_frequency,
            gate: GateState::Above,
        })
    }
}

impl Analyzer for FrequencyAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Frequency
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
        self.prepared = true;
        self.reset();
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.prepared
    }

    fn process(&mut self, channels: &mut [&mut [f32]]) -> BlockReport {
        let frames = channels.iter().map(|c| c.len()).max().unwrap_or(0);
        let mut report = BlockReport {
            frames,
            gate: GateState::Above,
            silenced: false,
            period: None,
        };
        if !self.prepared || frames == 0 || channels.is_empty() {
            return report;
        }

        let scale = 1.0 / channels.len() as f32;
        for i in 0..frames {
            let mut mono = 0.0f32;
            for channel in channels.iter() {
                if let Some(&s) = channel.get(i) {
                    if s.is_finite() {
                        mono += s;
                    }
                }
            }
            self.history[self.write_pos] = mono * scale;
            self.write_pos = (self.write_pos + 1) % FFT_SIZE;
            self.sample_index += 1;

            self.hop_fill += 1;
            if self.hop_fill == FFT_HOP {
                self.hop_fill = 0;
                if let Some(event) = self.analyze_frame() {
                    report.period = Some(event);
                }
            }
        }

        report
    }

    fn reset(&mut self) {
        self.history.fill(0.0);
        self.write_pos = 0;
        self.hop_fill = 0;
        self.raw_frequency = 0.0;
        self.last_frequency = 0.0;
    }

    fn last_value(&self) -> f32 {
        self.last_frequency
    }

    fn gate(&self) -> GateState {
        GateState::Above
    }

    fn sample_index(&self) -> u64 {
        self.sample_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 44100.0;

    fn analyzer(min_hz: f32, max_hz: f32, speed: f32) -> FrequencyAnalyzer {
        let settings = Arc::new(SpectrumSettings::new());
        settings.set_min_frequency(min_hz);
        settings.set_max_frequency(max_hz);
        settings.set_fft_speed(speed);
        let mut a = FrequencyAnalyzer::new(settings);
        a.prepare(SR, 512).unwrap();
        a
    }

    /// Feeds `blocks` stereo blocks of 512 samples of `gen(n)`, `n` counted from `start`.
    fn feed(
        a: &mut FrequencyAnalyzer,
        gen: impl Fn(usize) -> f32,
        start: usize,
        blocks: usize,
    ) -> Vec<PeriodEvent> {
        let mut events = Vec::new();
        for b in 0..blocks {
            let mut l: Vec<f32> = (0..512).map(|i| gen(start + b * 512 + i)).collect();
            let mut r = l.clone();
            let before = l.clone();
            let report = {
                let mut chans: [&mut [f32]; 2] = [&mut l, &mut r];
                a.process(&mut chans)
            };
            assert_eq!(l, before);
            assert_eq!(report.gate, GateState::Above);
            events.extend(report.period);
        }
        events
    }

    fn tone(hz: f32, amp: f32) -> impl Fn(usize) -> f32 {
        move |n| amp * (2.0 * std::f32::consts::PI * hz * n as f32 / SR).sin()
    }

    #[test]
    fn test_prepare_rejects_bad_config() {
        let mut a = FrequencyAnalyzer::new(Arc::new(SpectrumSettings::new()));
        assert!(a.prepare(0.0, 512).is_err());
        assert_eq!(
            a.prepare(SR, 0),
            Err(AnalyzerError::InvalidBlockSize(0))
        );
        assert!(!a.is_prepared());
        assert_eq!(a.kind(), AnalyzerKind::Frequency);
    }

    #[test]
    fn test_tracks_pure_tone() {
        let mut a = analyzer(50.0, 20000.0, 1.0);
        let events = feed(&mut a, tone(1000.0, 0.5), 0, 40);
        assert!(!events.is_empty());
        assert!((a.last_value() - 1000.0).abs() < a.bin_width());
        assert_eq!(a.sample_index(), 40 * 512);
    }

    #[test]
    fn test_band_excludes_louder_tone() {
        let mut a = analyzer(1000.0, 8000.0, 1.0);
        let low = tone(200.0, 0.8);
        let high = tone(3000.0, 0.2);
        feed(&mut a, move |n| low(n) + high(n), 0, 40);
        assert!((a.last_value() - 3000.0).abs() < a.bin_width());
    }

    #[test]
    fn test_silence_produces_no_events() {
        let mut a = analyzer(50.0, 20000.0, 0.5);
        let events = feed(&mut a, |_| 0.0, 0, 20);
        assert!(events.is_empty());
        assert_eq!(a.last_value(), 0.0);
    }

    #[test]
    fn test_speed_controls_tracking() {
        let mut frozen = analyzer(50.0, 20000.0, 0.0);
        feed(&mut frozen, tone(1000.0, 0.5), 0, 20);
        let seeded = frozen.last_value();
        feed(&mut frozen, tone(2000.0, 0.5), 20 * 512, 40);
        assert_eq!(frozen.last_value(), seeded);
        assert!((frozen.raw_frequency() - 2000.0).abs() < frozen.bin_width());

        let mut moving = analyzer(50.0, 20000.0, 0.5);
        feed(&mut moving, tone(1000.0, 0.5), 0, 20);
        feed(&mut moving, tone(2000.0, 0.5), 20 * 512, 40);
        assert!((moving.last_value() - 2000.0).abs() < moving.bin_width());
    }

    #[test]
    fn test_one_event_per_hop() {
        let mut a = analyzer(50.0, 20000.0, 1.0);
        let mut l: Vec<f32> = (0..FFT_HOP * 4).map(tone(500.0, 0.5)).collect();
        let report = {
            let mut chans: [&mut [f32]; 1] = [&mut l];
            a.process(&mut chans)
        };
        // Last of the four frames is reported
        assert_eq!(report.period.unwrap().sample_index, (FFT_HOP * 4) as u64);
    }

    #[test]
    fn test_reset_clears_tracking() {
        let mut a = analyzer(50.0, 20000.0, 1.0);
        feed(&mut a, tone(1000.0, 0.5), 0, 20);
        a.reset();
        assert_eq!(a.last_value(), 0.0);
        assert_eq!(a.sample_index(), 20 * 512);
        assert!(feed(&mut a, |_| 0.0, 0, 8).is_empty());
    }
}
