//! Per-block orchestration.
//!
//! The host hands one block to `BlockPipeline::process`, which
//! - measures the input peak,
//! - runs the analyzer (accumulate, gate in place, maybe close a period),
//! - appends a closed period to the envelope while recording,
//! - pushes a `PeriodEvent` to the editor queue and refreshes `Meters`.
//!
//! Nothing here blocks except the single-append envelope lock, and nothing
//! allocates except amortized envelope growth.

use crate::debug::RtLogger;
use crate::dsp::settings::AnalyzerSettings;
use crate::dsp::utils::gain_to_db_floored;
use crate::dsp::{Analyzer, AnalyzerError, BlockReport, PeriodEvent};
use crate::envelope::{EnvelopeError, EnvelopeRecorder};
use crate::meters::Meters;
use crate::wg_log;
use ringbuf::{Consumer, Producer, RingBuffer};
use std::sync::Arc;

/// Queue depth for period notifications; a few seconds of periods at small block sizes.
pub const PERIOD_EVENT_CAPACITY: usize = 1024;

/// Peak meter fall rate.
const PEAK_DECAY_DB_PER_SEC: f32 = 20.0;

/// Editor-side end of the period notification queue.
pub struct PeriodEvents {
    rx: Consumer<PeriodEvent>,
}

impl PeriodEvents {
    pub fn pop(&mut self) -> Option<PeriodEvent> {
        self.rx.pop()
    }

    /// Hands every queued event to `f`, oldest first. Returns the count.
    pub fn drain(&mut self, mut f: impl FnMut(PeriodEvent)) -> usize {
        let mut n = 0;
        while let Some(event) = self.rx.pop() {
            f(event);
            n += 1;
        }
        n
    }
}

/// Envelope nodes per second for a given period length.
pub fn envelope_rate(sample_rate: f32, rms_blocks_length: usize, samples_per_block: usize) -> f32 {
    let period = rms_blocks_length.max(1) * samples_per_block;
    if period == 0 || !(sample_rate > 0.0) {
        return 0.0;
    }
    sample_rate / period as f32
}

pub struct BlockPipeline<A: Analyzer> {
    analyzer: A,
    recorder: Arc<EnvelopeRecorder>,
    meters: Arc<Meters>,
    events: Producer<PeriodEvent>,
    rt_log: RtLogger,

    sample_rate: f32,
    block_frames: usize,
    input_peak_db: f32,
    output_peak_db: f32,
}

impl<A: Analyzer> BlockPipeline<A> {
    pub fn new(
        analyzer: A,
        recorder: Arc<EnvelopeRecorder>,
        meters: Arc<Meters>,
        rt_log: RtLogger,
    ) -> (Self, PeriodEvents) {
        let (tx, rx) = RingBuffer::<PeriodEvent>::new(PERIOD_EVENT_CAPACITY).split();
        let pipeline = Self {
            analyzer,
            recorder,
            meters,
            events: tx,
            rt_log,
            sample_rate: 0.0,
            block_frames: 0,
            input_peak_db: gain_to_db_floored(0.0),
            output_peak_db: gain_to_db_floored(0.0),
        };
        (pipeline, PeriodEvents { rx })
    }

    pub fn prepare(&mut self, sample_rate: f32, samples_per_block: usize) -> Result<(), AnalyzerError> {
        self.analyzer.prepare(sample_rate, samples_per_block)?;
        self.sample_rate = sample_rate;
        self.block_frames = samples_per_block;
        self.meters.set_session(sample_rate, samples_per_block);
        Ok(())
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    pub fn reset(&mut self) {
        self.analyzer.reset();
        self.input_peak_db = gain_to_db_floored(0.0);
        self.output_peak_db = gain_to_db_floored(0.0);
        self.meters.reset();
    }

    pub fn process(&mut self, channels: &mut [&mut [f32]]) -> BlockReport {
        let input_peak = block_peak(channels);
        let report = self.analyzer.process(channels);
        let output_peak = block_peak(channels);

        if report.frames > 0 && report.frames != self.block_frames {
            self.block_frames = report.frames;
            self.meters.set_block_frames(report.frames);
        }

        if report.silenced {
            self.meters.count_silenced_block();
            wg_log!(self.rt_log, "block of {} frames silenced", report.frames);
        }

        if let Some(period) = report.period {
            self.complete_period(period);
        }

        self.update_peaks(input_peak, output_peak, report.frames);
        self.meters
            .set_rms(self.analyzer.last_value(), self.analyzer.last_value_db());
        self.meters.set_gate(self.analyzer.gate());

        report
    }

    fn complete_period(&mut self, period: PeriodEvent) {
        match self.recorder.record(period.sample_index, period.value) {
            Ok(Some(len)) => self.meters.set_envelope_len(len),
            Ok(None) => {}
            Err(EnvelopeError::Busy { .. }) => self.meters.count_busy_append(),
            Err(e) => {
                self.meters.count_rejected_append();
                wg_log!(self.rt_log, "envelope append rejected: {}", e);
            }
        }

        if self.events.push(period).is_err() {
            self.meters.count_dropped_event();
        }
        self.meters.count_period();
    }

    fn update_peaks(&mut self, input_peak: f32, output_peak: f32, frames: usize) {
        let decay = if self.sample_rate > 0.0 {
            PEAK_DECAY_DB_PER_SEC * frames as f32 / self.sample_rate
        } else {
            0.0
        };
        let floor = gain_to_db_floored(0.0);
        self.input_peak_db = gain_to_db_floored(input_peak)
            .max(self.input_peak_db - decay)
            .max(floor);
        self.output_peak_db = gain_to_db_floored(output_peak)
            .max(self.output_peak_db - decay)
            .max(floor);
        self.meters.set_input_peak_db(self.input_peak_db);
        self.meters.set_output_peak_db(self.output_peak_db);
    }
}

/// Starts a new envelope take sized for the current settings and session.
///
/// Called from the editor. The period length uses the block size the host is
/// actually delivering, so it must run after the pipeline was prepared.
pub fn start_recording(recorder: &EnvelopeRecorder, settings: &AnalyzerSettings, meters: &Meters) {
    let rate = envelope_rate(
        meters.get_sample_rate(),
        settings.rms_blocks_length(),
        meters.get_block_frames(),
    );
    recorder.start(rate);
    meters.set_envelope_len(recorder.len());
}

fn block_peak(channels: &[&mut [f32]]) -> f32 {
    let mut peak = 0.0f32;
    for channel in channels {
        for &s in channel.iter() {
            peak = peak.max(s.abs());
        }
    }
    peak
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::rt_log_channel;
    use crate::dsp::{GateState, VolumeAnalyzer};

    struct Rig {
        pipeline: BlockPipeline<VolumeAnalyzer>,
        events: PeriodEvents,
        settings: Arc<AnalyzerSettings>,
        recorder: Arc<EnvelopeRecorder>,
        meters: Arc<Meters>,
    }

    fn rig(threshold: f32, blocks: usize, speed: f32) -> Rig {
        let settings = Arc::new(AnalyzerSettings::new());
        settings.set_threshold(threshold);
        settings.set_rms_blocks_length(blocks);
        settings.set_variation_speed(speed);
        let recorder = Arc::new(EnvelopeRecorder::new());
        let meters = Arc::new(Meters::new());
        let (log, _) = rt_log_channel();
        let (mut pipeline, events) = BlockPipeline::new(
            VolumeAnalyzer::new(settings.clone()),
            recorder.clone(),
            meters.clone(),
            log,
        );
        pipeline.prepare(48000.0, 128).unwrap();
        Rig {
            pipeline,
            events,
            settings,
            recorder,
            meters,
        }
    }

    fn feed(rig: &mut Rig, value: f32) -> (BlockReport, Vec<f32>) {
        let mut l = vec![value; 128];
        let mut r = vec![-value; 128];
        let report = {
            let mut chans: [&mut [f32]; 2] = [&mut l, &mut r];
            rig.pipeline.process(&mut chans)
        };
        (report, l)
    }

    #[test]
    fn test_prepare_rejects_zero_block() {
        let mut r = rig(0.1, 4, 0.5);
        assert_eq!(
            r.pipeline.prepare(48000.0, 0),
            Err(AnalyzerError::InvalidBlockSize(0))
        );
    }

    #[test]
    fn test_envelope_rate() {
        assert!((envelope_rate(48000.0, 4, 128) - 93.75).abs() < 1e-4);
        assert_eq!(envelope_rate(0.0, 4, 128), 0.0);
        assert_eq!(envelope_rate(48000.0, 4, 0), 0.0);
    }

    #[test]
    fn test_envelope_grows_only_while_recording() {
        let mut r = rig(0.1, 2, 0.5);

        for _ in 0..8 {
            feed(&mut r, 0.5);
        }
        assert_eq!(r.recorder.len(), 0);
        assert_eq!(r.meters.get_periods_completed(), 4);

        start_recording(&r.recorder, &r.settings, &r.meters);
        assert!((r.recorder.read(|e| e.sample_rate()) - 187.5).abs() < 1e-3);

        for i in 1..=10 {
            feed(&mut r, 0.5);
            assert_eq!(r.recorder.len(), i / 2);
        }
        assert_eq!(r.meters.get_envelope_len(), 5);

        r.recorder.stop();
        for _ in 0..6 {
            feed(&mut r, 0.5);
        }
        assert_eq!(r.recorder.len(), 5);

        let offsets: Vec<u64> = r.recorder.read(|e| e.iter().map(|n| n.sample).collect());
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(offsets[0], 10 * 128);

        start_recording(&r.recorder, &r.settings, &r.meters);
        assert_eq!(r.recorder.len(), 0);
        assert_eq!(r.meters.get_envelope_len(), 0);
    }

    #[test]
    fn test_envelope_rate_follows_delivered_blocks() {
        let mut r = rig(0.0, 2, 1.0);
        // Host announces 512 but delivers 128
        r.pipeline.prepare(48000.0, 512).unwrap();
        assert_eq!(r.meters.get_block_frames(), 512);
        feed(&mut r, 0.5);
        assert_eq!(r.meters.get_block_frames(), 128);

        start_recording(&r.recorder, &r.settings, &r.meters);
        for _ in 0..20 {
            feed(&mut r, 0.5);
        }
        let (len, secs) = r.recorder.read(|e| (e.len(), e.duration_secs()));
        assert_eq!(len, 10);
        let audio_secs = (20 * 128) as f64 / 48000.0;
        assert!((secs - audio_secs).abs() < 1e-6);
    }

    #[test]
    fn test_contended_append_is_skipped_not_blocked() {
        let mut r = rig(0.0, 1, 1.0);
        start_recording(&r.recorder, &r.settings, &r.meters);
        feed(&mut r, 0.5);
        assert_eq!(r.meters.get_envelope_len(), 1);

        let recorder = r.recorder.clone();
        recorder.read(|_| {
            feed(&mut r, 0.5);
        });
        assert_eq!(r.meters.get_busy_appends(), 1);
        assert_eq!(r.meters.get_rejected_appends(), 0);
        assert_eq!(r.recorder.len(), 1);

        feed(&mut r, 0.5);
        assert_eq!(r.recorder.len(), 2);
        assert_eq!(r.meters.get_envelope_len(), 2);
    }

    #[test]
    fn test_events_follow_periods() {
        let mut r = rig(0.1, 4, 0.5);
        for _ in 0..12 {
            feed(&mut r, 1.0);
        }
        let mut values = Vec::new();
        assert_eq!(r.events.drain(|e| values.push(e.value)), 3);
        assert!((values[0] - 0.5).abs() < 1e-6);
        assert!((values[1] - 0.75).abs() < 1e-6);
        assert!((values[2] - 0.875).abs() < 1e-6);
        assert!(r.events.pop().is_none());
    }

    #[test]
    fn test_gate_applies_to_whole_block() {
        let mut r = rig(0.1, 4, 0.5);
        for _ in 0..4 {
            let (report, out) = feed(&mut r, 1.0);
            assert_eq!(report.gate, GateState::Below);
            assert!(out.iter().all(|&s| s == 0.0));
        }
        assert_eq!(r.meters.get_gate(), GateState::Above);
        assert!((r.meters.get_rms_value() - 0.5).abs() < 1e-6);

        let (report, out) = feed(&mut r, 1.0);
        assert_eq!(report.gate, GateState::Above);
        assert!(out.iter().all(|&s| s == 1.0));
        assert!(r.meters.get_output_peak_db() > -0.01);
    }

    #[test]
    fn test_full_event_queue_is_counted() {
        let mut r = rig(0.0, 1, 1.0);
        for _ in 0..(PERIOD_EVENT_CAPACITY + 5) {
            feed(&mut r, 0.2);
        }
        assert_eq!(r.meters.get_dropped_events(), 5);
        assert_eq!(
            r.meters.get_periods_completed(),
            (PERIOD_EVENT_CAPACITY + 5) as u64
        );
    }

    #[test]
    fn test_silenced_blocks_are_counted() {
        let mut r = rig(0.0, 1, 1.0);
        let mut l = vec![f32::INFINITY; 16];
        {
            let mut chans: [&mut [f32]; 1] = [&mut l];
            r.pipeline.process(&mut chans);
        }
        assert_eq!(r.meters.get_silenced_blocks(), 1);
        assert!(l.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_reset_clears_levels_keeps_envelope() {
        let mut r = rig(0.0, 1, 1.0);
        start_recording(&r.recorder, &r.settings, &r.meters);
        feed(&mut r, 0.5);
        r.pipeline.reset();
        assert_eq!(r.meters.get_rms_value(), 0.0);
        assert_eq!(r.recorder.len(), 1);
        // Counter keeps running so the next node still sorts after the first
        feed(&mut r, 0.5);
        assert_eq!(r.recorder.len(), 2);
    }
}
