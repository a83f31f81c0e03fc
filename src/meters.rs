//! Thread-safe read-outs shared between the audio thread and the editor.
//!
//! Atomic float storage (raw bits in `AtomicU32`) so the editor can poll
//! without locks. Written once per block by the pipeline.

use crate::dsp::utils::SILENCE_DB;
use crate::dsp::GateState;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

pub struct Meters {
    rms_value: AtomicU32,
    rms_db: AtomicU32,
    gate_open: AtomicBool,
    input_peak_db: AtomicU32,
    output_peak_db: AtomicU32,

    frequency_hz: AtomicU32,

    periods_completed: AtomicU64,
    envelope_len: AtomicUsize,
    rejected_appends: AtomicUsize,
    busy_appends: AtomicUsize,
    dropped_events: AtomicUsize,
    silenced_blocks: AtomicUsize,

    // Session info for envelope timing
    sample_rate: AtomicU32,
    samples_per_block: AtomicUsize,
    block_frames: AtomicUsize,
}

impl Default for Meters {
    fn default() -> Self {
        Self {
            rms_value: AtomicU32::new(0.0f32.to_bits()),
            rms_db: AtomicU32::new(SILENCE_DB.to_bits()),
            gate_open: AtomicBool::new(false),
            input_peak_db: AtomicU32::new(SILENCE_DB.to_bits()),
            output_peak_db: AtomicU32::new(SILENCE_DB.to_bits()),
            frequency_hz: AtomicU32::new(0.0f32.to_bits()),
            periods_completed: AtomicU64::new(0),
            envelope_len: AtomicUsize::new(0),
            rejected_appends: AtomicUsize::new(0),
            busy_appends: AtomicUsize::new(0),
            dropped_events: AtomicUsize::new(0),
            silenced_blocks: AtomicUsize::new(0),
            sample_rate: AtomicU32::new(0.0f32.to_bits()),
            samples_per_block: AtomicUsize::new(0),
            block_frames: AtomicUsize::new(0),
        }
    }
}

impl Meters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears level read-outs. Counters and session info are kept.
    pub fn reset(&self) {
        self.set_rms(0.0, SILENCE_DB);
        self.set_gate(GateState::Below);
        self.set_input_peak_db(SILENCE_DB);
        self.set_output_peak_db(SILENCE_DB);
        self.set_frequency(0.0);
    }

    pub fn set_rms(&self, value: f32, db: f32) {
        self.rms_value.store(value.to_bits(), Ordering::Relaxed);
        self.rms_db.store(db.to_bits(), Ordering::Relaxed);
    }

    pub fn set_gate(&self, gate: GateState) {
        self.gate_open.store(gate.is_open(), Ordering::Relaxed);
    }

    pub fn set_input_peak_db(&self, val: f32) {
        self.input_peak_db.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn set_output_peak_db(&self, val: f32) {
        self.output_peak_db.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn set_frequency(&self, hz: f32) {
        self.frequency_hz.store(hz.to_bits(), Ordering::Relaxed);
    }

    pub fn set_envelope_len(&self, len: usize) {
        self.envelope_len.store(len, Ordering::Relaxed);
    }

    pub fn set_session(&self, sample_rate: f32, samples_per_block: usize) {
        self.sample_rate.store(sample_rate.to_bits(), Ordering::Relaxed);
        self.samples_per_block
            .store(samples_per_block, Ordering::Relaxed);
        self.block_frames.store(samples_per_block, Ordering::Relaxed);
    }

    /// Length of the blocks the host actually delivers, which may be below the maximum.
    pub fn set_block_frames(&self, frames: usize) {
        self.block_frames.store(frames, Ordering::Relaxed);
    }

    pub fn count_period(&self) {
        self.periods_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_rejected_append(&self) {
        self.rejected_appends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_busy_append(&self) {
        self.busy_appends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_dropped_event(&self) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_silenced_block(&self) {
        self.silenced_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_rms_value(&self) -> f32 {
        f32::from_bits(self.rms_value.load(Ordering::Relaxed))
    }

    pub fn get_rms_db(&self) -> f32 {
        f32::from_bits(self.rms_db.load(Ordering::Relaxed))
    }

    pub fn get_gate(&self) -> GateState {
        if self.gate_open.load(Ordering::Relaxed) {
            GateState::Above
        } else {
            GateState::Below
        }
    }

    pub fn get_input_peak_db(&self) -> f32 {
        f32::from_bits(self.input_peak_db.load(Ordering::Relaxed))
    }

    pub fn get_output_peak_db(&self) -> f32 {
        f32::from_bits(self.output_peak_db.load(Ordering::Relaxed))
    }

    pub fn get_frequency(&self) -> f32 {
        f32::from_bits(self.frequency_hz.load(Ordering::Relaxed))
    }

    /// Monotonic; poll and compare to detect new periods.
    pub fn get_periods_completed(&self) -> u64 {
        self.periods_completed.load(Ordering::Relaxed)
    }

    pub fn get_envelope_len(&self) -> usize {
        self.envelope_len.load(Ordering::Relaxed)
    }

    pub fn get_rejected_appends(&self) -> usize {
        self.rejected_appends.load(Ordering::Relaxed)
    }

    pub fn get_busy_appends(&self) -> usize {
        self.busy_appends.load(Ordering::Relaxed)
    }

    pub fn get_dropped_events(&self) -> usize {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn get_silenced_blocks(&self) -> usize {
        self.silenced_blocks.load(Ordering::Relaxed)
    }

    pub fn get_sample_rate(&self) -> f32 {
        f32::from_bits(self.sample_rate.load(Ordering::Relaxed))
    }

    pub fn get_samples_per_block(&self) -> usize {
        self.samples_per_block.load(Ordering::Relaxed)
    }

    pub fn get_block_frames(&self) -> usize {
        self.block_frames.load(Ordering::Relaxed)
    }
}
