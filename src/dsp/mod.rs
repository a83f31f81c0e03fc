pub mod frequency_analyzer;
pub mod settings;
pub mod utils;
pub mod volume_analyzer;

pub use frequency_analyzer::FrequencyAnalyzer;
pub use settings::{blocks_from_millis, AnalyzerSettings, SettingsSnapshot, SpectrumSettings};
pub use volume_analyzer::VolumeAnalyzer;

use std::fmt;

/// Which measurement an analyzer produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalyzerKind {
    Volume,
    Frequency,
}

impl AnalyzerKind {
    /// Stable address used to label the analyzer's output stream.
    pub fn address(&self) -> &'static str {
        match self {
            AnalyzerKind::Volume => "/volume",
            AnalyzerKind::Frequency => "/frequency",
        }
    }
}

/// Block-level pass/mute decision.
///
/// Only changes at the end of an integration period; every block in between
/// is gated the same way.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GateState {
    #[default]
    Below,
    Above,
}

impl GateState {
    pub fn evaluate(value: f32, threshold: f32) -> Self {
        if value >= threshold {
            GateState::Above
        } else {
            GateState::Below
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, GateState::Above)
    }
}

/// Rejected `prepare` arguments.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnalyzerError {
    InvalidSampleRate(f32),
    InvalidBlockSize(usize),
}

impl fmt::Display for AnalyzerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyzerError::InvalidSampleRate(sr) => {
                write!(f, "sample rate must be positive and finite, got {sr}")
            }
            AnalyzerError::InvalidBlockSize(n) => {
                write!(f, "samples per block must be non-zero, got {n}")
            }
        }
    }
}

impl std::error::Error for AnalyzerError {}

/// Emitted once per completed integration period (or analysis frame).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeriodEvent {
    /// Total samples processed when the period closed.
    pub sample_index: u64,
    /// Unsmoothed measurement: clamped RMS, or the dominant frequency in Hz.
    pub raw_value: f32,
    /// Smoothed value after this period.
    pub value: f32,
    /// Gate state for the blocks that follow.
    pub gate: GateState,
}

/// What happened to one block.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BlockReport {
    pub frames: usize,
    /// Gate applied to this block.
    pub gate: GateState,
    /// Block was dropped (non-finite samples or unprepared analyzer) and silenced.
    pub silenced: bool,
    pub period: Option<PeriodEvent>,
}

/// A streaming analyzer driven once per audio block.
///
/// `process` works in place: on return `channels` holds the gated output,
/// same shape as the input.
pub trait Analyzer {
    fn kind(&self) -> AnalyzerKind;

    fn prepare(&mut self, sample_rate: f32, samples_per_block: usize)
        -> Result<(), AnalyzerError>;

    fn is_prepared(&self) -> bool;

    fn process(&mut self, channels: &mut [&mut [f32]]) -> BlockReport;

    /// Clears accumulation and smoothing. The sample counter keeps running.
    fn reset(&mut self);

    fn last_value(&self) -> f32;

    fn last_value_db(&self) -> f32 {
        utils::gain_to_db_floored(self.last_value())
    }

    fn gate(&self) -> GateState;

    fn sample_index(&self) -> u64;
}
