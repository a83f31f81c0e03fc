//! Whoosh Generator editor
//!
//! - `state`: data model and events
//! - `components`: slider and button builders
//! - `meters`: custom level and envelope views
//! - `layout`: top-level layout, stylesheet, refresh timer

pub mod components;
pub mod layout;
pub mod meters;
pub mod state;

use crate::debug::RtLogDrain;
use crate::dsp::AnalyzerSettings;
use crate::envelope::EnvelopeRecorder;
use crate::meters::Meters;
use crate::pipeline::PeriodEvents;
use crate::WhooshParams;
use std::sync::{Arc, Mutex};

pub use layout::build_ui;

/// Everything the editor shares with the plugin.
#[derive(Clone)]
pub struct EditorHandles {
    pub params: Arc<WhooshParams>,
    pub settings: Arc<AnalyzerSettings>,
    pub recorder: Arc<EnvelopeRecorder>,
    pub meters: Arc<Meters>,
    pub period_events: Arc<Mutex<PeriodEvents>>,
    pub rt_log_drain: Arc<Mutex<RtLogDrain>>,
}
