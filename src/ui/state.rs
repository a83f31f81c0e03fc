//! Data model and events for the editor.

use crate::WhooshParams;
use nih_plug_vizia::vizia::prelude::*;
use std::sync::Arc;

#[derive(Lens, Clone)]
pub struct WhooshData {
    pub params: Arc<WhooshParams>,
    pub recording: bool,
    pub envelope_len: usize,
    pub envelope_secs: f32,
    pub last_db: f32,
    /// Bumped by every refresh so the custom views rebuild and redraw.
    pub tick: u64,
}

#[derive(Debug, Clone)]
pub enum WhooshEvent {
    Refresh {
        envelope_len: usize,
        envelope_secs: f32,
        last_db: f32,
    },
    RecordingChanged(bool),
}

impl Model for WhooshData {
    fn event(&mut self, cx: &mut EventContext, event: &mut Event) {
        event.map(|whoosh_event, _| match whoosh_event {
            WhooshEvent::Refresh {
                envelope_len,
                envelope_secs,
                last_db,
            } => {
                self.envelope_len = *envelope_len;
                self.envelope_secs = *envelope_secs;
                self.last_db = *last_db;
                self.tick = self.tick.wrapping_add(1);
                cx.needs_redraw();
            }
            WhooshEvent::RecordingChanged(on) => self.recording = *on,
        });
    }
}
