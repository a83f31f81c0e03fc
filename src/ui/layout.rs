//! Top-level layout, stylesheet and refresh timer.

use crate::dsp::settings::millis_from_blocks;
use crate::dsp::utils::gain_to_db_floored;
use crate::pipeline::start_recording;
use crate::ui::components::{create_slider, create_toggle_button};
use crate::ui::meters::{EnvelopeStrip, RmsMeter};
use crate::ui::state::{WhooshData, WhooshEvent};
use crate::ui::EditorHandles;
use nih_plug::prelude::GuiContext;
use nih_plug_vizia::vizia::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const EXPORT_FILE_NAME: &str = "whoosh_envelope.json";

/// Editor refresh period, about 30 frames per second.
const REFRESH_INTERVAL: Duration = Duration::from_millis(33);

const STYLE: &str = r#"
    .app-root {
        background-color: #0f172a;
        color: #e2e8f0;
        child-space: 16px;
        row-between: 12px;
    }

    .header {
        height: 48px;
        col-between: 12px;
        child-top: 1s;
        child-bottom: 1s;
    }

    .header-title {
        font-size: 20px;
        font-weight: bold;
        color: #ffffff;
    }

    .header-sub {
        font-size: 12px;
        color: #94a3b8;
    }

    .slider-row {
        height: 32px;
        col-between: 10px;
        child-top: 1s;
        child-bottom: 1s;
    }

    .slider-label {
        width: 110px;
        font-size: 12px;
        color: #cbd5e1;
    }

    .slider {
        width: 1s;
        height: 24px;
    }

    .slider-value {
        width: 80px;
        font-size: 12px;
        color: #94a3b8;
    }

    .record-button, .record-button-active {
        width: 140px;
        height: 30px;
        border-radius: 6px;
        border: 1px solid #334155;
        child-space: 1s;
        font-size: 12px;
    }

    .record-button {
        background-color: #1e293b;
    }

    .record-button-active {
        background-color: #b91c1c;
        border: 1px solid #ef4444;
        color: #ffffff;
    }

    .rms-meter {
        height: 22px;
        width: 1s;
    }

    .envelope-strip {
        height: 1s;
        width: 1s;
    }

    .status {
        font-size: 11px;
        color: #94a3b8;
        height: 18px;
    }
"#;

/// Export target: next to the plugin binary, or the temp dir when that is unknown.
fn export_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(EXPORT_FILE_NAME)))
        .unwrap_or_else(|| std::env::temp_dir().join(EXPORT_FILE_NAME))
}

pub fn build_header(cx: &mut Context, handles: EditorHandles) -> Handle<'_, HStack> {
    HStack::new(cx, move |cx| {
        VStack::new(cx, |cx| {
            Label::new(cx, "WHOOSH GENERATOR").class("header-title");
            Label::new(cx, "RMS gate and envelope recorder").class("header-sub");
        });

        Element::new(cx).width(Stretch(1.0));

        let recorder = handles.recorder.clone();
        Binding::new(cx, WhooshData::recording, move |cx, lens| {
            let recording = lens.get(cx);
            let h = handles.clone();
            create_toggle_button(
                cx,
                if recording { "Stop Recording" } else { "Record" },
                recording,
                move |cx| {
                    if h.recorder.is_recording() {
                        h.recorder.stop();
                        cx.emit(WhooshEvent::RecordingChanged(false));
                    } else {
                        start_recording(&h.recorder, &h.settings, &h.meters);
                        cx.emit(WhooshEvent::RecordingChanged(true));
                    }
                },
            );
        });

        Button::new(
            cx,
            move |_| {
                let path = export_path();
                if let Err(e) = recorder.export_json(&path) {
                    log::error!("envelope export failed: {e:#}");
                }
            },
            |cx| Label::new(cx, "Export JSON"),
        )
        .class("record-button");
    })
    .class("header")
}

pub fn build_controls(cx: &mut Context) -> Handle<'_, VStack> {
    VStack::new(cx, |cx| {
        create_slider(cx, "Threshold", |p| &p.threshold);
        create_slider(cx, "RMS Length", |p| &p.rms_length);
        create_slider(cx, "Volume Speed", |p| &p.volume_speed);
        create_slider(cx, "Min Frequency", |p| &p.min_frequency);
        create_slider(cx, "Max Frequency", |p| &p.max_frequency);
        create_slider(cx, "FFT Speed", |p| &p.fft_speed);
    })
    .height(Auto)
}

pub fn build_levels(cx: &mut Context, handles: EditorHandles) -> Handle<'_, VStack> {
    VStack::new(cx, move |cx| {
        let h = handles.clone();
        Binding::new(cx, WhooshData::tick, move |cx, _| {
            RmsMeter::new(cx, h.meters.clone(), h.settings.clone()).class("rms-meter");
        });

        Label::new(
            cx,
            WhooshData::last_db.map(|db| format!("RMS {:.1} dB", db)),
        )
        .class("status");

        let h = handles.clone();
        Binding::new(cx, WhooshData::tick, move |cx, _| {
            EnvelopeStrip::new(cx, h.recorder.clone()).class("envelope-strip");
        });

        Label::new(
            cx,
            WhooshData::envelope_len.map(|n| format!("{} envelope nodes", n)),
        )
        .class("status");
        Label::new(
            cx,
            WhooshData::envelope_secs.map(|s| format!("{:.2} s recorded", s)),
        )
        .class("status");

        let m = handles.meters.clone();
        let s = handles.settings.clone();
        Binding::new(cx, WhooshData::tick, move |cx, _| {
            let period_ms = millis_from_blocks(
                m.get_sample_rate(),
                s.rms_blocks_length(),
                m.get_block_frames(),
            );
            Label::new(
                cx,
                &format!(
                    "period {} blocks ({:.1} ms), {} periods",
                    s.rms_blocks_length(),
                    period_ms,
                    m.get_periods_completed()
                ),
            )
            .class("status");
            Label::new(
                cx,
                &format!(
                    "in {:.1} dB  out {:.1} dB  silenced {}  dropped {}  rejected {}  busy {}",
                    m.get_input_peak_db(),
                    m.get_output_peak_db(),
                    m.get_silenced_blocks(),
                    m.get_dropped_events(),
                    m.get_rejected_appends(),
                    m.get_busy_appends()
                ),
            )
            .class("status");
            Label::new(cx, &format!("dominant {:.0} Hz", m.get_frequency()))
                .class("status");
        });
    })
    .height(Stretch(1.0))
}

pub fn build_ui(cx: &mut Context, handles: EditorHandles, _gui_context: Arc<dyn GuiContext>) {
    if let Err(e) = cx.add_stylesheet(STYLE) {
        log::warn!("editor stylesheet failed to load: {:?}", e);
    }

    WhooshData {
        params: handles.params.clone(),
        recording: handles.recorder.is_recording(),
        envelope_len: handles.recorder.len(),
        envelope_secs: 0.0,
        last_db: handles.meters.get_rms_db(),
        tick: 0,
    }
    .build(cx);

    let h = handles.clone();
    let timer = cx.add_timer(REFRESH_INTERVAL, None, move |cx, action| {
        if let TimerAction::Tick(_) = action {
            let mut latest = None;
            if let Ok(mut events) = h.period_events.lock() {
                events.drain(|e| latest = Some(e.value));
            }
            if let Ok(mut drain) = h.rt_log_drain.lock() {
                drain.drain();
            }
            let (envelope_len, envelope_secs) = h
                .recorder
                .read(|env| (env.len(), env.duration_secs() as f32));
            cx.emit(WhooshEvent::Refresh {
                envelope_len,
                envelope_secs,
                last_db: latest
                    .map(gain_to_db_floored)
                    .unwrap_or_else(|| h.meters.get_rms_db()),
            });
        }
    });
    cx.start_timer(timer);

    VStack::new(cx, move |cx| {
        build_header(cx, handles.clone());
        build_controls(cx);
        build_levels(cx, handles.clone());
    })
    .class("app-root");
}
