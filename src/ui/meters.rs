//! Custom views for the loudness read-outs.
//!
//! The data lives in `crate::meters` and `crate::envelope`; these views only
//! read it when drawing.

use crate::dsp::utils::gain_to_db_floored;
use crate::dsp::AnalyzerSettings;
use crate::envelope::EnvelopeRecorder;
use crate::meters::Meters;
use nih_plug_vizia::vizia::prelude::*;
use nih_plug_vizia::vizia::vg;
use std::sync::Arc;

/// Bottom of the meter scale.
const METER_FLOOR_DB: f32 = -60.0;

/// Nodes drawn by the envelope strip, newest last.
const ENVELOPE_VISIBLE_NODES: usize = 600;

fn db_to_norm(db: f32) -> f32 {
    ((db - METER_FLOOR_DB) / -METER_FLOOR_DB).clamp(0.0, 1.0)
}

// ============================================================================
// RMS METER
// ============================================================================

pub struct RmsMeter {
    meters: Arc<Meters>,
    settings: Arc<AnalyzerSettings>,
}

impl RmsMeter {
    pub fn new(
        cx: &mut Context,
        meters: Arc<Meters>,
        settings: Arc<AnalyzerSettings>,
    ) -> Handle<'_, Self> {
        Self { meters, settings }.build(cx, |_| {})
    }
}

impl View for RmsMeter {
    fn element(&self) -> Option<&'static str> {
        Some("rms-meter")
    }

    fn draw(&self, cx: &mut DrawContext, canvas: &mut Canvas) {
        let b = cx.bounds();
        let level = db_to_norm(self.meters.get_rms_db());
        let threshold = db_to_norm(gain_to_db_floored(self.settings.threshold()));
        let open = self.meters.get_gate().is_open();

        let mut bg = vg::Path::new();
        bg.rect(b.x, b.y, b.w, b.h);
        canvas.fill_path(&bg, &vg::Paint::color(vg::Color::rgb(15, 23, 42)));

        if level > 0.001 {
            let fw = b.w * level;
            let mut f = vg::Path::new();
            f.rect(b.x, b.y + 1.0, fw, b.h - 2.0);
            let paint = vg::Paint::linear_gradient(
                b.x,
                b.y,
                b.x + b.w,
                b.y,
                vg::Color::rgb(34, 197, 94),
                vg::Color::rgb(239, 68, 68),
            );
            canvas.fill_path(&f, &paint);
        }

        // threshold marker
        let tx = b.x + b.w * threshold;
        let mut t = vg::Path::new();
        t.move_to(tx, b.y);
        t.line_to(tx, b.y + b.h);
        canvas.stroke_path(
            &t,
            &vg::Paint::color(vg::Color::rgb(250, 204, 21)).with_line_width(2.0),
        );

        // gate LED on the right edge
        let radius = (b.h / 2.0 - 3.0).max(2.0);
        let mut led = vg::Path::new();
        led.circle(b.x + b.w - radius - 3.0, b.y + b.h / 2.0, radius);
        let led_color = if open {
            vg::Color::rgb(34, 225, 94)
        } else {
            vg::Color::rgb(20, 83, 45)
        };
        canvas.fill_path(&led, &vg::Paint::color(led_color));

        canvas.stroke_path(
            &bg,
            &vg::Paint::color(vg::Color::rgb(51, 65, 85)).with_line_width(1.0),
        );
    }
}

// ============================================================================
// ENVELOPE STRIP
// ============================================================================

pub struct EnvelopeStrip {
    recorder: Arc<EnvelopeRecorder>,
}

impl EnvelopeStrip {
    pub fn new(cx: &mut Context, recorder: Arc<EnvelopeRecorder>) -> Handle<'_, Self> {
        Self { recorder }.build(cx, |_| {})
    }
}

impl View for EnvelopeStrip {
    fn element(&self) -> Option<&'static str> {
        Some("envelope-strip")
    }

    fn draw(&self, cx: &mut DrawContext, canvas: &mut Canvas) {
        let b = cx.bounds();

        let mut bg = vg::Path::new();
        bg.rounded_rect(b.x, b.y, b.w, b.h, 3.0);
        canvas.fill_path(&bg, &vg::Paint::color(vg::Color::rgb(30, 41, 59)));

        // Build the path under one lock, draw after releasing it
        let line = self.recorder.read(|env| {
            let nodes = env.nodes();
            if nodes.len() < 2 {
                return None;
            }
            let start = nodes.len().saturating_sub(ENVELOPE_VISIBLE_NODES);
            let visible = &nodes[start..];
            let peak = visible.iter().fold(1e-6f32, |m, n| m.max(n.value));
            let step = b.w / (visible.len() - 1) as f32;

            let mut path = vg::Path::new();
            for (i, node) in visible.iter().enumerate() {
                let x = b.x + i as f32 * step;
                let y = b.y + b.h - (node.value / peak).clamp(0.0, 1.0) * (b.h - 4.0) - 2.0;
                if i == 0 {
                    path.move_to(x, y);
                } else {
                    path.line_to(x, y);
                }
            }
            Some(path)
        });

        if let Some(path) = line {
            canvas.stroke_path(
                &path,
                &vg::Paint::color(vg::Color::rgb(56, 189, 248)).with_line_width(1.5),
            );
        }

        canvas.stroke_path(
            &bg,
            &vg::Paint::color(vg::Color::rgb(71, 85, 105)).with_line_width(1.0),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_to_norm() {
        assert_eq!(db_to_norm(0.0), 1.0);
        assert_eq!(db_to_norm(-60.0), 0.0);
        assert_eq!(db_to_norm(-100.0), 0.0);
        assert!((db_to_norm(-30.0) - 0.5).abs() < 1e-6);
    }
}
