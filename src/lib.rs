pub mod debug;
pub mod dsp;
pub mod envelope;
pub mod meters;
pub mod pipeline;
mod ui;

use crate::debug::{rt_log_channel, RtLogDrain};
use crate::dsp::settings::{
    DEFAULT_FFT_SPEED, DEFAULT_MAX_FREQUENCY, DEFAULT_MIN_FREQUENCY, DEFAULT_THRESHOLD,
    DEFAULT_VARIATION_SPEED, MAX_FREQUENCY_HZ, MAX_THRESHOLD, MIN_FREQUENCY_HZ,
};
use crate::dsp::utils::gain_to_db_floored;
use crate::dsp::{
    blocks_from_millis, Analyzer, AnalyzerSettings, FrequencyAnalyzer, SpectrumSettings,
    VolumeAnalyzer,
};
use crate::envelope::EnvelopeRecorder;
use crate::meters::Meters;
use crate::pipeline::{BlockPipeline, PeriodEvents};
use nih_plug::prelude::*;
use nih_plug_vizia::{create_vizia_editor, ViziaState, ViziaTheming};
use std::sync::{Arc, Mutex};
use ui::{build_ui, EditorHandles};

const DEFAULT_SAMPLE_RATE: f32 = 44100.0;
const DEFAULT_BLOCK_SIZE: usize = 512;

/// Default integration length shown to the user.
const DEFAULT_RMS_LENGTH_MS: f32 = 40.0;
const MIN_RMS_LENGTH_MS: f32 = 1.0;
const MAX_RMS_LENGTH_MS: f32 = 250.0;

// -----------------------------------------------------------------------------
// PARAMETERS
// -----------------------------------------------------------------------------
#[derive(Params)]
pub struct WhooshParams {
    /// Gate threshold, linear amplitude.
    #[id = "threshold"]
    pub threshold: FloatParam,

    /// Integration length in milliseconds, rounded down to whole blocks.
    #[id = "rms_length"]
    pub rms_length: FloatParam,

    #[id = "volume_speed"]
    pub volume_speed: FloatParam,

    /// Lower edge of the dominant-frequency search band, Hz.
    #[id = "min_frequency"]
    pub min_frequency: FloatParam,

    #[id = "max_frequency"]
    pub max_frequency: FloatParam,

    #[id = "fft_speed"]
    pub fft_speed: FloatParam,
}

fn format_percent(v: f32) -> String {
    format!("{:.0}%", v * 100.0)
}

fn format_threshold(v: f32) -> String {
    let db = gain_to_db_floored(v);
    if db <= dsp::utils::SILENCE_DB {
        "-inf dB".to_string()
    } else {
        format!("{:.1} dB", db)
    }
}

fn format_ms(v: f32) -> String {
    format!("{:.0} ms", v)
}

fn format_hz(v: f32) -> String {
    if v >= 1000.0 {
        format!("{:.2} kHz", v / 1000.0)
    } else {
        format!("{:.0} Hz", v)
    }
}

fn frequency_param(name: &str, default: f32) -> FloatParam {
    FloatParam::new(
        name,
        default,
        FloatRange::Skewed {
            min: MIN_FREQUENCY_HZ,
            max: MAX_FREQUENCY_HZ,
            factor: FloatRange::skew_factor(-2.0),
        },
    )
    .with_value_to_string(Arc::new(format_hz))
}

impl Default for WhooshParams {
    fn default() -> Self {
        Self {
            threshold: FloatParam::new(
                "Threshold",
                DEFAULT_THRESHOLD,
                FloatRange::Linear {
                    min: 0.0,
                    max: MAX_THRESHOLD,
                },
            )
            .with_value_to_string(Arc::new(format_threshold)),

            rms_length: FloatParam::new(
                "RMS Length",
                DEFAULT_RMS_LENGTH_MS,
                FloatRange::Skewed {
                    min: MIN_RMS_LENGTH_MS,
                    max: MAX_RMS_LENGTH_MS,
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_value_to_string(Arc::new(format_ms)),

            volume_speed: FloatParam::new(
                "Volume Speed",
                DEFAULT_VARIATION_SPEED,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_value_to_string(Arc::new(format_percent)),

            min_frequency: frequency_param("Min Frequency", DEFAULT_MIN_FREQUENCY),
            max_frequency: frequency_param("Max Frequency", DEFAULT_MAX_FREQUENCY),

            fft_speed: FloatParam::new(
                "FFT Speed",
                DEFAULT_FFT_SPEED,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_value_to_string(Arc::new(format_percent)),
        }
    }
}

// -----------------------------------------------------------------------------
// PLUGIN STRUCT
// -----------------------------------------------------------------------------
struct WhooshPlugin {
    params: Arc<WhooshParams>,
    editor_state: Arc<ViziaState>,

    settings: Arc<AnalyzerSettings>,
    spectrum: Arc<SpectrumSettings>,
    recorder: Arc<EnvelopeRecorder>,
    meters: Arc<Meters>,
    pipeline: BlockPipeline<VolumeAnalyzer>,
    frequency: FrequencyAnalyzer,

    // Editor ends of the audio-thread queues
    period_events: Arc<Mutex<PeriodEvents>>,
    rt_log_drain: Arc<Mutex<RtLogDrain>>,

    sample_rate: f32,
    max_block_size: usize,
}

impl Default for WhooshPlugin {
    fn default() -> Self {
        let settings = Arc::new(AnalyzerSettings::new());
        let spectrum = Arc::new(SpectrumSettings::new());
        let recorder = Arc::new(EnvelopeRecorder::new());
        let meters = Arc::new(Meters::new());
        let (rt_log, rt_log_drain) = rt_log_channel();
        let (pipeline, period_events) = BlockPipeline::new(
            VolumeAnalyzer::new(settings.clone()),
            recorder.clone(),
            meters.clone(),
            rt_log,
        );

        Self {
            params: Arc::new(WhooshParams::default()),
            editor_state: ViziaState::new(|| (720, 580)),
            settings,
            frequency: FrequencyAnalyzer::new(spectrum.clone()),
            spectrum,
            recorder,
            meters,
            pipeline,
            period_events: Arc::new(Mutex::new(period_events)),
            rt_log_drain: Arc::new(Mutex::new(rt_log_drain)),
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl WhooshPlugin {
    /// Mirrors host parameters into the analyzers' atomic knobs.
    ///
    /// `block_len` is the block being processed; the integration length is
    /// counted in blocks of that size.
    fn sync_settings(&self, block_len: usize) {
        let block_len = if block_len == 0 {
            self.max_block_size
        } else {
            block_len
        };
        self.settings.set_threshold(self.params.threshold.value());
        self.settings.set_rms_blocks_length(blocks_from_millis(
            self.sample_rate,
            self.params.rms_length.value(),
            block_len,
        ));
        self.settings
            .set_variation_speed(self.params.volume_speed.value());

        self.spectrum
            .set_min_frequency(self.params.min_frequency.value());
        self.spectrum
            .set_max_frequency(self.params.max_frequency.value());
        self.spectrum.set_fft_speed(self.params.fft_speed.value());
    }
}

impl Plugin for WhooshPlugin {
    const NAME: &'static str = "Whoosh Generator";
    const VENDOR: &'static str = "Whoosh Generator";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            ..AudioIOLayout::const_default()
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            ..AudioIOLayout::const_default()
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        self.sample_rate = buffer_config.sample_rate;
        self.max_block_size = buffer_config.max_buffer_size as usize;

        let prepared = self
            .pipeline
            .prepare(self.sample_rate, self.max_block_size)
            .and_then(|()| self.frequency.prepare(self.sample_rate, self.max_block_size));

        match prepared {
            Ok(()) => {
                self.sync_settings(self.max_block_size);
                log::info!(
                    "prepared at {} Hz, {} samples per block, {} blocks per period",
                    self.sample_rate,
                    self.max_block_size,
                    self.settings.rms_blocks_length()
                );
                true
            }
            Err(e) => {
                log::error!("refusing to initialize: {e}");
                false
            }
        }
    }

    fn editor(&mut self, _async_executor: AsyncExecutor<Self>) -> Option<Box<dyn Editor>> {
        let handles = EditorHandles {
            params: self.params.clone(),
            settings: self.settings.clone(),
            recorder: self.recorder.clone(),
            meters: self.meters.clone(),
            period_events: self.period_events.clone(),
            rt_log_drain: self.rt_log_drain.clone(),
        };
        create_vizia_editor(
            self.editor_state.clone(),
            ViziaTheming::default(),
            move |cx, gui_context| {
                build_ui(cx, handles.clone(), gui_context);
            },
        )
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        self.sync_settings(buffer.samples());
        let channels = buffer.as_slice();
        self.pipeline.process(channels);
        // Observes the gated output, never alters it
        if self.frequency.process(channels).period.is_some() {
            self.meters.set_frequency(self.frequency.last_value());
        }
        ProcessStatus::Normal
    }

    fn reset(&mut self) {
        self.pipeline.reset();
        self.frequency.reset();
    }
}

impl ClapPlugin for WhooshPlugin {
    const CLAP_ID: &'static str = "com.whoosh-generator.whoosh";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("RMS follower with a threshold gate and a recordable loudness envelope");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Analyzer,
        ClapFeature::Stereo,
        ClapFeature::Mono,
    ];
}

impl Vst3Plugin for WhooshPlugin {
    const VST3_CLASS_ID: [u8; 16] = *b"WhooshGenerator1";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Analyzer];
}

nih_export_clap!(WhooshPlugin);
nih_export_vst3!(WhooshPlugin);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_defaults() {
        let params = WhooshParams::default();
        assert_eq!(params.threshold.value(), DEFAULT_THRESHOLD);
        assert_eq!(params.volume_speed.value(), DEFAULT_VARIATION_SPEED);
        assert_eq!(params.rms_length.value(), DEFAULT_RMS_LENGTH_MS);
    }

    #[test]
    fn test_sync_settings_maps_length_to_blocks() {
        let mut plugin = WhooshPlugin::default();
        plugin.sample_rate = 48000.0;
        plugin.max_block_size = 480;
        plugin.sync_settings(480);
        // 40 ms at 48 kHz is 1920 samples, four blocks of 480
        assert_eq!(plugin.settings.rms_blocks_length(), 4);
        assert_eq!(plugin.settings.threshold(), DEFAULT_THRESHOLD);

        // Smaller delivered blocks keep the period near 40 ms
        plugin.sync_settings(240);
        assert_eq!(plugin.settings.rms_blocks_length(), 8);
        plugin.sync_settings(0);
        assert_eq!(plugin.settings.rms_blocks_length(), 4);

        assert_eq!(plugin.spectrum.min_frequency(), DEFAULT_MIN_FREQUENCY);
        assert_eq!(plugin.spectrum.fft_speed(), DEFAULT_FFT_SPEED);
    }

    #[test]
    fn test_threshold_formatting() {
        assert_eq!(format_threshold(0.0), "-inf dB");
        assert_eq!(format_threshold(0.5), "-6.0 dB");
        assert_eq!(format_hz(440.0), "440 Hz");
        assert_eq!(format_hz(2500.0), "2.50 kHz");
    }
}
