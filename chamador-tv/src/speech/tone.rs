//! Tone output for the beep fallback
//!
//! [`EventToneSink`] asks the connected page to play the tone.
//! `CpalToneSink` (feature `tone`) plays it on the local output device.

use super::ToneSink;
use chamador_common::events::{ChamadorEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;

/// Publishes `ToneRequested` for the page to synthesize
pub struct EventToneSink {
    bus: Arc<EventBus>,
}

impl EventToneSink {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

impl ToneSink for EventToneSink {
    fn tone(&self, frequency_hz: f32, duration: Duration) -> bool {
        // The request is fire-and-forget; with no page there is nothing to fail
        self.bus.emit_lossy(ChamadorEvent::ToneRequested {
            frequency_hz,
            duration_ms: duration.as_millis() as u64,
            timestamp: chrono::Utc::now(),
        });
        true
    }
}

#[cfg(feature = "tone")]
pub use local::CpalToneSink;

#[cfg(feature = "tone")]
mod local {
    use super::ToneSink;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, StreamConfig};
    use std::time::Duration;
    use tracing::warn;

    /// Gain applied to the generated sine
    const TONE_AMPLITUDE: f32 = 0.2;

    /// Sine tones on the default output device
    ///
    /// Each tone opens its own output stream on a short-lived thread; cpal
    /// streams are not `Send` on every platform.
    #[derive(Debug, Default)]
    pub struct CpalToneSink;

    impl CpalToneSink {
        pub fn new() -> Self {
            Self
        }

        /// True when a default output device exists
        pub fn probe() -> bool {
            cpal::default_host().default_output_device().is_some()
        }
    }

    impl ToneSink for CpalToneSink {
        fn tone(&self, frequency_hz: f32, duration: Duration) -> bool {
            if !Self::probe() {
                return false;
            }
            std::thread::spawn(move || {
                if let Err(e) = play_sine(frequency_hz, duration) {
                    warn!("Tone playback failed: {}", e);
                }
            });
            true
        }
    }

    fn play_sine(frequency_hz: f32, duration: Duration) -> Result<(), String> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| "no output device".to_string())?;
        let supported = device
            .default_output_config()
            .map_err(|e| e.to_string())?;
        if supported.sample_format() != SampleFormat::F32 {
            return Err(format!(
                "unsupported sample format {:?}",
                supported.sample_format()
            ));
        }

        let config: StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0 as f32;
        let channels = config.channels as usize;
        let step = frequency_hz * 2.0 * std::f32::consts::PI / sample_rate;
        let mut phase = 0.0f32;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let value = phase.sin() * TONE_AMPLITUDE;
                        phase = (phase + step) % (2.0 * std::f32::consts::PI);
                        for sample in frame.iter_mut() {
                            *sample = value;
                        }
                    }
                },
                |err| warn!("Tone stream error: {}", err),
                None,
            )
            .map_err(|e| e.to_string())?;

        stream.play().map_err(|e| e.to_string())?;
        std::thread::sleep(duration);
        Ok(())
    }
}
