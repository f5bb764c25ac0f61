//! Operating configuration and its resolution from stored documents
//!
//! Stored documents are partial and may hold wrong-typed values. Resolution
//! is field by field: a present, well-typed value wins, anything else takes
//! the built-in default for that field alone. Nothing here ever fails.

use chamador_common::feed::ConfigSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};
use tracing::debug;

pub const DEFAULT_VOICE_TEMPLATE: &str =
    "Atenção: paciente {{nome}}. Por favor, dirija-se ao consultório{{salaTxt}}.";
pub const DEFAULT_DUCK_VOLUME: u8 = 20;
pub const DEFAULT_RESTORE_VOLUME: u8 = 60;
pub const DEFAULT_LEAD_MS: u64 = 450;
pub const DEFAULT_IDLE_SECONDS: u32 = 120;
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "#44b2e7";
pub const DEFAULT_VOICE_LOCALE: &str = "pt-BR";

pub const MIN_IDLE_SECONDS: u32 = 60;
pub const MAX_IDLE_SECONDS: u32 = 300;
pub const MAX_LEAD_MS: u64 = 3_000;

/// Which speech backend the operator asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnnounceMode {
    /// Native, then browser, then beep
    #[default]
    Auto,
    /// Native speech bridge only (beep if it fails)
    Fully,
    /// Browser speech only (beep if it fails)
    Web,
    /// Never speak, always beep
    Beep,
}

impl AnnounceMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(AnnounceMode::Auto),
            "fully" => Some(AnnounceMode::Fully),
            "web" => Some(AnnounceMode::Web),
            "beep" => Some(AnnounceMode::Beep),
            _ => None,
        }
    }
}

impl std::fmt::Display for AnnounceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnnounceMode::Auto => write!(f, "auto"),
            AnnounceMode::Fully => write!(f, "fully"),
            AnnounceMode::Web => write!(f, "web"),
            AnnounceMode::Beep => write!(f, "beep"),
        }
    }
}

/// Fully resolved operator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatingConfig {
    pub announce_mode: AnnounceMode,
    /// Placeholders: `{{nome}}`, `{{sala}}`, `{{salaTxt}}`
    pub voice_template: String,
    /// Player volume while speaking (0-100)
    pub duck_volume: u8,
    /// Player volume otherwise (0-100)
    pub restore_volume: u8,
    /// Pause between ducking and speaking
    pub lead_ms: u64,
    /// Inactivity before the idle display (60-300)
    pub idle_seconds: u32,
    pub highlight_color: String,
    pub voice_locale: String,
    pub voice_rate: f32,
    pub voice_pitch: f32,
    /// Speak test-flagged call events
    pub announce_tests: bool,
    /// Speak newly seen ordinary call events (for producers without triggers)
    pub announce_new_calls: bool,
    pub video_id: Option<String>,
}

impl Default for OperatingConfig {
    fn default() -> Self {
        Self {
            announce_mode: AnnounceMode::Auto,
            voice_template: DEFAULT_VOICE_TEMPLATE.to_string(),
            duck_volume: DEFAULT_DUCK_VOLUME,
            restore_volume: DEFAULT_RESTORE_VOLUME,
            lead_ms: DEFAULT_LEAD_MS,
            idle_seconds: DEFAULT_IDLE_SECONDS,
            highlight_color: DEFAULT_HIGHLIGHT_COLOR.to_string(),
            voice_locale: DEFAULT_VOICE_LOCALE.to_string(),
            voice_rate: 1.0,
            voice_pitch: 1.0,
            announce_tests: true,
            announce_new_calls: false,
            video_id: None,
        }
    }
}

impl OperatingConfig {
    pub fn idle_timeout_ms(&self) -> i64 {
        i64::from(self.idle_seconds) * 1_000
    }
}

/// Builds an [`OperatingConfig`] from the configuration collection
pub struct ConfigResolver;

impl ConfigResolver {
    /// Resolve from the primary record, else the first other record, else defaults
    pub fn resolve(snapshot: &ConfigSnapshot) -> OperatingConfig {
        let source = snapshot.primary().or_else(|| snapshot.fallback());
        match source {
            Some(Value::Object(map)) => Self::resolve_document(map),
            Some(other) => {
                debug!("Ignoring non-object config document: {}", other);
                OperatingConfig::default()
            }
            None => OperatingConfig::default(),
        }
    }

    /// Resolve one JSON object, field by field
    pub fn resolve_document(doc: &Map<String, Value>) -> OperatingConfig {
        let d = OperatingConfig::default();

        OperatingConfig {
            announce_mode: string_field(doc, "announceMode")
                .and_then(AnnounceMode::parse)
                .unwrap_or(d.announce_mode),
            voice_template: string_field(doc, "voiceTemplate")
                .filter(|t| !t.trim().is_empty())
                .map(str::to_string)
                .unwrap_or(d.voice_template),
            duck_volume: number_field(doc, "duckVolume")
                .map(volume_from)
                .unwrap_or(d.duck_volume),
            restore_volume: number_field(doc, "restoreVolume")
                .map(volume_from)
                .unwrap_or(d.restore_volume),
            lead_ms: number_field(doc, "leadMs")
                .map(|v| v.clamp(0.0, MAX_LEAD_MS as f64).round() as u64)
                .unwrap_or(d.lead_ms),
            idle_seconds: number_field(doc, "idleSeconds")
                .map(|v| {
                    v.clamp(f64::from(MIN_IDLE_SECONDS), f64::from(MAX_IDLE_SECONDS))
                        .round() as u32
                })
                .unwrap_or(d.idle_seconds),
            highlight_color: string_field(doc, "highlightColor")
                .filter(|c| !c.trim().is_empty())
                .map(str::to_string)
                .unwrap_or(d.highlight_color),
            voice_locale: string_field(doc, "voiceLocale")
                .filter(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
                .unwrap_or(d.voice_locale),
            voice_rate: number_field(doc, "voiceRate")
                .map(|v| v.clamp(0.5, 2.0) as f32)
                .unwrap_or(d.voice_rate),
            voice_pitch: number_field(doc, "voicePitch")
                .map(|v| v.clamp(0.0, 2.0) as f32)
                .unwrap_or(d.voice_pitch),
            announce_tests: bool_field(doc, "announceTests").unwrap_or(d.announce_tests),
            announce_new_calls: bool_field(doc, "announceNewCalls")
                .unwrap_or(d.announce_new_calls),
            video_id: string_field(doc, "videoId")
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        }
    }
}

fn string_field<'a>(doc: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    doc.get(key).and_then(Value::as_str)
}

fn number_field(doc: &Map<String, Value>, key: &str) -> Option<f64> {
    doc.get(key)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
}

fn bool_field(doc: &Map<String, Value>, key: &str) -> Option<bool> {
    doc.get(key).and_then(Value::as_bool)
}

fn volume_from(v: f64) -> u8 {
    v.clamp(0.0, 100.0).round() as u8
}

/// Shared, live-updated view of the resolved configuration
///
/// Readers take a cheap clone; the scheduler replaces the whole value when a
/// new snapshot arrives.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<OperatingConfig>>,
}

impl ConfigHandle {
    pub fn new(config: OperatingConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn get(&self) -> OperatingConfig {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the configuration; returns true when it changed
    pub fn set(&self, config: OperatingConfig) -> bool {
        let mut current = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if *current == config {
            return false;
        }
        *current = config;
        true
    }
}
