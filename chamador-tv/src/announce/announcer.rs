//! One announcement, start to finish
//!
//! format → duck → lead pause → speak (with fallback) → wait → restore.
//!
//! Every failure is absorbed here. A backend that is missing or refuses
//! hands over to the next candidate, ending at the beep, and the duck token
//! is always ended, so the player is never left lowered.

use super::{format_phrase, AnnouncementRequest};
use crate::context::TvContext;
use crate::ducking::AudioDucker;
use crate::speech::{
    candidates, choose_mode, Completion, SpeechError, Utterance, BEEP_WINDOW,
};
use async_trait::async_trait;
use chamador_common::events::{ChamadorEvent, SpeechBackendKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest wait for a completion callback before closing the duck anyway
pub const BROWSER_COMPLETION_CAP: Duration = Duration::from_secs(12);

/// Outcome of one announcement
#[derive(Debug, Clone, PartialEq)]
pub struct AnnouncementReport {
    pub text: String,
    /// Backend that actually produced the sound
    pub backend: SpeechBackendKind,
    /// Failures met before `backend` took over
    pub failures: Vec<SpeechError>,
}

impl AnnouncementReport {
    pub fn fell_back(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Something that can speak one request to completion
#[async_trait]
pub trait Announce: Send + Sync {
    async fn announce(&self, request: &AnnouncementRequest) -> AnnouncementReport;
}

/// Announcer over the context's speech backends and ducker
pub struct Announcer {
    ctx: Arc<TvContext>,
    ducker: AudioDucker,
}

impl Announcer {
    pub fn new(ctx: Arc<TvContext>, ducker: AudioDucker) -> Self {
        Self { ctx, ducker }
    }

    /// Start the output on the best backend that accepts it
    fn speak_with_fallback(
        &self,
        utterance: &Utterance,
        failures: &mut Vec<SpeechError>,
    ) -> (SpeechBackendKind, Completion) {
        let mode = self.ctx.config.get().announce_mode;
        let order = candidates(mode);

        let start = match choose_mode(mode, &self.ctx.speech) {
            Ok(kind) => order.iter().position(|k| *k == kind).unwrap_or(0),
            Err(e) => {
                warn!("Announce mode {}: {}", mode, e);
                failures.push(e);
                order.len() - 1
            }
        };

        for kind in order.iter().skip(start).copied() {
            match self.ctx.speech.get(kind).speak(utterance) {
                Ok(completion) => {
                    debug!("Speaking via {}", kind);
                    return (kind, completion);
                }
                Err(e) => {
                    warn!("{}; trying next backend", e);
                    failures.push(e);
                }
            }
        }

        // Even the beep refused: keep the window so the duck still closes
        (SpeechBackendKind::Beep, Completion::After(BEEP_WINDOW))
    }
}

#[async_trait]
impl Announce for Announcer {
    async fn announce(&self, request: &AnnouncementRequest) -> AnnouncementReport {
        let config = self.ctx.config.get();
        let text = format_phrase(&config.voice_template, &request.name, Some(&request.room));

        info!(
            "Announcing {} / room '{}' ({})",
            request.name, request.room, request.source
        );
        self.ctx.bus.emit_lossy(ChamadorEvent::AnnouncementStarted {
            name: request.name.clone(),
            room: request.room.clone(),
            text: text.clone(),
            timestamp: chrono::Utc::now(),
        });

        let duck = self.ducker.duck_start();
        tokio::time::sleep(Duration::from_millis(config.lead_ms)).await;

        let utterance = Utterance {
            text: text.clone(),
            locale: config.voice_locale.clone(),
            rate: config.voice_rate,
            pitch: config.voice_pitch,
        };
        let mut failures = Vec::new();
        let (backend, completion) = self.speak_with_fallback(&utterance, &mut failures);

        match completion {
            Completion::After(window) => tokio::time::sleep(window).await,
            Completion::Signal(done) => {
                if tokio::time::timeout(BROWSER_COMPLETION_CAP, done).await.is_err() {
                    warn!(
                        "No completion from {} after {:?}; closing duck",
                        backend, BROWSER_COMPLETION_CAP
                    );
                }
            }
        }

        duck.end();

        let report = AnnouncementReport {
            text,
            backend,
            failures,
        };
        self.ctx.bus.emit_lossy(ChamadorEvent::AnnouncementFinished {
            name: request.name.clone(),
            room: request.room.clone(),
            backend,
            fell_back: report.fell_back(),
            timestamp: chrono::Utc::now(),
        });
        report
    }
}
