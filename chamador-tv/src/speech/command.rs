//! Native speech through a local text-to-speech command
//!
//! Looks for `espeak-ng`, then `espeak`, on `PATH`; `CHAMADOR_TTS_BIN`
//! overrides the search. The process runs detached and reports nothing
//! back, matching the native-bridge contract (duration is estimated).

use super::HostSpeech;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Environment variable naming the speech binary
pub const TTS_BIN_ENV_VAR: &str = "CHAMADOR_TTS_BIN";

const CANDIDATE_BINARIES: &[&str] = &["espeak-ng", "espeak"];

/// Speech bridge backed by an external command
#[derive(Debug, Clone)]
pub struct CommandSpeech {
    program: Option<PathBuf>,
}

impl CommandSpeech {
    /// Detect the speech binary from the environment
    pub fn detect() -> Self {
        let program = std::env::var(TTS_BIN_ENV_VAR)
            .ok()
            .map(PathBuf::from)
            .filter(|p| p.exists())
            .or_else(|| CANDIDATE_BINARIES.iter().find_map(|bin| find_in_path(bin)));

        match program {
            Some(ref p) => info!("Native speech via {}", p.display()),
            None => info!("No speech command found; native speech unavailable"),
        }
        Self { program }
    }

    /// Use a specific binary (or none)
    pub fn with_program(program: Option<PathBuf>) -> Self {
        Self { program }
    }

    pub fn program(&self) -> Option<&Path> {
        self.program.as_deref()
    }
}

impl HostSpeech for CommandSpeech {
    fn is_available(&self) -> bool {
        self.program.is_some()
    }

    fn speak(&self, text: &str, locale: &str) -> bool {
        let Some(ref program) = self.program else {
            return false;
        };

        let result = Command::new(program)
            .arg("-v")
            .arg(espeak_voice(locale))
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match result {
            Ok(mut child) => {
                debug!("Speech command started (pid {})", child.id());
                // Reap in the background so no zombie is left behind
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
                true
            }
            Err(e) => {
                warn!("Failed to start {}: {}", program.display(), e);
                false
            }
        }
    }
}

/// espeak voice names are lowercase with dashes (`pt_BR` becomes `pt-br`)
fn espeak_voice(locale: &str) -> String {
    locale.trim().replace('_', "-").to_ascii_lowercase()
}

fn find_in_path(bin: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(bin))
        .find(|candidate| candidate.is_file())
}
