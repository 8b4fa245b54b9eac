use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine tunables loaded once at startup.
///
/// Values come from `SYNSYNC_CONFIG` when set, otherwise `config.toml`
/// next to the manifest; missing file or fields fall back to defaults.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EngineConfig {
    /// Phase transition crossfade length in milliseconds.
    #[serde(default = "default_crossfade_ms")]
    pub crossfade_ms: f32,
    /// Fade applied on a graceful stop, in milliseconds.
    #[serde(default = "default_stop_fade_ms")]
    pub stop_fade_ms: f32,
    /// How long a sink fault may persist before playback is stopped,
    /// in milliseconds.
    #[serde(default = "default_sink_fault_grace_ms")]
    pub sink_fault_grace_ms: u64,
    /// Telemetry tick rate for observers, in Hz.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: f32,
    /// Frames retained by the visualization tap.
    #[serde(default = "default_tap_frames")]
    pub tap_frames: usize,
    #[serde(default = "default_master_gain")]
    pub master_gain: f32,
}

fn default_crossfade_ms() -> f32 {
    100.0
}

fn default_stop_fade_ms() -> f32 {
    30.0
}

fn default_sink_fault_grace_ms() -> u64 {
    500
}

fn default_tick_hz() -> f32 {
    30.0
}

fn default_tap_frames() -> usize {
    8192
}

fn default_master_gain() -> f32 {
    1.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            crossfade_ms: default_crossfade_ms(),
            stop_fade_ms: default_stop_fade_ms(),
            sink_fault_grace_ms: default_sink_fault_grace_ms(),
            tick_hz: default_tick_hz(),
            tap_frames: default_tap_frames(),
            master_gain: default_master_gain(),
        }
    }
}

impl EngineConfig {
    pub fn load_from(path: &Path) -> Self {
        if let Ok(txt) = std::fs::read_to_string(path) {
            toml::from_str(&txt).unwrap_or_default()
        } else {
            EngineConfig::default()
        }
    }

    /// Write the default configuration as a starting point for edits.
    pub fn generate_default(path: &str) -> std::io::Result<()> {
        let txt = toml::to_string_pretty(&EngineConfig::default())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, txt)
    }
}

pub static CONFIG: Lazy<EngineConfig> = Lazy::new(|| {
    let path = std::env::var_os("SYNSYNC_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.toml"));
    EngineConfig::load_from(&path)
});
