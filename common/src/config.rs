use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Absent when no camera is configured; the detector then stays idle.
    pub camera: Option<CameraConfig>,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub url: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_quality")]
    pub quality: u32,
    #[serde(default = "default_fps")]
    pub fps: f64,
}

/// Tuning for the sliding-window wave gate.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GateConfig {
    /// Number of recent average colors kept in the window.
    #[serde(default = "default_frame_history")]
    pub frame_history: usize,
    /// Window movement score that counts a frame as "moving".
    #[serde(default = "default_movement_threshold")]
    pub movement_threshold: f32,
    /// Consecutive moving frames needed to report a wave.
    #[serde(default = "default_wave_frames")]
    pub wave_frames: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnimationConfig {
    #[serde(default = "default_animation_name")]
    pub name: String,
    #[serde(default = "default_animation_duration")]
    pub duration_secs: f64,
    #[serde(default = "default_sink")]
    pub sink: String,
    /// Required when `sink = "http"`.
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            frame_history: default_frame_history(),
            movement_threshold: default_movement_threshold(),
            wave_frames: default_wave_frames(),
        }
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            name: default_animation_name(),
            duration_secs: default_animation_duration(),
            sink: default_sink(),
            endpoint: None,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(camera) = &self.camera {
            if !matches!(camera.mode.as_str(), "mjpeg" | "polling") {
                return Err(ConfigError::Invalid(format!(
                    "camera.mode must be 'mjpeg' or 'polling', got '{}'",
                    camera.mode
                )));
            }
            if !(camera.fps.is_finite() && camera.fps > 0.0) {
                return Err(ConfigError::Invalid("camera.fps must be positive".into()));
            }
        }

        self.gate.validate()?;

        if !(self.animation.duration_secs.is_finite() && self.animation.duration_secs > 0.0) {
            return Err(ConfigError::Invalid(
                "animation.duration_secs must be positive".into(),
            ));
        }
        match self.animation.sink.as_str() {
            "log" => {}
            "http" if self.animation.endpoint.is_some() => {}
            "http" => {
                return Err(ConfigError::Invalid(
                    "animation.endpoint is required for the http sink".into(),
                ))
            }
            other => {
                return Err(ConfigError::Invalid(format!(
                    "animation.sink must be 'log' or 'http', got '{other}'"
                )))
            }
        }

        if self.detector.tick_ms == 0 {
            return Err(ConfigError::Invalid("detector.tick_ms must be positive".into()));
        }
        Ok(())
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_history == 0 {
            return Err(ConfigError::Invalid("gate.frame_history must be at least 1".into()));
        }
        if self.wave_frames == 0 {
            return Err(ConfigError::Invalid("gate.wave_frames must be at least 1".into()));
        }
        if !(self.movement_threshold.is_finite() && self.movement_threshold >= 0.0) {
            return Err(ConfigError::Invalid(
                "gate.movement_threshold must be a finite non-negative number".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_mode() -> String {
    "mjpeg".into()
}
fn default_quality() -> u32 {
    80
}
fn default_fps() -> f64 {
    10.0
}
fn default_frame_history() -> usize {
    10
}
fn default_movement_threshold() -> f32 {
    0.1
}
fn default_wave_frames() -> u32 {
    3
}
fn default_animation_name() -> String {
    "waving_arm".into()
}
fn default_animation_duration() -> f64 {
    3.0
}
fn default_sink() -> String {
    "log".into()
}
fn default_tick_ms() -> u64 {
    16
}
fn default_log_level() -> String {
    "info".into()
}
