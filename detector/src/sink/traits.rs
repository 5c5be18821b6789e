use std::time::Duration;

use handwave_common::config::AnimationConfig;
use tracing::warn;

const FALLBACK_DURATION: Duration = Duration::from_secs(3);

/// The animation requested from the host on every detected wave.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureAnimation {
    pub name: String,
    pub duration: Duration,
}

impl GestureAnimation {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
        }
    }

    pub fn from_config(config: &AnimationConfig) -> Self {
        let duration = Duration::try_from_secs_f64(config.duration_secs).unwrap_or_else(|_| {
            warn!(
                duration_secs = config.duration_secs,
                "invalid animation duration, using {:?}", FALLBACK_DURATION
            );
            FALLBACK_DURATION
        });
        Self::new(config.name.clone(), duration)
    }
}

/// Host-side receiver of gesture animations.
///
/// `play` is called once per detected wave from the detector task, so it
/// must not block; implementations that do I/O hand the work off.
pub trait AnimationSink: Send {
    fn play(&mut self, animation: &GestureAnimation) -> Result<(), SinkError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("animation receiver dropped")]
    Closed,
    #[error("no async runtime available to send the request")]
    NoRuntime,
    #[error("HTTP client error: {0}")]
    Http(String),
}
