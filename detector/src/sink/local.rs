use tokio::sync::mpsc;
use tracing::info;

use super::traits::{AnimationSink, GestureAnimation, SinkError};

/// Sink that only records the request in the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl AnimationSink for LogSink {
    fn play(&mut self, animation: &GestureAnimation) -> Result<(), SinkError> {
        info!(
            animation = %animation.name,
            duration_secs = animation.duration.as_secs_f64(),
            "play animation"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Sink that forwards animations to an in-process receiver.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<GestureAnimation>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GestureAnimation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AnimationSink for ChannelSink {
    fn play(&mut self, animation: &GestureAnimation) -> Result<(), SinkError> {
        self.tx
            .send(animation.clone())
            .map_err(|_| SinkError::Closed)
    }

    fn name(&self) -> &str {
        "channel"
    }
}
