use std::time::Duration;

use handwave_common::config::{Config, GateConfig};
use handwave_common::frame::{FrameError, PixelFrame, TimestampedFrame};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::camera::{FrameFeed, FramePoll};
use crate::motion::{average_color, GateState, WaveGate};
use crate::sink::{AnimationSink, GestureAnimation};

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("frame source not available, hand-wave detection disabled")]
    MissingCollaborator,
    #[error("frame source closed before delivering a frame")]
    SourceClosed,
}

/// Counters for one `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub detections: u64,
}

/// Glue between a frame source, the wave gate and an animation sink.
pub struct HandWaveDetector {
    gate: WaveGate,
    animation: GestureAnimation,
    tick: Duration,
}

impl HandWaveDetector {
    pub fn new(gate: GateConfig, animation: GestureAnimation, tick: Duration) -> Self {
        Self {
            gate: WaveGate::new(gate),
            animation,
            tick,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.gate,
            GestureAnimation::from_config(&config.animation),
            Duration::from_millis(config.detector.tick_ms.max(1)),
        )
    }

    pub fn gate(&self) -> &WaveGate {
        &self.gate
    }

    /// Reduce one frame and feed it to the gate. An unusable frame leaves the
    /// gate untouched.
    pub fn process_frame(&mut self, frame: &PixelFrame) -> Result<bool, FrameError> {
        let sample = average_color(frame)?;
        Ok(self.gate.observe(sample))
    }

    /// Analyse frames from `feed` until shutdown or until the source closes,
    /// calling `sink` once per detected wave.
    ///
    /// Without a feed this logs the problem and returns
    /// [`DetectorError::MissingCollaborator`]; the caller decides whether to
    /// idle. `shutdown` flipping to `true`, or its sender being dropped, stops
    /// the loop between frames.
    pub async fn run<S>(
        mut self,
        feed: Option<FrameFeed>,
        sink: &mut S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunStats, DetectorError>
    where
        S: AnimationSink + ?Sized,
    {
        let Some(mut feed) = feed else {
            error!("frame source not found, hand-wave detection stays idle");
            return Err(DetectorError::MissingCollaborator);
        };

        let mut stats = RunStats::default();

        tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => {
                info!("shutdown before the frame source started");
                return Ok(stats);
            }
            started = feed.started() => {
                started.map_err(|_| DetectorError::SourceClosed)?;
            }
        }

        info!(
            sink = sink.name(),
            animation = %self.animation.name,
            tick_ms = self.tick.as_millis() as u64,
            "frame source started, analysing frames"
        );

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => {
                    info!("shutdown requested, stopping frame analysis");
                    break;
                }
                _ = ticker.tick() => {}
            }

            match feed.poll_frame() {
                FramePoll::Pending => continue,
                FramePoll::Closed => {
                    info!("frame source closed, stopping frame analysis");
                    break;
                }
                FramePoll::Ready(frame) => self.handle_frame(&frame, sink, &mut stats),
            }
        }

        info!(
            frames_processed = stats.frames_processed,
            frames_skipped = stats.frames_skipped,
            detections = stats.detections,
            "hand-wave detector stopped"
        );
        Ok(stats)
    }

    fn handle_frame<S>(&mut self, frame: &TimestampedFrame, sink: &mut S, stats: &mut RunStats)
    where
        S: AnimationSink + ?Sized,
    {
        match self.process_frame(&frame.frame) {
            Ok(fired) => {
                stats.frames_processed += 1;
                if fired {
                    stats.detections += 1;
                    info!(
                        seq = frame.seq,
                        captured_at = %frame.captured_at(),
                        animation = %self.animation.name,
                        "hand wave detected"
                    );
                    if let Err(e) = sink.play(&self.animation) {
                        warn!(error = %e, sink = sink.name(), "failed to trigger animation");
                    }
                }
            }
            Err(e) => {
                stats.frames_skipped += 1;
                warn!(error = %e, seq = frame.seq, "skipping unusable frame");
            }
        }

        let total = stats.frames_processed + stats.frames_skipped;
        if total % 100 == 0 {
            let streak = match self.gate.state() {
                GateState::WarmingUp { .. } => 0,
                GateState::Armed { streak } => streak,
            };
            debug!(
                total,
                detections = stats.detections,
                streak,
                "frames analysed"
            );
        }
    }
}

/// Resolves once shutdown is requested. A dropped sender counts as a request.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{frame_channel, FramePublisher};
    use crate::sink::{ChannelSink, SinkError};

    const TICK: Duration = Duration::from_millis(16);

    fn detector() -> HandWaveDetector {
        HandWaveDetector::new(
            GateConfig::default(),
            GestureAnimation::new("waving_arm", Duration::from_secs(3)),
            TICK,
        )
    }

    fn solid(rgb: [u8; 3]) -> PixelFrame {
        let data = std::iter::repeat(rgb).take(16).flatten().collect();
        PixelFrame::new(4, 4, data).unwrap()
    }

    fn empty() -> PixelFrame {
        PixelFrame::new(0, 0, Vec::new()).unwrap()
    }

    /// Publish one frame and give the detector a few ticks to pick it up.
    async fn deliver(publisher: &FramePublisher, frame: PixelFrame, seq: u64) {
        publisher
            .publish(TimestampedFrame::new(frame, 1708300000000 + seq as i64, seq))
            .unwrap();
        tokio::time::sleep(TICK * 3).await;
    }

    struct FailingSink {
        calls: u32,
    }

    impl AnimationSink for FailingSink {
        fn play(&mut self, _animation: &GestureAnimation) -> Result<(), SinkError> {
            self.calls += 1;
            Err(SinkError::Closed)
        }
    }

    #[test]
    fn process_frame_matches_gate_contract() {
        let mut detector = detector();
        for _ in 0..10 {
            assert!(!detector.process_frame(&solid([0, 0, 0])).unwrap());
        }
        assert!(!detector.process_frame(&solid([255, 255, 255])).unwrap());
        assert!(!detector.process_frame(&solid([255, 255, 255])).unwrap());
        assert!(detector.process_frame(&solid([255, 255, 255])).unwrap());
    }

    #[test]
    fn empty_frame_leaves_gate_untouched() {
        let mut detector = detector();
        detector.process_frame(&solid([0, 0, 0])).unwrap();
        assert_eq!(detector.process_frame(&empty()), Err(FrameError::Empty));
        assert_eq!(detector.gate().len(), 1);
    }

    #[test]
    fn from_config_uses_configured_values() {
        let config = Config::parse("[animation]\nname = \"nod\"\n[detector]\ntick_ms = 33\n").unwrap();
        let detector = HandWaveDetector::from_config(&config);
        assert_eq!(detector.animation.name, "nod");
        assert_eq!(detector.tick, Duration::from_millis(33));
    }

    #[tokio::test]
    async fn missing_source_is_reported() {
        let (_tx, shutdown) = watch::channel(false);
        let (mut sink, _rx) = ChannelSink::new();
        let result = detector().run(None, &mut sink, shutdown).await;
        assert!(matches!(result, Err(DetectorError::MissingCollaborator)));
    }

    #[tokio::test]
    async fn source_closing_before_start_is_an_error() {
        let (_tx, shutdown) = watch::channel(false);
        let (publisher, feed) = frame_channel();
        drop(publisher);
        let (mut sink, _rx) = ChannelSink::new();
        let result = detector().run(Some(feed), &mut sink, shutdown).await;
        assert!(matches!(result, Err(DetectorError::SourceClosed)));
    }

    #[tokio::test]
    async fn shutdown_while_waiting_for_camera() {
        let (tx, shutdown) = watch::channel(false);
        let (_publisher, feed) = frame_channel();
        let (mut sink, _rx) = ChannelSink::new();
        tx.send(true).unwrap();
        let stats = detector().run(Some(feed), &mut sink, shutdown).await.unwrap();
        assert_eq!(stats, RunStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn wave_triggers_exactly_one_animation() {
        let (tx, shutdown) = watch::channel(false);
        let (publisher, feed) = frame_channel();
        let (mut sink, mut animations) = ChannelSink::new();

        let task = tokio::spawn(async move {
            let stats = detector().run(Some(feed), &mut sink, shutdown).await;
            (stats, sink)
        });

        let mut seq = 0;
        for _ in 0..10 {
            deliver(&publisher, solid([0, 0, 0]), seq).await;
            seq += 1;
        }
        assert!(animations.try_recv().is_err());

        for _ in 0..3 {
            deliver(&publisher, solid([255, 255, 255]), seq).await;
            seq += 1;
        }

        tx.send(true).unwrap();
        let (stats, _sink) = task.await.unwrap();
        let stats = stats.unwrap();

        assert_eq!(
            animations.try_recv().unwrap(),
            GestureAnimation::new("waving_arm", Duration::from_secs(3))
        );
        assert!(animations.try_recv().is_err());
        assert_eq!(
            stats,
            RunStats {
                frames_processed: 13,
                frames_skipped: 0,
                detections: 1,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unusable_frames_are_skipped() {
        let (tx, shutdown) = watch::channel(false);
        let (publisher, feed) = frame_channel();
        let (mut sink, mut animations) = ChannelSink::new();

        let task = tokio::spawn(async move { detector().run(Some(feed), &mut sink, shutdown).await });

        let mut seq = 0;
        for _ in 0..10 {
            deliver(&publisher, solid([0, 0, 0]), seq).await;
            seq += 1;
        }
        // An empty frame between the black run and the white run must not
        // count as a window entry or break the streak.
        deliver(&publisher, empty(), seq).await;
        seq += 1;
        for _ in 0..3 {
            deliver(&publisher, solid([255, 255, 255]), seq).await;
            seq += 1;
        }

        tx.send(true).unwrap();
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.frames_processed, 13);
        assert_eq!(stats.frames_skipped, 1);
        assert_eq!(stats.detections, 1);
        assert!(animations.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_ticks_do_not_feed_the_gate() {
        let (tx, shutdown) = watch::channel(false);
        let (publisher, feed) = frame_channel();
        let (mut sink, _animations) = ChannelSink::new();

        let task = tokio::spawn(async move { detector().run(Some(feed), &mut sink, shutdown).await });

        deliver(&publisher, solid([0, 0, 0]), 0).await;
        // Many ticks pass with no new frame.
        tokio::time::sleep(TICK * 50).await;

        tx.send(true).unwrap();
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.frames_processed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_source_ends_run() {
        let (_tx, shutdown) = watch::channel(false);
        let (publisher, feed) = frame_channel();
        let (mut sink, _animations) = ChannelSink::new();

        let task = tokio::spawn(async move { detector().run(Some(feed), &mut sink, shutdown).await });

        deliver(&publisher, solid([0, 0, 0]), 0).await;
        drop(publisher);

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.frames_processed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn final_frame_before_close_is_processed() {
        let (_tx, shutdown) = watch::channel(false);
        let (publisher, feed) = frame_channel();
        let (mut sink, _animations) = ChannelSink::new();

        let task = tokio::spawn(async move { detector().run(Some(feed), &mut sink, shutdown).await });

        deliver(&publisher, solid([0, 0, 0]), 0).await;
        publisher
            .publish(TimestampedFrame::new(solid([9, 9, 9]), 1708300000001, 1))
            .unwrap();
        drop(publisher);

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.frames_processed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sink_failure_does_not_stop_detection() {
        let (tx, shutdown) = watch::channel(false);
        let (publisher, feed) = frame_channel();

        let task = tokio::spawn(async move {
            let mut sink = FailingSink { calls: 0 };
            let stats = detector().run(Some(feed), &mut sink, shutdown).await;
            (stats, sink.calls)
        });

        let mut seq = 0;
        for _ in 0..10 {
            deliver(&publisher, solid([0, 0, 0]), seq).await;
            seq += 1;
        }
        for _ in 0..6 {
            deliver(&publisher, solid([255, 255, 255]), seq).await;
            seq += 1;
        }

        tx.send(true).unwrap();
        let (stats, calls) = task.await.unwrap();
        let stats = stats.unwrap();
        assert_eq!(stats.detections, 2);
        assert_eq!(calls, 2);
    }
}
