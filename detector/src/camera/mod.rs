//! Frame source: a latest-frame handoff between a camera task and the detector.
//!
//! The camera side holds a [`FramePublisher`] and replaces the current frame
//! whenever a new one is decoded. The detector side holds a [`FrameFeed`],
//! waits once for [`FrameFeed::started`], then calls [`FrameFeed::poll_frame`]
//! once per tick. Frames the detector was too slow to see are overwritten,
//! never queued.

pub mod mjpeg;

use std::sync::Arc;

use futures_util::FutureExt;
use handwave_common::frame::TimestampedFrame;
use tokio::sync::watch;

pub use mjpeg::MjpegCamera;

type Slot = Option<Arc<TimestampedFrame>>;

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("frame channel closed")]
    Closed,
    #[error("invalid camera URL {0}")]
    InvalidUrl(String),
    #[error("invalid camera frame rate {0}")]
    InvalidRate(f64),
    #[error("HTTP connection failed: {0}")]
    HttpConnect(reqwest::Error),
    #[error("HTTP stream error: {0}")]
    HttpStream(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
}

/// Result of one per-tick poll.
#[derive(Debug, Clone)]
pub enum FramePoll {
    /// No frame arrived since the last poll.
    Pending,
    Ready(Arc<TimestampedFrame>),
    /// The camera side is gone; no further frames will arrive.
    Closed,
}

/// Create a connected publisher/feed pair.
pub fn frame_channel() -> (FramePublisher, FrameFeed) {
    let (tx, rx) = watch::channel::<Slot>(None);
    (FramePublisher { tx }, FrameFeed { rx, primed: false })
}

pub struct FramePublisher {
    tx: watch::Sender<Slot>,
}

impl FramePublisher {
    /// Replace the current frame. Fails once every feed has been dropped.
    pub fn publish(&self, frame: TimestampedFrame) -> Result<(), CameraError> {
        self.tx
            .send(Some(Arc::new(frame)))
            .map_err(|_| CameraError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves when every feed has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

pub struct FrameFeed {
    rx: watch::Receiver<Slot>,
    /// Set by `started` so the frame that signalled readiness is still
    /// handed out by the next poll.
    primed: bool,
}

impl FrameFeed {
    /// Wait until the camera has delivered its first frame.
    pub async fn started(&mut self) -> Result<(), CameraError> {
        loop {
            if self.rx.borrow_and_update().is_some() {
                self.primed = true;
                return Ok(());
            }
            self.rx.changed().await.map_err(|_| CameraError::Closed)?;
        }
    }

    pub fn poll_frame(&mut self) -> FramePoll {
        if self.primed {
            self.primed = false;
            if let Some(frame) = self.rx.borrow_and_update().clone() {
                return FramePoll::Ready(frame);
            }
        }
        match self.rx.has_changed() {
            Ok(true) => match self.rx.borrow_and_update().clone() {
                Some(frame) => FramePoll::Ready(frame),
                None => FramePoll::Pending,
            },
            Ok(false) => FramePoll::Pending,
            // The publisher is gone, but its last frame may still be unseen.
            Err(_) => match self.rx.changed().now_or_never() {
                Some(Ok(())) => match self.rx.borrow_and_update().clone() {
                    Some(frame) => FramePoll::Ready(frame),
                    None => FramePoll::Closed,
                },
                _ => FramePoll::Closed,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handwave_common::frame::PixelFrame;

    fn frame(seq: u64) -> TimestampedFrame {
        let pixels = PixelFrame::new(1, 1, vec![seq as u8, 0, 0]).unwrap();
        TimestampedFrame::new(pixels, 1708300000000 + seq as i64, seq)
    }

    fn seq_of(poll: FramePoll) -> Option<u64> {
        match poll {
            FramePoll::Ready(f) => Some(f.seq),
            _ => None,
        }
    }

    #[tokio::test]
    async fn readiness_frame_is_not_lost() {
        let (publisher, mut feed) = frame_channel();
        assert!(matches!(feed.poll_frame(), FramePoll::Pending));

        publisher.publish(frame(0)).unwrap();
        feed.started().await.unwrap();
        assert_eq!(seq_of(feed.poll_frame()), Some(0));
        assert!(matches!(feed.poll_frame(), FramePoll::Pending));
    }

    #[tokio::test]
    async fn each_frame_is_seen_once() {
        let (publisher, mut feed) = frame_channel();
        publisher.publish(frame(0)).unwrap();
        feed.started().await.unwrap();
        assert_eq!(seq_of(feed.poll_frame()), Some(0));

        publisher.publish(frame(1)).unwrap();
        assert_eq!(seq_of(feed.poll_frame()), Some(1));
        assert!(matches!(feed.poll_frame(), FramePoll::Pending));
    }

    #[tokio::test]
    async fn slow_reader_gets_latest_frame() {
        let (publisher, mut feed) = frame_channel();
        publisher.publish(frame(0)).unwrap();
        feed.started().await.unwrap();
        feed.poll_frame();

        for seq in 1..=5 {
            publisher.publish(frame(seq)).unwrap();
        }
        assert_eq!(seq_of(feed.poll_frame()), Some(5));
    }

    #[tokio::test]
    async fn dropped_publisher_closes_feed() {
        let (publisher, mut feed) = frame_channel();
        publisher.publish(frame(0)).unwrap();
        feed.started().await.unwrap();
        feed.poll_frame();
        drop(publisher);
        assert!(matches!(feed.poll_frame(), FramePoll::Closed));
    }

    #[tokio::test]
    async fn last_frame_survives_publisher_drop() {
        let (publisher, mut feed) = frame_channel();
        publisher.publish(frame(0)).unwrap();
        feed.started().await.unwrap();
        assert_eq!(seq_of(feed.poll_frame()), Some(0));

        publisher.publish(frame(1)).unwrap();
        drop(publisher);
        assert_eq!(seq_of(feed.poll_frame()), Some(1));
        assert!(matches!(feed.poll_frame(), FramePoll::Closed));
    }

    #[tokio::test]
    async fn started_fails_if_publisher_never_publishes() {
        let (publisher, mut feed) = frame_channel();
        drop(publisher);
        assert!(matches!(feed.started().await, Err(CameraError::Closed)));
    }

    #[tokio::test]
    async fn publisher_notices_dropped_feed() {
        let (publisher, feed) = frame_channel();
        assert!(!publisher.is_closed());
        drop(feed);
        publisher.closed().await;
        assert!(publisher.is_closed());
        assert!(matches!(publisher.publish(frame(0)), Err(CameraError::Closed)));
    }
}
