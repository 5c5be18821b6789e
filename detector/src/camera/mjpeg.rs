use std::time::Duration;

use bytes::{Buf, BytesMut};
use chrono::Utc;
use futures_util::StreamExt;
use handwave_common::config::CameraConfig;
use handwave_common::frame::{PixelFrame, TimestampedFrame};
use reqwest::header::CONTENT_TYPE;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{CameraError, FramePublisher};

const DEFAULT_BOUNDARY: &str = "frame";
const HEADER_END: &[u8] = b"\r\n\r\n";
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Largest part (headers or body) kept before the parser drops it and resyncs.
const MAX_PART_BYTES: usize = 8 * 1024 * 1024;

/// Parse state for a `multipart/x-mixed-replace` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Looking for the first boundary marker.
    SeekingBoundary,
    /// Found a boundary, skipping the part headers.
    SeekingHeaderEnd,
    /// Collecting part bytes until the next boundary.
    CollectingPart,
}

/// Incremental splitter for MJPEG multipart streams. Feed it network chunks
/// of any size; it hands back every complete part body.
pub struct MultipartParser {
    boundary: Vec<u8>,
    buffer: BytesMut,
    state: ParseState,
    /// Offset into `buffer` where the next boundary search starts.
    scan_from: usize,
    max_part: usize,
}

impl MultipartParser {
    /// `boundary` is the bare token from the Content-Type header, e.g. `frame`.
    pub fn new(boundary: &str) -> Self {
        Self::with_max_part(boundary, MAX_PART_BYTES)
    }

    /// Like [`MultipartParser::new`], but parts larger than `max_part` bytes
    /// are discarded.
    pub fn with_max_part(boundary: &str, max_part: usize) -> Self {
        Self {
            boundary: format!("--{boundary}\r\n").into_bytes(),
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            scan_from: 0,
            max_part,
        }
    }

    /// Drop the oversized part and look for the next boundary. The tail is
    /// kept in case a marker is split across chunks.
    fn resync(&mut self) {
        warn!(
            buffered = self.buffer.len(),
            max_part = self.max_part,
            "multipart part too large, resyncing"
        );
        let excess = self.buffer.len().saturating_sub(self.boundary.len());
        self.buffer.advance(excess);
        self.scan_from = 0;
        self.state = ParseState::SeekingBoundary;
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let marker_len = self.boundary.len();
        let mut parts = Vec::new();

        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, &self.boundary) {
                        self.buffer.advance(pos + marker_len);
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep a tail in case the marker spans chunks.
                        if self.buffer.len() > marker_len {
                            let excess = self.buffer.len() - marker_len;
                            self.buffer.advance(excess);
                        }
                        break;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    if let Some(pos) = find_subsequence(&self.buffer, HEADER_END) {
                        self.buffer.advance(pos + HEADER_END.len());
                        self.scan_from = 0;
                        self.state = ParseState::CollectingPart;
                    } else {
                        if self.buffer.len() > self.max_part {
                            self.resync();
                        }
                        break;
                    }
                }
                ParseState::CollectingPart => {
                    let Some(pos) =
                        find_subsequence(&self.buffer[self.scan_from..], &self.boundary)
                    else {
                        if self.buffer.len() > self.max_part {
                            self.resync();
                        } else {
                            self.scan_from = self.buffer.len().saturating_sub(marker_len);
                        }
                        break;
                    };

                    let part_end = self.scan_from + pos;
                    let body_end = if self.buffer[..part_end].ends_with(b"\r\n") {
                        part_end - 2
                    } else {
                        part_end
                    };
                    let body = self.buffer[..body_end].to_vec();
                    self.buffer.advance(part_end + marker_len);
                    if !body.is_empty() {
                        parts.push(body);
                    }
                    self.state = ParseState::SeekingHeaderEnd;
                }
            }
        }

        parts
    }
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Pull the boundary token out of a `multipart/x-mixed-replace` content type.
fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let token = value.trim().trim_matches('"');
        let token = token.strip_prefix("--").unwrap_or(token);
        (!token.is_empty()).then(|| token.to_string())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CameraMode {
    /// One long-lived multipart MJPEG response.
    Stream,
    /// Fetch single JPEG frames on a fixed interval.
    Polling { interval: Duration },
}

/// Camera reader for an HTTP MJPEG endpoint. Every received JPEG is decoded
/// into a [`PixelFrame`] and published to the detector.
pub struct MjpegCamera {
    url: String,
    mode: CameraMode,
    client: reqwest::Client,
    seq: u64,
}

impl MjpegCamera {
    pub fn from_config(config: &CameraConfig) -> Result<Self, CameraError> {
        reqwest::Url::parse(&config.url)
            .map_err(|e| CameraError::InvalidUrl(format!("{}: {e}", config.url)))?;

        let (url, mode) = match config.mode.as_str() {
            "polling" => (
                format!(
                    "{}?quality={}",
                    config.url.replace("/stream", "/frame"),
                    config.quality
                ),
                CameraMode::Polling {
                    interval: Duration::try_from_secs_f64(1.0 / config.fps)
                        .map_err(|_| CameraError::InvalidRate(config.fps))?,
                },
            ),
            _ => (
                format!(
                    "{}?quality={}&fps={}",
                    config.url, config.quality, config.fps
                ),
                CameraMode::Stream,
            ),
        };

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(CameraError::HttpConnect)?;

        Ok(Self {
            url,
            mode,
            client,
            seq: 0,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run the camera on its own task. The task ends once every feed attached
    /// to `publisher` has been dropped.
    pub fn spawn(self, publisher: FramePublisher) -> JoinHandle<()> {
        tokio::spawn(self.run(publisher))
    }

    pub async fn run(mut self, publisher: FramePublisher) {
        tokio::select! {
            _ = publisher.closed() => {}
            _ = self.read_frames(&publisher) => {}
        }
        info!(url = %self.url, frames = self.seq, "camera stopped");
    }

    async fn read_frames(&mut self, publisher: &FramePublisher) {
        match self.mode {
            CameraMode::Stream => self.run_stream(publisher).await,
            CameraMode::Polling { interval } => self.run_polling(publisher, interval).await,
        }
    }

    /// Consume the MJPEG stream, reconnecting with exponential backoff.
    async fn run_stream(&mut self, publisher: &FramePublisher) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            info!(url = %self.url, "connecting to MJPEG stream");
            match self.consume_stream(publisher).await {
                Ok(()) => {
                    info!("stream ended cleanly, reconnecting");
                    backoff = INITIAL_BACKOFF;
                }
                Err(CameraError::Closed) => return,
                Err(e) => {
                    error!(error = %e, "stream error, reconnecting in {:?}", backoff);
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn consume_stream(&mut self, publisher: &FramePublisher) -> Result<(), CameraError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(CameraError::HttpConnect)?;

        if !response.status().is_success() {
            return Err(CameraError::HttpStatus(response.status().as_u16()));
        }

        let boundary = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(boundary_from_content_type)
            .unwrap_or_else(|| DEFAULT_BOUNDARY.to_string());
        info!(status = %response.status(), boundary = %boundary, "connected to MJPEG stream");

        let mut parser = MultipartParser::new(&boundary);
        let mut byte_stream = response.bytes_stream();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(CameraError::HttpStream)?;
            for jpeg in parser.push(&chunk) {
                self.publish_jpeg(&jpeg, publisher)?;
            }
        }

        Ok(())
    }

    /// Polling fallback: fetch single frames on a fixed interval.
    async fn run_polling(&mut self, publisher: &FramePublisher, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            match self.client.get(&self.url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let jpeg = match resp.bytes().await {
                        Ok(b) => b,
                        Err(e) => {
                            warn!(error = %e, "failed to read camera frame body");
                            continue;
                        }
                    };
                    if let Err(CameraError::Closed) = self.publish_jpeg(&jpeg, publisher) {
                        return;
                    }
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "non-success response from camera");
                }
                Err(e) => {
                    warn!(error = %e, "failed to fetch camera frame");
                }
            }
        }
    }

    /// Decode and publish one JPEG. Undecodable frames are dropped here so
    /// the detector only ever sees pixel data.
    fn publish_jpeg(&mut self, jpeg: &[u8], publisher: &FramePublisher) -> Result<(), CameraError> {
        let frame = match PixelFrame::decode(jpeg) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, bytes = jpeg.len(), "dropping undecodable camera frame");
                return Ok(());
            }
        };

        let seq = self.seq;
        self.seq += 1;
        let now_ms = Utc::now().timestamp_millis();
        debug!(
            seq,
            width = frame.width,
            height = frame.height,
            "publishing camera frame"
        );
        publisher.publish(TimestampedFrame::new(frame, now_ms, seq))
    }
}
