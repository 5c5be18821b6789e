//! Hand-wave detection from a live camera feed.
//!
//! Each frame is reduced to its average color ([`motion::average_color`]).
//! A [`motion::WaveGate`] keeps a short window of those colors, scores how
//! much the scene color moved across the window, and reports a wave once
//! enough consecutive frames score above the threshold. The
//! [`detector::HandWaveDetector`] drives that loop from a
//! [`camera::FrameFeed`] and asks an [`sink::AnimationSink`] to play the
//! configured animation on every detection.

pub mod camera;
pub mod detector;
pub mod motion;
pub mod sink;
