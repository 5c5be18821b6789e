use std::collections::VecDeque;

use handwave_common::config::GateConfig;
use tracing::debug;

use super::reducer::ColorSample;

/// Counts consecutive qualifying frames and fires once the streak is long
/// enough. Any non-qualifying frame drops the streak to zero.
#[derive(Debug, Clone)]
pub struct Debounce {
    required: u32,
    streak: u32,
}

impl Debounce {
    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            streak: 0,
        }
    }

    /// Feed one frame's verdict. Returns `true` when the streak completes;
    /// the streak restarts from zero after firing.
    pub fn update(&mut self, above: bool) -> bool {
        if !above {
            self.streak = 0;
            return false;
        }
        self.streak += 1;
        if self.streak >= self.required {
            self.streak = 0;
            return true;
        }
        false
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn reset(&mut self) {
        self.streak = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// The history window is not full yet.
    WarmingUp { have: usize, need: usize },
    /// The window is full; `streak` consecutive moving frames so far.
    Armed { streak: u32 },
}

/// What one call to [`WaveGate::step`] saw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Movement score of the window, `None` while warming up.
    pub score: Option<f32>,
    /// Debounce streak after this frame.
    pub streak: u32,
    pub fired: bool,
}

/// Sliding-window motion scorer with a debounced wave decision.
///
/// Keeps the last `frame_history` average colors. Once the window is full,
/// each frame scores the window by summing the color distance between
/// neighbouring samples; `wave_frames` consecutive scores above
/// `movement_threshold` report a wave.
#[derive(Debug, Clone)]
pub struct WaveGate {
    history: VecDeque<ColorSample>,
    capacity: usize,
    threshold: f32,
    debounce: Debounce,
}

impl WaveGate {
    pub fn new(config: GateConfig) -> Self {
        let capacity = config.frame_history.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            threshold: config.movement_threshold,
            debounce: Debounce::new(config.wave_frames),
        }
    }

    /// Push one frame's sample; `true` means a wave was detected on this frame.
    pub fn observe(&mut self, sample: ColorSample) -> bool {
        self.step(sample).fired
    }

    pub fn step(&mut self, sample: ColorSample) -> Observation {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(sample);

        let Some(score) = self.movement_score() else {
            debug!(
                have = self.history.len(),
                need = self.capacity,
                "warming up"
            );
            return Observation {
                score: None,
                streak: 0,
                fired: false,
            };
        };

        let above = score > self.threshold;
        let fired = self.debounce.update(above);
        debug!(
            score,
            threshold = self.threshold,
            above,
            streak = self.debounce.streak(),
            "window scored"
        );
        if fired {
            debug!(required = self.debounce.required, "streak complete");
        }

        Observation {
            score: Some(score),
            streak: self.debounce.streak(),
            fired,
        }
    }

    /// Sum of distances between neighbouring samples, oldest to newest.
    /// `None` until the window is full.
    pub fn movement_score(&self) -> Option<f32> {
        if self.history.len() < self.capacity {
            return None;
        }
        let score: f32 = self
            .history
            .iter()
            .zip(self.history.iter().skip(1))
            .map(|(prev, next)| next.distance(prev))
            .sum();
        Some(score)
    }

    pub fn state(&self) -> GateState {
        if self.history.len() < self.capacity {
            GateState::WarmingUp {
                have: self.history.len(),
                need: self.capacity,
            }
        } else {
            GateState::Armed {
                streak: self.debounce.streak(),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Forget all history and streak progress.
    pub fn reset(&mut self) {
        self.history.clear();
        self.debounce.reset();
    }
}
