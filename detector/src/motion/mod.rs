//! Motion core: frame reduction and the debounced wave gate.

pub mod gate;
pub mod reducer;

pub use gate::{Debounce, GateState, Observation, WaveGate};
pub use reducer::{average_color, ColorSample};
