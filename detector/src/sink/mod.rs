pub mod http;
pub mod local;
pub mod traits;

pub use http::HttpSink;
pub use local::{ChannelSink, LogSink};
pub use traits::{AnimationSink, GestureAnimation, SinkError};
