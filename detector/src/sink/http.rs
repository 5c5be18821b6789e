use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use super::traits::{AnimationSink, GestureAnimation, SinkError};

/// JSON body sent to the host's animation endpoint.
#[derive(Debug, Serialize)]
struct AnimateRequest<'a> {
    name: &'a str,
    /// Seconds.
    duration: f64,
}

impl<'a> From<&'a GestureAnimation> for AnimateRequest<'a> {
    fn from(animation: &'a GestureAnimation) -> Self {
        Self {
            name: &animation.name,
            duration: animation.duration.as_secs_f64(),
        }
    }
}

/// Sink that POSTs each animation to a host HTTP endpoint.
///
/// Requests run on their own task; a slow or failing host never stalls
/// frame analysis. Failures are logged.
pub struct HttpSink {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| SinkError::Http(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

impl AnimationSink for HttpSink {
    fn play(&mut self, animation: &GestureAnimation) -> Result<(), SinkError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| SinkError::NoRuntime)?;
        let request = self
            .client
            .post(&self.endpoint)
            .json(&AnimateRequest::from(animation));
        let endpoint = self.endpoint.clone();

        handle.spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(endpoint, status = %resp.status(), "animation request accepted");
                }
                Ok(resp) => {
                    warn!(endpoint, status = %resp.status(), "animation request rejected");
                }
                Err(e) => {
                    warn!(endpoint, error = %e, "animation request failed");
                }
            }
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}
