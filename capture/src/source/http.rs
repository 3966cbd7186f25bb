use std::time::Duration;

use slide_capture_common::frame::Frame;
use tracing::debug;

use super::{now_ms, SourceError};

/// Polls a single-image snapshot endpoint, one GET per tick.
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: &str, timeout_ms: u64) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(timeout_ms))
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(SourceError::Client)?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Unreachable endpoints and non-success statuses are treated as "no
    /// frame yet"; only an undecodable body is an error.
    pub async fn grab(&mut self) -> Result<Option<Frame>, SourceError> {
        let resp = match self.client.get(&self.url).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                debug!(status = %resp.status(), url = self.url, "frame source not ready");
                return Ok(None);
            }
            Err(e) => {
                debug!(error = %e, url = self.url, "frame source unreachable");
                return Ok(None);
            }
        };

        let body = match resp.bytes().await {
            Ok(body) => body,
            Err(e) => {
                debug!(error = %e, url = self.url, "frame body interrupted");
                return Ok(None);
            }
        };
        let captured_at_ms = now_ms();

        Frame::decode(&body, captured_at_ms)
            .map(Some)
            .map_err(|source| SourceError::Decode {
                origin: self.url.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_endpoint_is_not_an_error() {
        // Port 9 (discard) on localhost is closed in any sane test environment.
        let mut source = HttpSource::new("http://127.0.0.1:9/frame", 500).unwrap();
        assert!(source.grab().await.unwrap().is_none());
    }
}
