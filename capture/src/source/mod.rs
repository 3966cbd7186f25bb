pub mod directory;
pub mod http;
pub mod memory;

use slide_capture_common::config::SamplerConfig;
use slide_capture_common::frame::{Frame, FrameError};

pub use directory::DirectorySource;
pub use http::HttpSource;
pub use memory::MemorySource;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to decode frame from {origin}: {source}")]
    Decode {
        origin: String,
        #[source]
        source: FrameError,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("unknown frame source '{0}', expected 'http' or 'directory'")]
    UnknownKind(String),
}

/// Where sampled frames come from.
///
/// `grab` returning `Ok(None)` means the source has nothing to show right now;
/// the tick is a no-op and the next one tries again.
pub enum FrameSource {
    Http(HttpSource),
    Directory(DirectorySource),
    Memory(MemorySource),
}

impl FrameSource {
    /// Build the source named by `[sampler].source`.
    pub async fn from_config(config: &SamplerConfig) -> Result<Self, SourceError> {
        match config.source.as_str() {
            "http" => Ok(Self::Http(HttpSource::new(
                &config.url,
                config.request_timeout_ms,
            )?)),
            "directory" => Ok(Self::Directory(
                DirectorySource::open(&config.directory).await?,
            )),
            other => Err(SourceError::UnknownKind(other.to_string())),
        }
    }

    pub async fn grab(&mut self) -> Result<Option<Frame>, SourceError> {
        match self {
            Self::Http(source) => source.grab().await,
            Self::Directory(source) => source.grab().await,
            Self::Memory(source) => Ok(source.pop()),
        }
    }

    /// True when the source will never produce another frame.
    pub fn is_exhausted(&self) -> bool {
        match self {
            Self::Directory(source) => source.is_exhausted(),
            Self::Http(_) | Self::Memory(_) => false,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Http(source) => format!("http {}", source.url()),
            Self::Directory(source) => format!(
                "directory {} ({} frames)",
                source.path().display(),
                source.len()
            ),
            Self::Memory(_) => "memory".to_string(),
        }
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
