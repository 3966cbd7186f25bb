use std::path::{Path, PathBuf};

use slide_capture_common::frame::Frame;
use tracing::{debug, info};

use super::{now_ms, SourceError};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// Replays the images of a directory in file-name order, one per tick.
pub struct DirectorySource {
    path: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    exhausted: bool,
}

impl DirectorySource {
    pub async fn open(path: &Path) -> Result<Self, SourceError> {
        let io_err = |source| SourceError::Io {
            path: path.display().to_string(),
            source,
        };

        let mut entries = tokio::fs::read_dir(path).await.map_err(io_err)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let file = entry.path();
            if is_image(&file) {
                files.push(file);
            }
        }
        files.sort();

        info!(
            path = %path.display(),
            frames = files.len(),
            "replaying frames from directory"
        );
        Ok(Self {
            path: path.to_path_buf(),
            files,
            cursor: 0,
            exhausted: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub async fn grab(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(file) = self.files.get(self.cursor) else {
            if !self.exhausted {
                debug!(path = %self.path.display(), "directory source exhausted");
            }
            self.exhausted = true;
            return Ok(None);
        };
        self.cursor += 1;

        let bytes = tokio::fs::read(file).await.map_err(|source| SourceError::Io {
            path: file.display().to_string(),
            source,
        })?;
        Frame::decode(&bytes, now_ms())
            .map(Some)
            .map_err(|source| SourceError::Decode {
                origin: file.display().to_string(),
                source,
            })
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
