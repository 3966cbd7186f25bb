pub mod html;
pub mod keys;

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use slide_capture_common::config::ExportConfig;
use slide_capture_common::frame::FrameError;
use tracing::{info, warn};

use crate::engine::buffer::Slide;

use html::RenderedSlide;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to encode slide {sequence}: {source}")]
    Encode {
        sequence: u32,
        #[source]
        source: FrameError,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Written { path: PathBuf, slides: usize },
    /// Nothing was captured; no file was produced.
    Skipped,
}

/// Writes a finished session's slides to a printable HTML document.
pub struct HtmlExporter {
    config: ExportConfig,
}

impl HtmlExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub async fn export(
        &self,
        slides: &[Slide],
        at: DateTime<Utc>,
    ) -> Result<ExportOutcome, ExportError> {
        if slides.is_empty() {
            warn!("no slides captured, skipping export");
            return Ok(ExportOutcome::Skipped);
        }

        let mut rendered = Vec::with_capacity(slides.len());
        for slide in slides {
            let png = slide
                .image()
                .encode_png()
                .map_err(|source| ExportError::Encode {
                    sequence: slide.sequence_number(),
                    source,
                })?;
            rendered.push(RenderedSlide {
                sequence_number: slide.sequence_number(),
                captured_at_ms: slide.captured_at_ms(),
                png_base64: STANDARD.encode(png),
            });
        }

        let document = html::render(&self.config.title, &rendered, at);
        let path = self
            .config
            .output_dir
            .join(keys::export_file_name(&self.config.file_prefix, at));

        let write_err = |source| ExportError::Write {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(write_err)?;
        tokio::fs::write(&path, document).await.map_err(write_err)?;

        info!(
            path = %path.display(),
            slides = slides.len(),
            "exported slide deck"
        );
        Ok(ExportOutcome::Written {
            path,
            slides: slides.len(),
        })
    }
}
