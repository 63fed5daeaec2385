//! Progress frames written to disk as numbered PNG files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbaImage;
use renderer::{DisplaySink, Frame};

/// Saves every presented canvas below `dir`.
///
/// Write failures are logged and skipped so a full disk never aborts a render.
pub struct SnapshotSink {
    dir: PathBuf,
    written: usize,
}

impl SnapshotSink {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create progress directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }

    pub fn written(&self) -> usize {
        self.written
    }

    fn frame_path(&self, frame: Frame) -> PathBuf {
        let name = match frame {
            Frame::Progress { completed, .. } => format!("tile-{completed:04}.png"),
            Frame::Stitched => "stitched.png".to_string(),
            Frame::Final => "final.png".to_string(),
        };
        self.dir.join(name)
    }
}

impl DisplaySink for SnapshotSink {
    fn present(&mut self, frame: Frame, canvas: &RgbaImage) {
        let path = self.frame_path(frame);
        match canvas.save(&path) {
            Ok(()) => {
                self.written += 1;
                tracing::debug!(path = %path.display(), ?frame, "wrote progress frame");
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to write progress frame");
            }
        }
    }
}

/// Logs tile progress without keeping any pixels.
#[derive(Debug, Default)]
pub struct ProgressLog;

impl DisplaySink for ProgressLog {
    fn present(&mut self, frame: Frame, _canvas: &RgbaImage) {
        if let Frame::Progress { completed, total } = frame {
            tracing::info!(completed, total, "tile composited");
        }
    }
}
