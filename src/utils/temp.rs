//! Temp resource tracking for a single pipeline run
//!
//! Every task gets its own scratch directory under `<media_root>/temp`, named
//! after the task id plus a random suffix, so concurrent tasks never share a
//! namespace. Everything allocated here is deleted by [`TempResourceTracker::release_all`],
//! which also runs on drop as a backstop.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::{PipelineError, Result};

/// Kind of transient media file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    RawSpeech,
    StretchedSpeech,
    ConcatList,
    VideoTimeline,
    MuxedInput,
    FinalRender,
}

impl ArtifactKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::RawSpeech => "tts",
            Self::StretchedSpeech => "tts_slow",
            Self::ConcatList => "clip_list",
            Self::VideoTimeline => "concat",
            Self::MuxedInput => "video_input",
            Self::FinalRender => "result",
        }
    }

    pub fn default_extension(&self) -> &'static str {
        match self {
            Self::RawSpeech => "mp3",
            Self::StretchedSpeech => "wav",
            Self::ConcatList => "txt",
            Self::VideoTimeline | Self::MuxedInput | Self::FinalRender => "mp4",
        }
    }
}

/// A named file with a known kind and, once measured, a duration
#[derive(Debug, Clone, PartialEq)]
pub struct MediaArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub duration: Option<f64>,
}

impl MediaArtifact {
    pub fn new(kind: ArtifactKind, path: PathBuf) -> Self {
        Self { kind, path, duration: None }
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration = Some(secs);
        self
    }
}

/// Scoped owner of one task's transient files
pub struct TempResourceTracker {
    task_id: String,
    dir: Option<TempDir>,
    dir_path: PathBuf,
    files: Vec<PathBuf>,
}

impl TempResourceTracker {
    /// Create the task's scratch directory under `root`
    pub fn create(root: &Path, task_id: &str) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", task_id))
            .tempdir_in(root)?;
        let dir_path = dir.path().to_path_buf();
        log::debug!("Task {}: scratch directory {}", task_id, dir_path.display());

        Ok(Self {
            task_id: task_id.to_string(),
            dir: Some(dir),
            dir_path,
            files: Vec::new(),
        })
    }

    /// Scratch directory path
    pub fn dir(&self) -> &Path {
        &self.dir_path
    }

    /// Issue a unique path for an artifact of `kind`
    pub fn allocate(&mut self, kind: ArtifactKind) -> Result<PathBuf> {
        self.allocate_with_extension(kind, kind.default_extension())
    }

    pub fn allocate_with_extension(&mut self, kind: ArtifactKind, extension: &str) -> Result<PathBuf> {
        if self.dir.is_none() {
            return Err(PipelineError::Validation(format!(
                "scratch space of task {} already released",
                self.task_id
            )));
        }
        let file_name = format!(
            "{}_{}.{}",
            uuid::Uuid::new_v4().simple(),
            kind.label(),
            extension
        );
        let path = self.dir_path.join(file_name);
        self.files.push(path.clone());
        Ok(path)
    }

    pub fn allocated(&self) -> &[PathBuf] {
        &self.files
    }

    /// Delete every allocated file and the scratch directory.
    ///
    /// Failures are logged, never returned. Returns how many deletions failed.
    pub fn release_all(&mut self) -> usize {
        let mut failures = 0;
        for file in self.files.drain(..) {
            match std::fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    failures += 1;
                    log::warn!("Error cleaning up temporary file '{}': {}", file.display(), e);
                }
            }
        }

        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                failures += 1;
                log::warn!(
                    "Error removing scratch directory '{}': {}",
                    self.dir_path.display(),
                    e
                );
            }
        }
        failures
    }
}

impl Drop for TempResourceTracker {
    fn drop(&mut self) {
        if self.dir.is_some() {
            self.release_all();
        }
    }
}
