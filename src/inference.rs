//! Lip-sync inference invocation
//!
//! The inference script is expensive to start, so every path it needs is
//! checked before launching it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{InferenceConfig, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::progress::PipelineStage;
use crate::utils::ffmpeg::require_output;
use crate::utils::process::{CommandRunner, ToolError, ToolInvocation};

pub struct InferenceInvoker {
    runner: Arc<dyn CommandRunner>,
    python: String,
    settings: InferenceConfig,
    timeout: Duration,
}

fn missing(which: &str, path: &Path) -> PipelineError {
    PipelineError::MissingDependency {
        which: which.to_string(),
        path: path.to_path_buf(),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

impl InferenceInvoker {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &PipelineConfig) -> Self {
        Self {
            runner,
            python: config.python_bin.clone(),
            settings: config.inference.clone(),
            timeout: config.timeouts.for_stage(PipelineStage::Inferring),
        }
    }

    /// Verify every input path before anything is launched
    pub fn preflight(&self, face: &Path, audio: &Path, output: &Path) -> Result<()> {
        if !self.settings.working_dir.is_dir() {
            return Err(missing("working directory", &self.settings.working_dir));
        }
        let script = self.settings.working_dir.join(&self.settings.script);
        if !script.is_file() {
            return Err(missing("inference script", &script));
        }
        if !self.settings.checkpoint_path.is_file() {
            return Err(missing("checkpoint", &self.settings.checkpoint_path));
        }
        if !face.is_file() {
            return Err(missing("face video", face));
        }
        if !audio.is_file() {
            return Err(missing("audio", audio));
        }
        match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
                Err(missing("output directory", parent))
            }
            _ => Ok(()),
        }
    }

    fn invocation(&self, face: &Path, audio: &Path, output: &Path) -> Result<ToolInvocation> {
        // The script runs inside its own directory, so every path is made absolute
        let pads = self.settings.pads.map(|p| p.to_string());
        Ok(ToolInvocation::new(&self.python)
            .arg(&self.settings.script)
            .arg("--checkpoint_path")
            .arg(absolute(&self.settings.checkpoint_path)?)
            .arg("--face")
            .arg(absolute(face)?)
            .arg("--audio")
            .arg(absolute(audio)?)
            .arg("--outfile")
            .arg(absolute(output)?)
            .arg("--resize_factor")
            .arg(self.settings.resize_factor.to_string())
            .arg("--pads")
            .args(pads)
            .current_dir(&self.settings.working_dir))
    }

    /// Run the lip-sync engine on `face` and `audio`, writing `output`
    pub async fn infer(&self, face: &Path, audio: &Path, output: &Path) -> Result<PathBuf> {
        self.preflight(face, audio, output)?;
        let invocation = self.invocation(face, audio, output)?;

        let result = self
            .runner
            .run(&invocation, self.timeout)
            .await
            .map_err(|e| match e {
                ToolError::Launch { .. } => missing("interpreter", Path::new(&self.python)),
                timed_out => timed_out.into_stage_error(PipelineStage::Inferring, PipelineError::InferenceFailed),
            })?;

        if !result.success {
            log::error!("Lip-sync inference failed: {}", result.diagnostic());
            return Err(PipelineError::InferenceFailed(result.diagnostic()));
        }
        require_output(output, |detail| {
            PipelineError::InferenceFailed(format!(
                "engine exited cleanly but {}; last output: {}",
                detail,
                result.diagnostic()
            ))
        })?;

        Ok(output.to_path_buf())
    }
}
