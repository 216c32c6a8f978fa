//! Voice-cloning synthesis through the Coqui `tts` command line tool

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{run_engine, Language, SpeechSynthesizer};
use crate::error::{PipelineError, Result};
use crate::utils::process::{CommandRunner, ToolInvocation};

/// Multilingual voice-cloning engine conditioned on a reference recording
pub struct VoiceCloneEngine {
    runner: Arc<dyn CommandRunner>,
    program: String,
    model: String,
    timeout: Duration,
}

impl VoiceCloneEngine {
    pub fn new(runner: Arc<dyn CommandRunner>, program: &str, model: &str, timeout_secs: u64) -> Self {
        Self {
            runner,
            program: program.to_string(),
            model: model.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn invocation(&self, text: &str, language: Language, reference: &Path, output: &Path) -> ToolInvocation {
        ToolInvocation::new(&self.program)
            .arg("--text")
            .arg(text)
            .arg("--model_name")
            .arg(&self.model)
            .arg("--speaker_wav")
            .arg(reference)
            .arg("--language_idx")
            .arg(language.tag())
            .arg("--out_path")
            .arg(output)
    }
}

#[async_trait]
impl SpeechSynthesizer for VoiceCloneEngine {
    fn engine_name(&self) -> &str {
        &self.program
    }

    fn output_extension(&self) -> &'static str {
        "wav"
    }

    fn requires_reference(&self) -> bool {
        true
    }

    async fn synthesize(
        &self,
        text: &str,
        language: Language,
        reference_audio: Option<&Path>,
        output: &Path,
    ) -> Result<()> {
        let reference = reference_audio.ok_or_else(|| {
            PipelineError::Validation("voice cloning requires reference audio".to_string())
        })?;
        let invocation = self.invocation(text, language, reference, output);
        run_engine(self.runner.as_ref(), &self.program, &invocation, self.timeout).await
    }
}
