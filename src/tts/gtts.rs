//! Google TTS through the `gtts-cli` command line tool

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{run_engine, Language, SpeechSynthesizer};
use crate::error::Result;
use crate::utils::process::{CommandRunner, ToolInvocation};

pub struct GttsEngine {
    runner: Arc<dyn CommandRunner>,
    program: String,
    timeout: Duration,
}

impl GttsEngine {
    pub fn new(runner: Arc<dyn CommandRunner>, program: &str, timeout_secs: u64) -> Self {
        Self {
            runner,
            program: program.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn invocation(&self, text: &str, language: Language, output: &Path) -> ToolInvocation {
        // Text goes after `--` so a leading dash is never read as an option
        ToolInvocation::new(&self.program)
            .args(["--lang", language.tag()])
            .arg("--output")
            .arg(output)
            .arg("--")
            .arg(text)
    }
}

#[async_trait]
impl SpeechSynthesizer for GttsEngine {
    fn engine_name(&self) -> &str {
        &self.program
    }

    fn output_extension(&self) -> &'static str {
        "mp3"
    }

    async fn synthesize(
        &self,
        text: &str,
        language: Language,
        _reference_audio: Option<&Path>,
        output: &Path,
    ) -> Result<()> {
        let invocation = self.invocation(text, language, output);
        run_engine(self.runner.as_ref(), &self.program, &invocation, self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::process::testing::ScriptedRunner;

    #[test]
    fn test_text_is_last_after_separator() {
        let engine = GttsEngine::new(Arc::new(ScriptedRunner::new()), "gtts-cli", 30);
        let inv = engine.invocation("-5 degrees", Language::Hindi, Path::new("/tmp/out.mp3"));
        let n = inv.args.len();
        assert_eq!(inv.args[n - 2], "--");
        assert_eq!(inv.args[n - 1], "-5 degrees");
        assert_eq!(inv.value_of("--output").unwrap(), "/tmp/out.mp3");
    }
}
