//! Speech synthesis
//!
//! One engine per language behind the [`SpeechSynthesizer`] trait. English
//! goes through a voice-cloning engine conditioned on the speaker's reference
//! audio; Hindi goes through Google TTS with a stock voice.

pub mod gtts;
pub mod voice_clone;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::progress::PipelineStage;
use crate::utils::process::{CommandRunner, ToolInvocation};
use crate::utils::temp::{ArtifactKind, MediaArtifact, TempResourceTracker};
use crate::utils::tools;

pub use gtts::GttsEngine;
pub use voice_clone::VoiceCloneEngine;

/// Supported output languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "hi")]
    Hindi,
}

impl Language {
    /// Parse a language tag such as `en` or `hi`
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::English),
            "hi" => Ok(Language::Hindi),
            _ => Err(PipelineError::UnsupportedLanguage(tag.trim().to_string())),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Hindi => "hi",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A speech synthesis engine
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn engine_name(&self) -> &str;

    /// Extension of the audio file the engine writes
    fn output_extension(&self) -> &'static str;

    /// Whether the engine clones a voice from reference audio
    fn requires_reference(&self) -> bool {
        false
    }

    /// Write speech for `text` to `output`
    async fn synthesize(
        &self,
        text: &str,
        language: Language,
        reference_audio: Option<&Path>,
        output: &Path,
    ) -> Result<()>;
}

/// Run an engine command line, mapping failures onto the synthesis taxonomy
pub(crate) async fn run_engine(
    runner: &dyn CommandRunner,
    engine: &str,
    invocation: &ToolInvocation,
    timeout: Duration,
) -> Result<()> {
    let output = runner
        .run(invocation, timeout)
        .await
        .map_err(|e| {
            e.into_stage_error(PipelineStage::Synthesizing, |message| {
                PipelineError::EngineUnavailable {
                    engine: engine.to_string(),
                    message,
                }
            })
        })?;

    if !output.success {
        log::error!("{} failed: {}", engine, output.diagnostic());
        return Err(PipelineError::SynthesisFailed(format!(
            "{}: {}",
            engine,
            output.diagnostic()
        )));
    }
    Ok(())
}

/// Language to engine routing, built once per worker
#[derive(Default, Clone)]
pub struct SynthesizerSet {
    engines: HashMap<Language, Arc<dyn SpeechSynthesizer>>,
    /// Why a language has no engine, when discovery found it missing
    missing: HashMap<Language, (String, String)>,
}

impl SynthesizerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, language: Language, engine: Arc<dyn SpeechSynthesizer>) -> Self {
        self.missing.remove(&language);
        self.engines.insert(language, engine);
        self
    }

    /// Discover the configured engines. A missing binary leaves its language
    /// unroutable; requests for it fail with `EngineUnavailable`.
    pub fn from_config(runner: Arc<dyn CommandRunner>, config: &PipelineConfig) -> Self {
        let mut set = Self::new();
        let timeout = config.timeouts.synthesis;

        match tools::locate(&config.synthesis.voice_clone_bin) {
            Ok(path) => {
                log::info!("Voice-clone engine found at {}", path.display());
                let engine = VoiceCloneEngine::new(
                    runner.clone(),
                    &config.synthesis.voice_clone_bin,
                    &config.synthesis.voice_clone_model,
                    timeout,
                );
                set = set.with_engine(Language::English, Arc::new(engine));
            }
            Err(e) => {
                log::warn!("English synthesis disabled: {}", e);
                set.missing.insert(
                    Language::English,
                    (config.synthesis.voice_clone_bin.clone(), e.to_string()),
                );
            }
        }

        match tools::locate(&config.synthesis.gtts_bin) {
            Ok(path) => {
                log::info!("Google TTS found at {}", path.display());
                let engine = GttsEngine::new(runner, &config.synthesis.gtts_bin, timeout);
                set = set.with_engine(Language::Hindi, Arc::new(engine));
            }
            Err(e) => {
                log::warn!("Hindi synthesis disabled: {}", e);
                set.missing
                    .insert(Language::Hindi, (config.synthesis.gtts_bin.clone(), e.to_string()));
            }
        }

        set
    }

    /// Synthesize `text` in the language named by `tag` into a tracked artifact
    pub async fn synthesize(
        &self,
        text: &str,
        tag: &str,
        reference_audio: Option<&Path>,
        tracker: &mut TempResourceTracker,
    ) -> Result<MediaArtifact> {
        let language = Language::from_tag(tag)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::Validation("text must not be empty".to_string()));
        }

        let engine = self.engines.get(&language).ok_or_else(|| match self.missing.get(&language) {
            Some((engine, reason)) => PipelineError::EngineUnavailable {
                engine: engine.clone(),
                message: reason.clone(),
            },
            None => PipelineError::EngineUnavailable {
                engine: format!("tts[{}]", language),
                message: "no engine configured for this language".to_string(),
            },
        })?;

        if engine.requires_reference() {
            match reference_audio {
                Some(path) if path.exists() => {}
                Some(path) => {
                    return Err(PipelineError::NotFound(format!(
                        "reference audio {}",
                        path.display()
                    )));
                }
                None => {
                    return Err(PipelineError::Validation(format!(
                        "{} requires reference audio",
                        engine.engine_name()
                    )));
                }
            }
        }

        let output = tracker.allocate_with_extension(ArtifactKind::RawSpeech, engine.output_extension())?;
        log::info!(
            "Synthesizing {} chars of {} speech with {}",
            text.chars().count(),
            language,
            engine.engine_name()
        );
        engine.synthesize(text, language, reference_audio, &output).await?;

        let written = std::fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(PipelineError::SynthesisFailed(format!(
                "{} produced no audio at {}",
                engine.engine_name(),
                output.display()
            )));
        }

        Ok(MediaArtifact::new(ArtifactKind::RawSpeech, output))
    }
}
