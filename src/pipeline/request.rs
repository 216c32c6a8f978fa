//! Typed generation requests, validated once at submission

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{PipelineError, Result};
use crate::speaker::validate_speaker_id;

/// Where the speaker's video material comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoSource {
    /// Register the speaker from this upload, then generate
    Upload(PathBuf),
    /// Use the speaker's existing profile
    Registered,
}

/// What gets spoken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMode {
    /// Speak the request text as given
    #[default]
    Verbatim,
    /// Speak the dialogue engine's reply to the request text
    Conversational,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub speaker_id: String,
    pub text: String,
    /// Language tag; checked against the supported set during synthesis
    pub language: String,
    pub source: VideoSource,
    #[serde(default)]
    pub reply: ReplyMode,
}

impl SubmitRequest {
    /// Register `speaker_id` from `video` and speak `text`
    pub fn register(
        speaker_id: impl Into<String>,
        video: impl Into<PathBuf>,
        text: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            speaker_id: speaker_id.into(),
            text: text.into(),
            language: language.into(),
            source: VideoSource::Upload(video.into()),
            reply: ReplyMode::Verbatim,
        }
    }

    /// Speak `text` with an already registered speaker
    pub fn speak(speaker_id: impl Into<String>, text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            speaker_id: speaker_id.into(),
            text: text.into(),
            language: language.into(),
            source: VideoSource::Registered,
            reply: ReplyMode::Verbatim,
        }
    }

    pub fn conversational(mut self) -> Self {
        self.reply = ReplyMode::Conversational;
        self
    }

    pub fn is_registration(&self) -> bool {
        matches!(self.source, VideoSource::Upload(_))
    }

    pub fn validate(&self) -> Result<()> {
        validate_speaker_id(&self.speaker_id)?;
        if self.text.trim().is_empty() {
            return Err(PipelineError::Validation("text is required".to_string()));
        }
        if self.language.trim().is_empty() {
            return Err(PipelineError::Validation("language is required".to_string()));
        }
        if let VideoSource::Upload(video) = &self.source {
            if !video.is_file() {
                return Err(PipelineError::Validation(format!(
                    "video file {} does not exist",
                    video.display()
                )));
            }
        }
        Ok(())
    }
}

/// An accepted request with its caller-visible id
#[derive(Debug, Clone)]
pub struct PipelineTask {
    pub id: String,
    pub request: SubmitRequest,
}

impl PipelineTask {
    pub fn new(request: SubmitRequest) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request,
        }
    }
}
