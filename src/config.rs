//! Pipeline configuration
//!
//! Loaded once at worker startup: defaults, then an optional JSON file, then
//! `LIPSYNC_*` environment overrides, then validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::progress::PipelineStage;

/// Default slowdown applied to synthesized speech
pub const DEFAULT_PACE_FACTOR: f64 = 1.2;

/// Default length of one pre-cut clip in the speaker's bank
pub const DEFAULT_CLIP_LENGTH_SECS: f64 = 5.0;

/// How the video timeline is assembled
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimelineMode {
    /// Cycle through the speaker's pre-cut clips
    #[default]
    ClipBank,
    /// Repeat the speaker's original source video
    Loop,
}

/// Lip-sync inference engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub checkpoint_path: PathBuf,
    /// Directory the inference script runs in
    pub working_dir: PathBuf,
    pub script: String,
    pub resize_factor: u32,
    /// Face padding box: top, bottom, left, right
    pub pads: [u32; 4],
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: PathBuf::from("Wav2Lip/checkpoints/wav2lip_gan.pth"),
            working_dir: PathBuf::from("Wav2Lip"),
            script: "inference.py".to_string(),
            resize_factor: 2,
            pads: [0, 10, 0, 0],
        }
    }
}

/// Speech synthesis engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Voice-cloning TTS command line tool
    pub voice_clone_bin: String,
    pub voice_clone_model: String,
    /// Google TTS command line tool
    pub gtts_bin: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            voice_clone_bin: "tts".to_string(),
            voice_clone_model: "tts_models/multilingual/multi-dataset/your_tts".to_string(),
            gtts_bin: "gtts-cli".to_string(),
        }
    }
}

/// Dialogue-generation engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
        }
    }
}

/// Wall-clock bounds for external invocations, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub preparing_profile: u64,
    pub dialogue: u64,
    pub synthesis: u64,
    pub probe: u64,
    pub transform: u64,
    pub concat: u64,
    pub mux: u64,
    pub inference: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            preparing_profile: 300,
            dialogue: 120,
            synthesis: 300,
            probe: 30,
            transform: 120,
            concat: 300,
            mux: 600,
            inference: 1800,
        }
    }
}

impl StageTimeouts {
    /// Bound for the external invocations made while in `stage`
    pub fn for_stage(&self, stage: PipelineStage) -> Duration {
        let secs = match stage {
            PipelineStage::PreparingProfile => self.preparing_profile,
            PipelineStage::GeneratingText => self.dialogue,
            PipelineStage::Synthesizing => self.synthesis,
            PipelineStage::Reconciling => self.transform,
            PipelineStage::BuildingTimeline => self.concat,
            PipelineStage::Muxing => self.mux,
            PipelineStage::Inferring => self.inference,
            _ => self.probe,
        };
        Duration::from_secs(secs)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe)
    }

    /// A zero bound would fail every call made under it
    pub fn validate(&self) -> Result<()> {
        let bounds = [
            ("preparing_profile", self.preparing_profile),
            ("dialogue", self.dialogue),
            ("synthesis", self.synthesis),
            ("probe", self.probe),
            ("transform", self.transform),
            ("concat", self.concat),
            ("mux", self.mux),
            ("inference", self.inference),
        ];
        match bounds.iter().find(|(_, secs)| *secs == 0) {
            Some((name, _)) => Err(PipelineError::Configuration(format!(
                "timeouts.{} must be at least 1 second",
                name
            ))),
            None => Ok(()),
        }
    }
}

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root for speakers/, temp/ and results/
    pub media_root: PathBuf,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub python_bin: String,
    /// Multiplicative slowdown applied to synthesized speech
    pub pace_factor: f64,
    pub clip_length_secs: f64,
    pub timeline_mode: TimelineMode,
    pub inference: InferenceConfig,
    pub synthesis: SynthesisConfig,
    pub dialogue: DialogueConfig,
    pub timeouts: StageTimeouts,
    /// Number of tasks allowed to run at once
    pub workers: usize,
    /// Rewrite digits as words before synthesis
    pub spell_numbers: bool,
    /// Finished tasks kept in the status store
    pub status_retention: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("media"),
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            python_bin: "python3".to_string(),
            pace_factor: DEFAULT_PACE_FACTOR,
            clip_length_secs: DEFAULT_CLIP_LENGTH_SECS,
            timeline_mode: TimelineMode::default(),
            inference: InferenceConfig::default(),
            synthesis: SynthesisConfig::default(),
            dialogue: DialogueConfig::default(),
            timeouts: StageTimeouts::default(),
            workers: 2,
            spell_numbers: true,
            status_retention: crate::status::DEFAULT_RETENTION,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from an optional JSON file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    PipelineError::Configuration(format!(
                        "Failed to read config {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                serde_json::from_str::<PipelineConfig>(&raw).map_err(|e| {
                    PipelineError::Configuration(format!(
                        "Failed to parse config {}: {}",
                        path.display(),
                        e
                    ))
                })?
            }
            None => PipelineConfig::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LIPSYNC_*` overrides using the given variable lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("LIPSYNC_MEDIA_ROOT") {
            self.media_root = PathBuf::from(root);
        }
        if let Some(workers) = lookup("LIPSYNC_WORKERS") {
            self.workers = workers.trim().parse().map_err(|_| {
                PipelineError::Configuration(format!("LIPSYNC_WORKERS is not a number: {}", workers))
            })?;
        }
        if let Some(pace) = lookup("LIPSYNC_PACE_FACTOR") {
            self.pace_factor = pace.trim().parse().map_err(|_| {
                PipelineError::Configuration(format!("LIPSYNC_PACE_FACTOR is not a number: {}", pace))
            })?;
        }
        if let Some(url) = lookup("LIPSYNC_OLLAMA_URL") {
            self.dialogue.base_url = url;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.pace_factor.is_finite() && self.pace_factor > 0.0) {
            return Err(PipelineError::Configuration(format!(
                "pace_factor must be positive, got {}",
                self.pace_factor
            )));
        }
        if !(self.clip_length_secs.is_finite() && self.clip_length_secs > 0.0) {
            return Err(PipelineError::Configuration(format!(
                "clip_length_secs must be positive, got {}",
                self.clip_length_secs
            )));
        }
        if self.workers == 0 {
            return Err(PipelineError::Configuration("workers must be at least 1".to_string()));
        }
        if self.status_retention == 0 {
            return Err(PipelineError::Configuration(
                "status_retention must be at least 1".to_string(),
            ));
        }
        self.timeouts.validate()
    }

    pub fn speakers_dir(&self) -> PathBuf {
        self.media_root.join("speakers")
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.media_root.join("temp")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.media_root.join("results")
    }
}
