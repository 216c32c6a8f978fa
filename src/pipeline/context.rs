//! Per-worker engine handles
//!
//! Built once at startup and shared read-only by every task.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::inference::InferenceInvoker;
use crate::speaker::{FileSpeakerStore, SpeakerStore};
use crate::text::{dialogue, DialogueEngine, EnglishNumberSpeller, TextTransform};
use crate::tts::SynthesizerSet;
use crate::utils::ffmpeg::MediaTools;
use crate::utils::process::{CommandRunner, SystemRunner};

pub struct WorkerContext {
    pub config: PipelineConfig,
    pub media: MediaTools,
    pub synthesizers: SynthesizerSet,
    /// Absent when dialogue generation is disabled
    pub dialogue: Option<Arc<dyn DialogueEngine>>,
    /// Absent when number spelling is disabled
    pub transform: Option<Box<dyn TextTransform>>,
    pub inference: InferenceInvoker,
    pub speakers: Arc<dyn SpeakerStore>,
}

impl WorkerContext {
    /// Context running real child processes
    pub fn from_config(config: PipelineConfig) -> Self {
        Self::with_runner(config, Arc::new(SystemRunner))
    }

    pub fn with_runner(config: PipelineConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let media = MediaTools::new(runner.clone(), &config);
        let synthesizers = SynthesizerSet::from_config(runner.clone(), &config);
        let inference = InferenceInvoker::new(runner, &config);

        let dialogue = dialogue::engine_for(&config);
        let transform: Option<Box<dyn TextTransform>> = if config.spell_numbers {
            Some(Box::new(EnglishNumberSpeller))
        } else {
            None
        };
        let speakers: Arc<dyn SpeakerStore> = Arc::new(FileSpeakerStore::new(config.speakers_dir()));

        Self {
            config,
            media,
            synthesizers,
            dialogue,
            transform,
            inference,
            speakers,
        }
    }

    pub fn with_synthesizers(mut self, synthesizers: SynthesizerSet) -> Self {
        self.synthesizers = synthesizers;
        self
    }

    pub fn with_dialogue(mut self, dialogue: Option<Arc<dyn DialogueEngine>>) -> Self {
        self.dialogue = dialogue;
        self
    }
}
