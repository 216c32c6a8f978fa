//! Pipeline orchestrator
//!
//! Runs one task through its stages strictly in order, publishing each stage
//! to the status store. Every exit path releases the task's scratch space
//! before the terminal status is written; a failed run also removes any
//! partial result.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;

use super::context::WorkerContext;
use super::request::{PipelineTask, ReplyMode, VideoSource};
use crate::config::TimelineMode;
use crate::error::{PipelineError, Result};
use crate::media::{self, segment};
use crate::progress::PipelineStage;
use crate::speaker::SpeakerProfile;
use crate::status::TaskStatusStore;
use crate::text;
use crate::tts::Language;
use crate::utils::temp::TempResourceTracker;

/// Current stage of a run and when it was entered
struct StageCursor<'a> {
    task_id: &'a str,
    status: &'a TaskStatusStore,
    stage: PipelineStage,
    entered: Instant,
}

impl<'a> StageCursor<'a> {
    fn new(task_id: &'a str, status: &'a TaskStatusStore) -> Self {
        Self {
            task_id,
            status,
            stage: PipelineStage::Pending,
            entered: Instant::now(),
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        self.log_elapsed();
        if !self.status.advance(self.task_id, stage, stage.message()) {
            log::warn!("Task {}: status store refused {}", self.task_id, stage);
        }
        log::info!("Task {}: {}", self.task_id, stage.message());
        self.stage = stage;
        self.entered = Instant::now();
    }

    fn log_elapsed(&self) {
        if self.stage != PipelineStage::Pending {
            log::info!(
                "Task {}: {} took {:.2} seconds",
                self.task_id,
                self.stage,
                self.entered.elapsed().as_secs_f64()
            );
        }
    }
}

pub struct Orchestrator<'a> {
    ctx: &'a WorkerContext,
    status: &'a TaskStatusStore,
}

impl<'a> Orchestrator<'a> {
    pub fn new(ctx: &'a WorkerContext, status: &'a TaskStatusStore) -> Self {
        Self { ctx, status }
    }

    /// Durable location of a task's final render
    pub fn result_path(&self, task_id: &str) -> PathBuf {
        self.ctx
            .config
            .results_dir()
            .join(format!("{}_result.mp4", task_id))
    }

    /// Run `task` to a terminal state. The task must already be PENDING in
    /// the status store.
    pub async fn run(&self, task: &PipelineTask) -> Result<PathBuf> {
        self.run_holding(task, ()).await
    }

    /// Like [`run`](Self::run), holding `guard` until the task's scratch is
    /// released. The guard is dropped before the terminal status is
    /// published, so anything it locks is free once a watcher sees the task
    /// finish.
    pub async fn run_holding<G: Send>(&self, task: &PipelineTask, guard: G) -> Result<PathBuf> {
        let started = Instant::now();
        let mut cursor = StageCursor::new(&task.id, self.status);
        let result_path = self.result_path(&task.id);

        let outcome = match TempResourceTracker::create(&self.ctx.config.scratch_root(), &task.id) {
            Ok(mut tracker) => {
                let outcome = self.execute(task, &mut cursor, &mut tracker, &result_path).await;
                log::debug!(
                    "Task {}: releasing {} temporary file(s)",
                    task.id,
                    tracker.allocated().len()
                );
                let leaked = tracker.release_all();
                if leaked > 0 {
                    log::warn!("Task {}: {} temporary file(s) could not be removed", task.id, leaked);
                }
                outcome
            }
            Err(e) => Err(e),
        };
        cursor.log_elapsed();
        if outcome.is_err() {
            remove_partial(&result_path);
        }
        drop(guard);

        match outcome {
            Ok(path) => {
                self.status.complete(&task.id, path.clone());
                log::info!(
                    "Task {} complete in {:.2} seconds: {}",
                    task.id,
                    started.elapsed().as_secs_f64(),
                    path.display()
                );
                Ok(path)
            }
            Err(e) => {
                log::error!("Task {} failed during {}: {}", task.id, cursor.stage, e);
                self.status.fail(&task.id, cursor.stage, &e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        task: &PipelineTask,
        cursor: &mut StageCursor<'_>,
        tracker: &mut TempResourceTracker,
        result_path: &Path,
    ) -> Result<PathBuf> {
        let ctx = self.ctx;
        let request = &task.request;

        cursor.enter(PipelineStage::PreparingProfile);
        let profile = match &request.source {
            VideoSource::Upload(video) => self.register(&request.speaker_id, video).await?,
            VideoSource::Registered => ctx.speakers.get(&request.speaker_id)?,
        };

        let text = match request.reply {
            ReplyMode::Verbatim => request.text.clone(),
            ReplyMode::Conversational => {
                cursor.enter(PipelineStage::GeneratingText);
                let engine = ctx.dialogue.as_deref().ok_or_else(text::dialogue::disabled)?;
                let reply = text::converse(engine, &request.text).await?;
                self.status.note(&task.id, "Generated reply text");
                reply
            }
        };

        cursor.enter(PipelineStage::Synthesizing);
        let spoken = match Language::from_tag(&request.language) {
            Ok(Language::English) => text::normalize(&text, ctx.transform.as_deref()),
            _ => text,
        };
        let speech = ctx
            .synthesizers
            .synthesize(&spoken, &request.language, Some(&profile.reference_audio), tracker)
            .await?;

        cursor.enter(PipelineStage::Reconciling);
        let (stretched, target_secs) =
            media::reconcile(&ctx.media, &speech, ctx.config.pace_factor, tracker).await?;

        cursor.enter(PipelineStage::BuildingTimeline);
        let timeline = match ctx.config.timeline_mode {
            TimelineMode::ClipBank => {
                media::build_from_clips(
                    &ctx.media,
                    &profile.clips,
                    profile.clip_length_secs,
                    target_secs,
                    tracker,
                )
                .await?
            }
            TimelineMode::Loop => {
                media::build_loop(&ctx.media, &profile.source_video, target_secs, tracker).await?
            }
        };

        cursor.enter(PipelineStage::Muxing);
        let muxed = media::mux(&ctx.media, &timeline, &stretched, target_secs, tracker).await?;

        cursor.enter(PipelineStage::Inferring);
        if let Some(dir) = result_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        ctx.inference
            .infer(&muxed.path, &stretched.path, result_path)
            .await
    }

    /// Build and persist a new speaker profile from an uploaded video
    async fn register(&self, speaker_id: &str, video: &Path) -> Result<SpeakerProfile> {
        let speakers = &self.ctx.speakers;
        let dir = speakers.reserve(speaker_id)?;

        let profile = match self.build_profile(speaker_id, video, &dir).await {
            Ok(profile) => profile,
            Err(e) => {
                speakers.discard(speaker_id);
                return Err(e);
            }
        };
        if let Err(e) = speakers.commit(&profile) {
            speakers.discard(speaker_id);
            return Err(e);
        }
        Ok(profile)
    }

    async fn build_profile(&self, speaker_id: &str, video: &Path, dir: &Path) -> Result<SpeakerProfile> {
        let media = &self.ctx.media;
        let clip_length = self.ctx.config.clip_length_secs;

        let extension = video
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let source = dir.join(format!("source.{}", extension));
        std::fs::copy(video, &source)?;

        let reference = dir.join("voice_reference.wav");
        segment::extract_reference_audio(media, &source, &reference).await?;

        let duration = media
            .probe_duration(&source, PipelineStage::PreparingProfile)
            .await?;
        let clips = segment::cut_clips(media, &source, duration, clip_length, dir).await?;

        Ok(SpeakerProfile {
            speaker_id: speaker_id.to_string(),
            reference_audio: reference,
            clips,
            source_video: source,
            clip_length_secs: clip_length,
            created_at: Utc::now(),
        })
    }
}

fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("Removed partial result {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Error removing partial result '{}': {}", path.display(), e),
    }
}
