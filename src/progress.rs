//! Pipeline stages and progress events
//!
//! Stages form a strictly forward state machine. `Failed` is absorbing and
//! reachable from every non-terminal stage; `Complete` is reached only from
//! `Inferring`.

use serde::{Deserialize, Serialize};

/// Stage of a pipeline task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Pending,
    PreparingProfile,
    /// Only entered in conversational reply mode
    GeneratingText,
    Synthesizing,
    Reconciling,
    BuildingTimeline,
    Muxing,
    Inferring,
    Complete,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::PreparingProfile => "PREPARING_PROFILE",
            Self::GeneratingText => "GENERATING_TEXT",
            Self::Synthesizing => "SYNTHESIZING",
            Self::Reconciling => "RECONCILING",
            Self::BuildingTimeline => "BUILDING_TIMELINE",
            Self::Muxing => "MUXING",
            Self::Inferring => "INFERRING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        }
    }

    /// Progress message published on entering the stage
    pub fn message(&self) -> &'static str {
        match self {
            Self::Pending => "Task accepted",
            Self::PreparingProfile => "Preparing speaker profile...",
            Self::GeneratingText => "Generating conversational text...",
            Self::Synthesizing => "Generating voice...",
            Self::Reconciling => "Adjusting speech pacing...",
            Self::BuildingTimeline => "Staging video...",
            Self::Muxing => "Combining video and audio...",
            Self::Inferring => "Running lip-sync inference...",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    fn ordinal(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::PreparingProfile => 1,
            Self::GeneratingText => 2,
            Self::Synthesizing => 3,
            Self::Reconciling => 4,
            Self::BuildingTimeline => 5,
            Self::Muxing => 6,
            Self::Inferring => 7,
            Self::Complete => 8,
            Self::Failed => 9,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Whether a task in `self` may move to `next`
    pub fn can_advance_to(&self, next: PipelineStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed => true,
            Self::Complete => *self == Self::Inferring,
            _ => next.ordinal() > self.ordinal(),
        }
    }

    /// Share of the whole run, in percent, used for the overall progress figure
    pub fn weight(&self) -> f32 {
        match self {
            Self::PreparingProfile => 10.0,
            Self::GeneratingText => 10.0,
            Self::Synthesizing => 20.0,
            Self::Reconciling => 5.0,
            Self::BuildingTimeline => 10.0,
            Self::Muxing => 10.0,
            Self::Inferring => 35.0,
            _ => 0.0,
        }
    }

    /// Overall progress at the moment the stage is entered
    pub fn progress_percent(&self) -> f32 {
        match self {
            Self::Complete => 100.0,
            Self::Pending | Self::Failed => 0.0,
            stage => ALL_STAGES
                .iter()
                .filter(|s| s.ordinal() < stage.ordinal())
                .map(|s| s.weight())
                .sum::<f32>()
                .clamp(0.0, 100.0),
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const ALL_STAGES: [PipelineStage; 7] = [
    PipelineStage::PreparingProfile,
    PipelineStage::GeneratingText,
    PipelineStage::Synthesizing,
    PipelineStage::Reconciling,
    PipelineStage::BuildingTimeline,
    PipelineStage::Muxing,
    PipelineStage::Inferring,
];

/// Progress notification broadcast to status subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: String,
    pub stage: PipelineStage,
    pub message: String,
    /// Overall progress (0.0 - 100.0)
    pub progress: f32,
}

impl ProgressEvent {
    pub fn new(task_id: impl Into<String>, stage: PipelineStage, message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            stage,
            message: message.into(),
            progress: stage.progress_percent(),
        }
    }
}
