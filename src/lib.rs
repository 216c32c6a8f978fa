//! Speaker registration, voice-cloned speech synthesis and lip-sync video
//! generation, driven as a staged pipeline over external media tools.

pub mod config;
pub mod error;
pub mod inference;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod speaker;
pub mod status;
pub mod text;
pub mod tts;
pub mod utils;

pub use config::PipelineConfig;
pub use error::{ErrorKind, PipelineError, Result};
pub use pipeline::{Dispatcher, Orchestrator, SubmitRequest, WorkerContext};
pub use progress::{PipelineStage, ProgressEvent};
pub use status::{TaskFailure, TaskStatus, TaskStatusStore};
