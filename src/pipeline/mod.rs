//! Generation pipeline: requests, worker context, orchestrator and dispatcher

mod context;
mod dispatcher;
mod orchestrator;
mod request;


pub use context::WorkerContext;
pub use dispatcher::Dispatcher;
pub use orchestrator::Orchestrator;
pub use request::{PipelineTask, ReplyMode, SubmitRequest, VideoSource};
