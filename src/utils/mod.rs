pub mod ffmpeg;
pub mod logger;
pub mod process;
pub mod temp;
pub mod tools;

pub use ffmpeg::MediaTools;
pub use process::{CommandRunner, SystemRunner, ToolInvocation, ToolOutput};
pub use temp::{ArtifactKind, MediaArtifact, TempResourceTracker};
