//! Media processing stages built on ffmpeg

pub mod audio;
pub mod mux;
pub mod segment;
pub mod video;

pub use audio::reconcile;
pub use mux::mux;
pub use video::{build_from_clips, build_loop};
