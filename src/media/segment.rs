//! Speaker material preparation: reference audio and fixed-length clips

use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::progress::PipelineStage;
use crate::utils::ffmpeg::{format_seconds, require_output, MediaTools};

/// Number of whole clips of `clip_length_secs` in a source of `duration_secs`
pub fn clip_count(duration_secs: f64, clip_length_secs: f64) -> usize {
    if !(duration_secs > 0.0 && clip_length_secs > 0.0) {
        return 0;
    }
    (duration_secs / clip_length_secs).floor() as usize
}

/// Extract the voice reference track from `video` into `output`
pub async fn extract_reference_audio(tools: &MediaTools, video: &Path, output: &Path) -> Result<()> {
    let invocation = tools
        .ffmpeg()
        .arg("-i")
        .arg(video)
        .args(["-q:a", "0", "-map", "a"])
        .arg(output);
    tools
        .run(invocation, PipelineStage::PreparingProfile, PipelineError::TransformFailed)
        .await?;
    require_output(output, PipelineError::TransformFailed)
}

/// Cut `video` into consecutive silent clips of `clip_length_secs` inside
/// `dir`, dropping the trailing remainder. Fails with
/// `InsufficientSourceLength` before running anything if no clip fits.
pub async fn cut_clips(
    tools: &MediaTools,
    video: &Path,
    duration_secs: f64,
    clip_length_secs: f64,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    let count = clip_count(duration_secs, clip_length_secs);
    if count == 0 {
        return Err(PipelineError::InsufficientSourceLength {
            duration: duration_secs,
            clip_length: clip_length_secs,
        });
    }
    log::info!(
        "Cutting {:.2}s source into {} clip(s) of {:.1}s",
        duration_secs,
        count,
        clip_length_secs
    );

    let mut clips = Vec::with_capacity(count);
    for i in 0..count {
        let clip = dir.join(format!("clip_{}.mp4", i));
        let invocation = tools
            .ffmpeg()
            .arg("-ss")
            .arg(format_seconds(i as f64 * clip_length_secs))
            .arg("-i")
            .arg(video)
            .arg("-t")
            .arg(format_seconds(clip_length_secs))
            .args(["-c", "copy", "-an"])
            .arg(&clip);
        tools
            .run(invocation, PipelineStage::PreparingProfile, PipelineError::ConcatenationFailed)
            .await?;
        require_output(&clip, PipelineError::ConcatenationFailed)?;
        clips.push(clip);
    }
    Ok(clips)
}
