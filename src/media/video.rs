//! Video timeline building
//!
//! Produces a video-only timeline at least as long as the target duration,
//! either by cycling a speaker's pre-cut clip bank or by looping one source
//! video and cutting the result to the target.

use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::progress::PipelineStage;
use crate::utils::ffmpeg::{format_seconds, require_output, write_concat_list, MediaTools};
use crate::utils::temp::{ArtifactKind, MediaArtifact, TempResourceTracker};

/// Number of `unit_secs` pieces needed to cover `target_secs`, at least one
pub fn units_needed(target_secs: f64, unit_secs: f64) -> usize {
    if !(target_secs > 0.0 && unit_secs > 0.0) {
        return 1;
    }
    ((target_secs / unit_secs).ceil() as usize).max(1)
}

/// `count` clips taken from `bank` in order, wrapping around to the first
/// clip once the bank is exhausted
pub fn select_clips(bank: &[PathBuf], count: usize) -> Vec<&Path> {
    bank.iter().cycle().take(count).map(PathBuf::as_path).collect()
}

/// Clip-bank mode: concatenate `ceil(target / clip_length)` clips
pub async fn build_from_clips(
    tools: &MediaTools,
    bank: &[PathBuf],
    clip_length_secs: f64,
    target_secs: f64,
    tracker: &mut TempResourceTracker,
) -> Result<MediaArtifact> {
    if bank.is_empty() {
        return Err(PipelineError::ConcatenationFailed(
            "speaker clip bank is empty".to_string(),
        ));
    }

    let needed = units_needed(target_secs, clip_length_secs);
    let selected = select_clips(bank, needed);
    log::info!(
        "Timeline of {:.3}s needs {} clip(s) of {:.1}s from a bank of {}",
        target_secs,
        needed,
        clip_length_secs,
        bank.len()
    );

    let list = tracker.allocate(ArtifactKind::ConcatList)?;
    write_concat_list(&list, &selected)?;

    let output = tracker.allocate(ArtifactKind::VideoTimeline)?;
    let invocation = tools
        .ffmpeg()
        .args(["-f", "concat", "-safe", "0", "-i"])
        .arg(&list)
        .args(["-c", "copy", "-an"])
        .arg(&output);
    tools
        .run(invocation, PipelineStage::BuildingTimeline, PipelineError::ConcatenationFailed)
        .await?;
    require_output(&output, PipelineError::ConcatenationFailed)?;

    Ok(MediaArtifact::new(ArtifactKind::VideoTimeline, output)
        .with_duration(needed as f64 * clip_length_secs))
}

/// Loop mode: repeat `source` `ceil(target / source)` times, cut to exactly `target`
pub async fn build_loop(
    tools: &MediaTools,
    source: &Path,
    target_secs: f64,
    tracker: &mut TempResourceTracker,
) -> Result<MediaArtifact> {
    let source_secs = tools
        .probe_duration(source, PipelineStage::BuildingTimeline)
        .await?;
    let loops = units_needed(target_secs, source_secs);
    log::info!(
        "Looping {:.3}s source {} time(s) to cover {:.3}s",
        source_secs,
        loops,
        target_secs
    );

    let list = tracker.allocate(ArtifactKind::ConcatList)?;
    let entries = vec![source; loops];
    write_concat_list(&list, &entries)?;

    let output = tracker.allocate(ArtifactKind::VideoTimeline)?;
    let invocation = tools
        .ffmpeg()
        .args(["-f", "concat", "-safe", "0", "-i"])
        .arg(&list)
        .arg("-t")
        .arg(format_seconds(target_secs))
        .args(["-c", "copy", "-an"])
        .arg(&output);
    tools
        .run(invocation, PipelineStage::BuildingTimeline, PipelineError::ConcatenationFailed)
        .await?;
    require_output(&output, PipelineError::ConcatenationFailed)?;

    Ok(MediaArtifact::new(ArtifactKind::VideoTimeline, output).with_duration(target_secs))
}
