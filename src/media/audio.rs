//! Audio timing reconciliation
//!
//! Slows synthesized speech by the pace factor and derives the target
//! duration every later stage is cut to.

use crate::error::{PipelineError, Result};
use crate::progress::PipelineStage;
use crate::utils::ffmpeg::{require_output, MediaTools};
use crate::utils::temp::{ArtifactKind, MediaArtifact, TempResourceTracker};

/// Range of a single ffmpeg `atempo` filter
const ATEMPO_MIN: f64 = 0.5;
const ATEMPO_MAX: f64 = 2.0;

/// Split a tempo ratio into `atempo` factors that each stay within range
pub fn atempo_chain(ratio: f64) -> Vec<f64> {
    let mut factors = Vec::new();
    let mut rest = ratio;
    while rest > ATEMPO_MAX {
        factors.push(ATEMPO_MAX);
        rest /= ATEMPO_MAX;
    }
    while rest < ATEMPO_MIN {
        factors.push(ATEMPO_MIN);
        rest /= ATEMPO_MIN;
    }
    factors.push(rest);
    factors
}

/// `-filter:a` expression applying `ratio` as a tempo change
pub fn atempo_filter(ratio: f64) -> String {
    atempo_chain(ratio)
        .iter()
        .map(|f| format!("atempo={:.6}", f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Duration the stretched audio should have
pub fn target_duration(source_secs: f64, pace_factor: f64) -> f64 {
    source_secs * pace_factor
}

/// Stretch `speech` by `pace_factor`, returning the stretched artifact and
/// its target duration in seconds
pub async fn reconcile(
    tools: &MediaTools,
    speech: &MediaArtifact,
    pace_factor: f64,
    tracker: &mut TempResourceTracker,
) -> Result<(MediaArtifact, f64)> {
    if !(pace_factor.is_finite() && pace_factor > 0.0) {
        return Err(PipelineError::Validation(format!(
            "pace factor must be positive, got {}",
            pace_factor
        )));
    }

    let source_secs = match speech.duration {
        Some(secs) => secs,
        None => {
            tools
                .probe_duration(&speech.path, PipelineStage::Reconciling)
                .await?
        }
    };
    let target = target_duration(source_secs, pace_factor);
    let ratio = 1.0 / pace_factor;
    log::info!(
        "Speech is {:.3}s, stretching by {:.4} to {:.3}s",
        source_secs,
        ratio,
        target
    );

    let output = tracker.allocate(ArtifactKind::StretchedSpeech)?;
    let invocation = tools
        .ffmpeg()
        .arg("-i")
        .arg(&speech.path)
        .arg("-filter:a")
        .arg(atempo_filter(ratio))
        .arg(&output);
    tools
        .run(invocation, PipelineStage::Reconciling, PipelineError::TransformFailed)
        .await?;
    require_output(&output, PipelineError::TransformFailed)?;

    Ok((
        MediaArtifact::new(ArtifactKind::StretchedSpeech, output).with_duration(target),
        target,
    ))
}
