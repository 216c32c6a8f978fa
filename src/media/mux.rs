//! Audio/video muxing

use crate::error::{PipelineError, Result};
use crate::progress::PipelineStage;
use crate::utils::ffmpeg::{format_seconds, require_output, MediaTools};
use crate::utils::temp::{ArtifactKind, MediaArtifact, TempResourceTracker};

/// Re-encode `timeline` and `audio` into one container holding exactly one
/// video and one audio stream, cut to the audio's duration
pub async fn mux(
    tools: &MediaTools,
    timeline: &MediaArtifact,
    audio: &MediaArtifact,
    duration_secs: f64,
    tracker: &mut TempResourceTracker,
) -> Result<MediaArtifact> {
    if !(duration_secs.is_finite() && duration_secs > 0.0) {
        return Err(PipelineError::MuxFailed(format!(
            "invalid output duration {}",
            duration_secs
        )));
    }
    if let Some(video_secs) = timeline.duration {
        if video_secs + 1e-6 < duration_secs {
            log::warn!(
                "Timeline ({:.3}s) is shorter than the audio ({:.3}s)",
                video_secs,
                duration_secs
            );
        }
    }

    let output = tracker.allocate(ArtifactKind::MuxedInput)?;
    let invocation = tools
        .ffmpeg()
        .arg("-i")
        .arg(&timeline.path)
        .arg("-i")
        .arg(&audio.path)
        .args(["-c:v", "libx264", "-c:a", "aac"])
        .args(["-map", "0:v:0", "-map", "1:a:0"])
        .arg("-t")
        .arg(format_seconds(duration_secs))
        .arg(&output);
    tools
        .run(invocation, PipelineStage::Muxing, PipelineError::MuxFailed)
        .await?;
    require_output(&output, PipelineError::MuxFailed)?;

    Ok(MediaArtifact::new(ArtifactKind::MuxedInput, output).with_duration(duration_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::utils::process::testing::ScriptedRunner;
    use std::sync::Arc;

    fn inputs(tracker: &mut TempResourceTracker) -> (MediaArtifact, MediaArtifact) {
        let video = tracker.allocate(ArtifactKind::VideoTimeline).unwrap();
        let audio = tracker.allocate(ArtifactKind::StretchedSpeech).unwrap();
        (
            MediaArtifact::new(ArtifactKind::VideoTimeline, video).with_duration(5.0),
            MediaArtifact::new(ArtifactKind::StretchedSpeech, audio).with_duration(3.6),
        )
    }

    #[tokio::test]
    async fn test_mux_maps_one_stream_each_and_truncates() {
        let runner = Arc::new(ScriptedRunner::new());
        let tools = MediaTools::new(runner.clone(), &PipelineConfig::default());
        let root = tempfile::tempdir().unwrap();
        let mut tracker = TempResourceTracker::create(root.path(), "mux").unwrap();
        let (video, audio) = inputs(&mut tracker);

        let muxed = mux(&tools, &video, &audio, 3.6, &mut tracker).await.unwrap();
        assert_eq!(muxed.kind, ArtifactKind::MuxedInput);
        assert_eq!(muxed.duration, Some(3.6));

        let call = &runner.calls_to("ffmpeg")[0];
        let line = call.display();
        assert!(line.contains("-map 0:v:0 -map 1:a:0"));
        assert!(line.contains("-c:v libx264 -c:a aac"));
        assert_eq!(call.value_of("-t").unwrap(), "3.600");
        assert_eq!(call.args.last().unwrap(), muxed.path.as_os_str());
    }

    #[tokio::test]
    async fn test_mux_failure() {
        let runner = Arc::new(ScriptedRunner::new().fail_when("libx264", 1, "Unknown encoder 'libx264'"));
        let tools = MediaTools::new(runner, &PipelineConfig::default());
        let root = tempfile::tempdir().unwrap();
        let mut tracker = TempResourceTracker::create(root.path(), "mux").unwrap();
        let (video, audio) = inputs(&mut tracker);

        let err = mux(&tools, &video, &audio, 3.6, &mut tracker).await.unwrap_err();
        assert!(matches!(err, PipelineError::MuxFailed(ref m) if m.contains("Unknown encoder")));
    }

    #[tokio::test]
    async fn test_mux_timeout() {
        let runner = Arc::new(ScriptedRunner::new().timeout_when("libx264"));
        let tools = MediaTools::new(runner, &PipelineConfig::default());
        let root = tempfile::tempdir().unwrap();
        let mut tracker = TempResourceTracker::create(root.path(), "mux").unwrap();
        let (video, audio) = inputs(&mut tracker);

        let err = mux(&tools, &video, &audio, 3.6, &mut tracker).await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout { ref stage, seconds: 600 } if stage == "MUXING"));
    }
}
