//! FFmpeg and FFprobe helpers

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{PipelineConfig, StageTimeouts};
use crate::error::{PipelineError, Result};
use crate::progress::PipelineStage;
use crate::utils::process::{CommandRunner, ToolInvocation, ToolOutput};

/// Handle on the media tools used by every media stage
#[derive(Clone)]
pub struct MediaTools {
    runner: Arc<dyn CommandRunner>,
    ffmpeg: String,
    ffprobe: String,
    timeouts: StageTimeouts,
}

impl MediaTools {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &PipelineConfig) -> Self {
        Self {
            runner,
            ffmpeg: config.ffmpeg_bin.clone(),
            ffprobe: config.ffprobe_bin.clone(),
            timeouts: config.timeouts.clone(),
        }
    }

    /// Bound for an ffmpeg call made while in `stage`
    pub fn timeout(&self, stage: PipelineStage) -> Duration {
        self.timeouts.for_stage(stage)
    }

    /// `ffmpeg` invocation with overwrite enabled
    pub fn ffmpeg(&self) -> ToolInvocation {
        ToolInvocation::new(&self.ffmpeg).arg("-y")
    }

    /// Duration of a media file in fractional seconds
    pub async fn probe_duration(&self, path: &Path, stage: PipelineStage) -> Result<f64> {
        let invocation = ToolInvocation::new(&self.ffprobe)
            .args(["-v", "error", "-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path);

        let probe_failed = |message: String| PipelineError::ProbeFailed {
            path: path.to_path_buf(),
            message,
        };

        let output = self
            .runner
            .run(&invocation, self.timeouts.probe())
            .await
            .map_err(|e| e.into_stage_error(stage, probe_failed))?;

        if !output.success {
            return Err(probe_failed(output.diagnostic()));
        }
        parse_duration(&output.stdout).ok_or_else(|| {
            probe_failed(format!("unparseable duration: {:?}", output.stdout.trim()))
        })
    }

    /// Run an ffmpeg invocation under the stage's bound, mapping a non-zero
    /// exit through `on_failure`
    pub async fn run<F>(&self, invocation: ToolInvocation, stage: PipelineStage, on_failure: F) -> Result<ToolOutput>
    where
        F: Fn(String) -> PipelineError,
    {
        let output = self
            .runner
            .run(&invocation, self.timeout(stage))
            .await
            .map_err(|e| e.into_stage_error(stage, &on_failure))?;

        if !output.success {
            log::error!("ffmpeg failed: {}", output.diagnostic());
            return Err(on_failure(output.diagnostic()));
        }
        Ok(output)
    }
}

/// Fail through `on_failure` unless a tool left a non-empty file at `path`
pub fn require_output<F>(path: &Path, on_failure: F) -> Result<()>
where
    F: FnOnce(String) -> PipelineError,
{
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(on_failure(format!("{} is empty", path.display()))),
        Err(_) => Err(on_failure(format!("{} was not created", path.display()))),
    }
}

/// Parse ffprobe's duration output; rejects `N/A`, negatives and non-finite values
pub fn parse_duration(stdout: &str) -> Option<f64> {
    let value = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let secs = value.parse::<f64>().ok()?;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

/// Seconds formatted for `-t` / `-ss`
pub fn format_seconds(secs: f64) -> String {
    format!("{:.3}", secs)
}

/// Quote a path for an ffmpeg concat list entry
pub fn concat_entry(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\'', "'\\''");
    format!("file '{}'", escaped)
}

/// Write an ffmpeg concat demuxer list. Entries are made absolute, since the
/// demuxer resolves relative entries against the list's own directory.
pub fn write_concat_list(list_path: &Path, entries: &[&Path]) -> Result<()> {
    let mut file = std::fs::File::create(list_path)?;
    for entry in entries {
        let entry = std::path::absolute(entry)?;
        writeln!(file, "{}", concat_entry(&entry))?;
    }
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::process::testing::ScriptedRunner;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("3.000000\n"), Some(3.0));
        assert_eq!(parse_duration("\n 12.48 \n"), Some(12.48));
        assert_eq!(parse_duration("N/A"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("0"), None);
        assert_eq!(parse_duration("-1.5"), None);
    }

    #[test]
    fn test_concat_entry_escapes_quotes() {
        assert_eq!(concat_entry(Path::new("/a/clip_0.mp4")), "file '/a/clip_0.mp4'");
        assert_eq!(
            concat_entry(Path::new("/a/it's.mp4")),
            "file '/a/it'\\''s.mp4'"
        );
    }

    #[test]
    fn test_write_concat_list() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.txt");
        let a = Path::new("/clips/clip_0.mp4");
        let b = Path::new("/clips/clip_1.mp4");
        write_concat_list(&list, &[a, b, a]).unwrap();

        let content = std::fs::read_to_string(&list).unwrap();
        assert_eq!(
            content,
            "file '/clips/clip_0.mp4'\nfile '/clips/clip_1.mp4'\nfile '/clips/clip_0.mp4'\n"
        );
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(3.6), "3.600");
        assert_eq!(format_seconds(1.0 / 3.0), "0.333");
    }

    #[tokio::test]
    async fn test_probe_duration() {
        let runner = Arc::new(ScriptedRunner::new().with_duration("speech", 3.0));
        let tools = MediaTools::new(runner.clone(), &PipelineConfig::default());

        let secs = tools
            .probe_duration(Path::new("/tmp/speech.mp3"), PipelineStage::Reconciling)
            .await
            .unwrap();
        assert_eq!(secs, 3.0);

        let calls = runner.calls_to("ffprobe");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].value_of("-show_entries").unwrap(), "format=duration");
    }

    #[tokio::test]
    async fn test_probe_failure() {
        let runner = Arc::new(ScriptedRunner::new());
        let tools = MediaTools::new(runner, &PipelineConfig::default());

        let err = tools
            .probe_duration(Path::new("/tmp/missing.mp3"), PipelineStage::Reconciling)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ProbeFailed { .. }));
        assert!(err.to_string().contains("No such file"));
    }

    #[tokio::test]
    async fn test_probe_timeout() {
        let runner = Arc::new(ScriptedRunner::new().timeout_when("ffprobe"));
        let tools = MediaTools::new(runner, &PipelineConfig::default());

        let err = tools
            .probe_duration(Path::new("/tmp/speech.mp3"), PipelineStage::Reconciling)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout { ref stage, .. } if stage == "RECONCILING"));
    }
}
