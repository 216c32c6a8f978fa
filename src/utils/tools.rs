//! External tool discovery
//!
//! Locates ffmpeg/ffprobe on the PATH (or at a configured absolute path) and
//! reads the ffmpeg version before any task is accepted.

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::utils::process::{CommandRunner, ToolInvocation};

static FFMPEG_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:ffmpeg|ffprobe) version n?(\d+)\.(\d+)(?:\.(\d+))?").unwrap());

/// Lowest ffmpeg release with the concat demuxer and atempo behaviour we rely on
pub const MIN_FFMPEG_VERSION: Version = Version::new(4, 0, 0);

/// A located external tool
#[derive(Debug, Clone, Serialize)]
pub struct ExternalTool {
    pub name: String,
    pub path: PathBuf,
    #[serde(serialize_with = "serialize_version")]
    pub version: Option<Version>,
    #[serde(serialize_with = "serialize_min_version")]
    pub min_version: Version,
}

impl ExternalTool {
    pub fn is_outdated(&self) -> bool {
        matches!(&self.version, Some(v) if *v < self.min_version)
    }
}

fn serialize_version<S: serde::Serializer>(v: &Option<Version>, s: S) -> std::result::Result<S::Ok, S::Error> {
    match v {
        Some(v) => s.serialize_some(&v.to_string()),
        None => s.serialize_none(),
    }
}

fn serialize_min_version<S: serde::Serializer>(v: &Version, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&v.to_string())
}

/// Resolve a command name or path to an executable
pub fn locate(command: &str) -> Result<PathBuf> {
    which::which(command).map_err(|e| PipelineError::EngineUnavailable {
        engine: command.to_string(),
        message: format!("not found in PATH: {}", e),
    })
}

/// Extract the version from `ffmpeg -version` output.
///
/// Git builds (`ffmpeg version N-112345-g...`) carry no release number and yield `None`.
pub fn parse_ffmpeg_version(output: &str) -> Option<Version> {
    let caps = FFMPEG_VERSION_RE.captures(output)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    let patch = caps
        .get(3)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

/// Run `<path> -version` and parse the result
pub async fn check_ffmpeg_version(runner: &dyn CommandRunner, path: &Path, config: &PipelineConfig) -> Result<Option<Version>> {
    let invocation = ToolInvocation::new(path.to_string_lossy()).arg("-version");
    let output = runner
        .run(&invocation, config.timeouts.probe())
        .await
        .map_err(|e| PipelineError::EngineUnavailable {
            engine: "ffmpeg".to_string(),
            message: e.to_string(),
        })?;

    if !output.success {
        return Err(PipelineError::EngineUnavailable {
            engine: "ffmpeg".to_string(),
            message: output.diagnostic(),
        });
    }

    let version = parse_ffmpeg_version(&output.stdout);
    if version.is_none() {
        log::debug!("Could not parse ffmpeg version from: {}", output.stdout.lines().next().unwrap_or_default());
    }
    Ok(version)
}

/// Locate ffmpeg and ffprobe and read the ffmpeg version
pub async fn check_media_tools(runner: &dyn CommandRunner, config: &PipelineConfig) -> Result<Vec<ExternalTool>> {
    log::info!("Checking external media tools...");

    let ffmpeg_path = locate(&config.ffmpeg_bin)?;
    log::info!("Found ffmpeg at {}", ffmpeg_path.display());
    let ffmpeg_version = check_ffmpeg_version(runner, &ffmpeg_path, config).await?;
    let ffmpeg = ExternalTool {
        name: "ffmpeg".to_string(),
        path: ffmpeg_path,
        version: ffmpeg_version,
        min_version: MIN_FFMPEG_VERSION,
    };
    match &ffmpeg.version {
        Some(v) if ffmpeg.is_outdated() => {
            log::warn!("ffmpeg {} is older than {}", v, MIN_FFMPEG_VERSION)
        }
        Some(v) => log::info!("FFmpeg version: {}", v),
        None => log::info!("FFmpeg version unknown (development build?)"),
    }

    let ffprobe_path = locate(&config.ffprobe_bin)?;
    log::info!("Found ffprobe at {}", ffprobe_path.display());
    let ffprobe = ExternalTool {
        name: "ffprobe".to_string(),
        path: ffprobe_path,
        version: None,
        min_version: MIN_FFMPEG_VERSION,
    };

    Ok(vec![ffmpeg, ffprobe])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::process::testing::ScriptedRunner;

    #[test]
    fn test_parse_release_versions() {
        let out = "ffmpeg version 6.1.1 Copyright (c) 2000-2023 the FFmpeg developers";
        assert_eq!(parse_ffmpeg_version(out), Some(Version::new(6, 1, 1)));

        let out = "ffmpeg version 4.4 Copyright (c) 2000-2021";
        assert_eq!(parse_ffmpeg_version(out), Some(Version::new(4, 4, 0)));

        let out = "ffmpeg version n7.0.2-static https://johnvansickle.com/ffmpeg/";
        assert_eq!(parse_ffmpeg_version(out), Some(Version::new(7, 0, 2)));
    }

    #[test]
    fn test_parse_git_build_has_no_version() {
        let out = "ffmpeg version N-112345-gabcdef Copyright (c) 2000-2024";
        assert_eq!(parse_ffmpeg_version(out), None);
        assert_eq!(parse_ffmpeg_version(""), None);
    }

    #[test]
    fn test_outdated_check() {
        let tool = ExternalTool {
            name: "ffmpeg".into(),
            path: PathBuf::from("/usr/bin/ffmpeg"),
            version: Some(Version::new(3, 4, 0)),
            min_version: MIN_FFMPEG_VERSION,
        };
        assert!(tool.is_outdated());

        let tool = ExternalTool { version: None, ..tool };
        assert!(!tool.is_outdated());
    }

    #[test]
    fn test_locate_missing_tool() {
        let err = locate("lipsync-no-such-tool-xyz").unwrap_err();
        assert!(matches!(err, PipelineError::EngineUnavailable { ref engine, .. } if engine == "lipsync-no-such-tool-xyz"));
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_existing_tool() {
        assert!(locate("sh").unwrap().is_absolute());
    }

    #[tokio::test]
    async fn test_version_check_failure_is_engine_unavailable() {
        let runner = ScriptedRunner::new().fail_when("-version", 1, "broken install");
        let err = check_ffmpeg_version(&runner, Path::new("/usr/bin/ffmpeg"), &PipelineConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("broken install"));
    }
}
