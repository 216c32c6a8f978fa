//! External process invocation
//!
//! All external tools run through [`CommandRunner`] with an argument vector
//! (never a shell string), a wall-clock bound and captured stdout/stderr.

use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::error::PipelineError;
use crate::progress::PipelineStage;

/// Diagnostics longer than this keep only their tail
const MAX_DIAGNOSTIC_BYTES: usize = 4096;

/// One external command: program, argument vector and working directory
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Value following `flag` in the argument vector
    pub fn value_of(&self, flag: &str) -> Option<&OsStr> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|a| a.as_os_str())
    }

    /// Human-readable command line, for logs only
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Tool's own explanation of a failure: stderr, or stdout if stderr is empty
    pub fn diagnostic(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        let text = tail(text, MAX_DIAGNOSTIC_BYTES);
        match self.code {
            Some(code) if text.is_empty() => format!("exit code {}", code),
            Some(code) => format!("exit code {}: {}", code, text),
            None if text.is_empty() => "terminated by signal".to_string(),
            None => format!("terminated by signal: {}", text),
        }
    }
}

fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Failure to obtain any output from a process
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {}s", after.as_secs())]
    TimedOut { program: String, after: Duration },
}

impl ToolError {
    /// Map onto the taxonomy of the stage that made the call
    pub fn into_stage_error<F>(self, stage: PipelineStage, on_launch: F) -> PipelineError
    where
        F: FnOnce(String) -> PipelineError,
    {
        match self {
            ToolError::TimedOut { after, .. } => PipelineError::Timeout {
                stage: stage.as_str().to_string(),
                seconds: after.as_secs(),
            },
            launch @ ToolError::Launch { .. } => on_launch(launch.to_string()),
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &ToolInvocation,
        timeout: Duration,
    ) -> std::result::Result<ToolOutput, ToolError>;
}

/// Runs commands as real child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        invocation: &ToolInvocation,
        timeout: Duration,
    ) -> std::result::Result<ToolOutput, ToolError> {
        log::debug!("Executing: {}", invocation.display());

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| ToolError::Launch {
            program: invocation.program.clone(),
            source,
        })?;

        // Dropping the future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ToolError::Launch {
                program: invocation.program.clone(),
                source,
            })?,
            Err(_) => {
                log::error!(
                    "{} timed out after {}s, killed",
                    invocation.program,
                    timeout.as_secs()
                );
                return Err(ToolError::TimedOut {
                    program: invocation.program.clone(),
                    after: timeout,
                });
            }
        };

        let result = ToolOutput {
            code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        log::debug!("{} stdout: {}", invocation.program, result.stdout.trim());
        log::debug!("{} stderr: {}", invocation.program, result.stderr.trim());
        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner standing in for ffmpeg, ffprobe, the TTS tools and the
    //! inference script.

    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::sync::Notify;

    enum Rule {
        Duration(String, f64),
        Fail(String, i32, String),
        FailAfterWriting(String, i32, String),
        Gate(String, Arc<Notify>),
        Timeout(String),
        NoOutput(String),
        Unlaunchable(String),
    }

    #[derive(Default)]
    pub struct ScriptedRunner {
        rules: Mutex<Vec<Rule>>,
        calls: Mutex<Vec<ToolInvocation>>,
        concat_lists: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// ffprobe reports `secs` for paths containing `pattern`
        pub fn with_duration(self, pattern: &str, secs: f64) -> Self {
            self.rules.lock().push(Rule::Duration(pattern.to_string(), secs));
            self
        }

        /// Commands whose line contains `pattern` exit non-zero
        pub fn fail_when(self, pattern: &str, code: i32, stderr: &str) -> Self {
            self.rules
                .lock()
                .push(Rule::Fail(pattern.to_string(), code, stderr.to_string()));
            self
        }

        /// Write the output file, then exit non-zero
        pub fn fail_after_writing(self, pattern: &str, code: i32, stderr: &str) -> Self {
            self.rules
                .lock()
                .push(Rule::FailAfterWriting(pattern.to_string(), code, stderr.to_string()));
            self
        }

        /// Commands whose line contains `pattern` block until `gate` is notified
        pub fn gate_when(self, pattern: &str, gate: Arc<Notify>) -> Self {
            self.rules.lock().push(Rule::Gate(pattern.to_string(), gate));
            self
        }

        pub fn timeout_when(self, pattern: &str) -> Self {
            self.rules.lock().push(Rule::Timeout(pattern.to_string()));
            self
        }

        /// Succeed but leave the output file unwritten
        pub fn no_output_when(self, pattern: &str) -> Self {
            self.rules.lock().push(Rule::NoOutput(pattern.to_string()));
            self
        }

        pub fn unlaunchable(self, program: &str) -> Self {
            self.rules.lock().push(Rule::Unlaunchable(program.to_string()));
            self
        }

        pub fn calls(&self) -> Vec<ToolInvocation> {
            self.calls.lock().clone()
        }

        pub fn calls_to(&self, program: &str) -> Vec<ToolInvocation> {
            self.calls()
                .into_iter()
                .filter(|c| c.program == program)
                .collect()
        }

        /// Contents of every concat list handed to ffmpeg, read at call time
        pub fn concat_lists(&self) -> Vec<String> {
            self.concat_lists.lock().clone()
        }

        fn output_path(invocation: &ToolInvocation) -> Option<PathBuf> {
            for flag in ["--out_path", "--output", "--outfile"] {
                if let Some(value) = invocation.value_of(flag) {
                    return Some(PathBuf::from(value));
                }
            }
            if invocation.program.contains("ffmpeg") {
                return invocation.args.last().map(PathBuf::from);
            }
            None
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            invocation: &ToolInvocation,
            timeout: Duration,
        ) -> std::result::Result<ToolOutput, ToolError> {
            self.calls.lock().push(invocation.clone());
            if invocation.value_of("-f").is_some_and(|f| f == "concat") {
                if let Some(list) = invocation.value_of("-i") {
                    let content = std::fs::read_to_string(list).unwrap_or_default();
                    self.concat_lists.lock().push(content);
                }
            }
            let line = invocation.display();
            let gate = self.rules.lock().iter().find_map(|rule| match rule {
                Rule::Gate(pattern, gate) if line.contains(pattern.as_str()) => Some(gate.clone()),
                _ => None,
            });
            if let Some(gate) = gate {
                gate.notified().await;
            }
            let rules = self.rules.lock();

            let mut write_output = true;
            let mut late_failure = None;
            for rule in rules.iter() {
                match rule {
                    Rule::Unlaunchable(program) if invocation.program == *program => {
                        return Err(ToolError::Launch {
                            program: program.clone(),
                            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                        });
                    }
                    Rule::Timeout(pattern) if line.contains(pattern.as_str()) => {
                        return Err(ToolError::TimedOut {
                            program: invocation.program.clone(),
                            after: timeout,
                        });
                    }
                    Rule::Fail(pattern, code, stderr) if line.contains(pattern.as_str()) => {
                        return Ok(ToolOutput {
                            code: Some(*code),
                            success: false,
                            stdout: String::new(),
                            stderr: stderr.clone(),
                        });
                    }
                    Rule::FailAfterWriting(pattern, code, stderr) if line.contains(pattern.as_str()) => {
                        late_failure = Some((*code, stderr.clone()));
                    }
                    Rule::NoOutput(pattern) if line.contains(pattern.as_str()) => {
                        write_output = false;
                    }
                    _ => {}
                }
            }

            if invocation.program.contains("ffprobe") {
                let target = invocation
                    .args
                    .last()
                    .map(|a| a.to_string_lossy().to_string())
                    .unwrap_or_default();
                let secs = rules.iter().find_map(|rule| match rule {
                    Rule::Duration(pattern, secs) if target.contains(pattern.as_str()) => Some(*secs),
                    _ => None,
                });
                return Ok(match secs {
                    Some(secs) => ToolOutput {
                        code: Some(0),
                        success: true,
                        stdout: format!("{}\n", secs),
                        stderr: String::new(),
                    },
                    None => ToolOutput {
                        code: Some(1),
                        success: false,
                        stdout: String::new(),
                        stderr: format!("{}: No such file or directory", target),
                    },
                });
            }

            if write_output {
                if let Some(path) = Self::output_path(invocation) {
                    let path = match &invocation.cwd {
                        Some(cwd) if path.is_relative() => cwd.join(path),
                        _ => path,
                    };
                    std::fs::write(&path, b"scripted media").map_err(|source| ToolError::Launch {
                        program: invocation.program.clone(),
                        source,
                    })?;
                }
            }

            if let Some((code, stderr)) = late_failure {
                return Ok(ToolOutput {
                    code: Some(code),
                    success: false,
                    stdout: String::new(),
                    stderr,
                });
            }
            Ok(ToolOutput {
                code: Some(0),
                success: true,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }
}
