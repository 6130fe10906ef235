//! External job launching.
//!
//! The [`JobLauncher`] trait is the only way the tuner touches a child
//! process. [`ProcessLauncher`] spawns real commands; [`ScriptedLauncher`]
//! replays canned results in-process for tests and rehearsals.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use et_types::LaunchError;

/// A fully specified command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Variables set on top of the inherited environment.
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// What a finished job left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    /// Standard output and standard error, interleaved by line.
    pub output: String,
    pub duration: Duration,
}

#[async_trait]
pub trait JobLauncher: Send + Sync {
    /// Run `invocation` to completion.
    async fn launch(&self, invocation: &Invocation) -> Result<LaunchOutput, LaunchError>;
}

/// Spawns real child processes with tokio.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobLauncher for ProcessLauncher {
    async fn launch(&self, invocation: &Invocation) -> Result<LaunchOutput, LaunchError> {
        if invocation.program.is_empty() {
            return Err(LaunchError::EmptyInvocation);
        }
        let program = invocation.program.clone();
        let capture_error = |e: std::io::Error| LaunchError::Capture {
            program: program.clone(),
            message: e.to_string(),
        };

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir);
        }
        for (key, value) in &invocation.env {
            command.env(key, value);
        }

        let start = Instant::now();
        let mut child = command.spawn().map_err(|e| LaunchError::Spawn {
            program: program.clone(),
            message: e.to_string(),
        })?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                return Err(LaunchError::Capture {
                    program: program.clone(),
                    message: "child output was not piped".to_string(),
                })
            }
        };
        let mut stdout = BufReader::new(stdout);
        let mut stderr = BufReader::new(stderr);
        let (mut stdout_buf, mut stderr_buf) = (Vec::new(), Vec::new());
        let mut captured = String::new();
        let (mut stdout_open, mut stderr_open) = (true, true);

        // Raw bytes: job output is not guaranteed to be valid UTF-8.
        while stdout_open || stderr_open {
            let line = tokio::select! {
                read = stdout.read_until(b'\n', &mut stdout_buf), if stdout_open => {
                    stdout_open = read.map_err(&capture_error)? > 0;
                    take_line(&mut stdout_buf)
                }
                read = stderr.read_until(b'\n', &mut stderr_buf), if stderr_open => {
                    stderr_open = read.map_err(&capture_error)? > 0;
                    take_line(&mut stderr_buf)
                }
            };
            if let Some(line) = line {
                debug!(target: "evetune::job", "{line}");
                captured.push_str(&line);
                captured.push('\n');
            }
        }

        let status = child.wait().await.map_err(&capture_error)?;
        Ok(LaunchOutput {
            exit_code: status.code(),
            success: status.success(),
            output: captured,
            duration: start.elapsed(),
        })
    }
}

/// Drain one buffered line, lossily decoded, without its terminator.
fn take_line(buf: &mut Vec<u8>) -> Option<String> {
    if buf.is_empty() {
        return None;
    }
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(|c| c == '\n' || c == '\r')
        .to_string();
    buf.clear();
    Some(line)
}

/// A canned launcher result.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedRun {
    Exit { code: i32, output: String },
    SpawnError { message: String },
}

/// In-process launcher that replays scripted results in order.
///
/// Once the queue is exhausted the fallback (if any) is returned for every
/// further call. Every invocation received is recorded.
#[derive(Debug, Default)]
pub struct ScriptedLauncher {
    queue: Mutex<VecDeque<ScriptedRun>>,
    fallback: Option<ScriptedRun>,
    duration: Duration,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launcher that answers every call the same way.
    pub fn always(code: i32, output: impl Into<String>) -> Self {
        Self {
            fallback: Some(ScriptedRun::Exit {
                code,
                output: output.into(),
            }),
            ..Self::default()
        }
    }

    pub fn then_exit(self, code: i32, output: impl Into<String>) -> Self {
        self.queue.lock().push_back(ScriptedRun::Exit {
            code,
            output: output.into(),
        });
        self
    }

    pub fn then_spawn_error(self, message: impl Into<String>) -> Self {
        self.queue.lock().push_back(ScriptedRun::SpawnError {
            message: message.into(),
        });
        self
    }

    /// Reported wall-clock duration of every scripted run.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl JobLauncher for ScriptedLauncher {
    async fn launch(&self, invocation: &Invocation) -> Result<LaunchOutput, LaunchError> {
        self.calls.lock().push(invocation.clone());
        let next = self.queue.lock().pop_front().or_else(|| self.fallback.clone());
        match next {
            Some(ScriptedRun::Exit { code, output }) => Ok(LaunchOutput {
                exit_code: Some(code),
                success: code == 0,
                output,
                duration: self.duration,
            }),
            Some(ScriptedRun::SpawnError { message }) => Err(LaunchError::Spawn {
                program: invocation.program.clone(),
                message,
            }),
            None => Err(LaunchError::Spawn {
                program: invocation.program.clone(),
                message: "no scripted result left".to_string(),
            }),
        }
    }
}
