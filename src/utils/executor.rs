//! Subprocess execution with bounded output capture and a wall-clock deadline.
//!
//! Standard output and standard error are drained by two reader tasks that
//! forward chunks over a bounded channel to a single accumulator, so the child
//! never stalls on a full pipe while we wait for it.

use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::ProcessError;

/// Default cap on buffered output per stream (20 MiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 20 * 1024 * 1024;

const READ_CHUNK_SIZE: usize = 8 * 1024;
const CHANNEL_CAPACITY: usize = 64;

/// A program and its argv, executed without a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Rendering used in logs instead of the real argv.
    redacted: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            redacted: None,
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

    /// Sets the form shown in logs when the argv carries secrets.
    pub fn with_redacted(mut self, shown: impl Into<String>) -> Self {
        self.redacted = Some(shown.into());
        self
    }

    /// The full command line, program followed by its arguments.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.redacted {
            Some(shown) => f.write_str(shown),
            None => f.write_str(&self.command_line()),
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
pub struct ExecOptions {
    pub max_output_bytes: usize,
    pub on_progress: Option<ProgressCallback>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            on_progress: None,
        }
    }
}

impl fmt::Debug for ExecOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecOptions")
            .field("max_output_bytes", &self.max_output_bytes)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Message for a nonzero exit: stderr, else stdout, else the exit code.
    fn failure_message(&self) -> String {
        let stderr = self.stderr_lossy();
        if !stderr.trim().is_empty() {
            return stderr.trim().to_string();
        }
        let stdout = self.stdout_lossy();
        if !stdout.trim().is_empty() {
            return stdout.trim().to_string();
        }
        match self.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Abstraction for command execution, enabling mocking in tests
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs `command` to completion or until `timeout` elapses.
    ///
    /// Resolves with the captured output on exit code 0.
    async fn execute(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        options: ExecOptions,
    ) -> Result<CommandOutput, ProcessError>;

    /// Whether `name` resolves to an executable. Lookup failures count as absent.
    async fn command_exists(&self, name: &str) -> bool {
        super::find_executable(name).is_ok()
    }
}

/// Default implementation using real subprocesses on the tokio runtime
#[derive(Debug, Clone, Default)]
pub struct TokioExecutor;

impl TokioExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for TokioExecutor {
    async fn execute(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        options: ExecOptions,
    ) -> Result<CommandOutput, ProcessError> {
        info!("Executing: {}", command);
        debug!("Timeout: {}ms", timeout.as_millis());

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!("Process error: {}", e);
                ProcessError::Spawn(e)
            })?;

        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_stream(stdout, StreamKind::Stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_stream(stderr, StreamKind::Stderr, tx.clone())));
        }
        drop(tx);

        let mut sink = OutputSink::new(&options);
        let outcome = tokio::time::timeout(timeout, async {
            while let Some(chunk) = rx.recv().await {
                sink.accept(chunk)?;
            }
            child.wait().await.map_err(ProcessError::Wait)
        })
        .await;

        let status = match outcome {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                terminate(&mut child, &readers).await;
                error!("Command aborted: {}", e);
                return Err(e);
            }
            Err(_) => {
                terminate(&mut child, &readers).await;
                error!("Command timed out after {}ms", timeout.as_millis());
                return Err(ProcessError::Timeout(timeout));
            }
        };

        let output = sink.finish(status.code());
        if status.success() {
            info!("Command completed successfully with exit code 0");
            Ok(output)
        } else {
            let message = output.failure_message();
            error!("Command failed with status {}: {}", status, message);
            Err(ProcessError::Failed {
                code: status.code(),
                message,
            })
        }
    }
}

async fn terminate(child: &mut Child, readers: &[JoinHandle<()>]) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill process: {}", e);
    }
    for reader in readers {
        reader.abort();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Stdout,
    Stderr,
}

#[derive(Debug)]
struct OutputChunk {
    stream: StreamKind,
    bytes: Vec<u8>,
}

async fn forward_stream<R>(mut reader: R, stream: StreamKind, tx: mpsc::Sender<OutputChunk>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = OutputChunk {
                    stream,
                    bytes: buf[..n].to_vec(),
                };
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Failed to read {:?}: {}", stream, e);
                break;
            }
        }
    }
}

/// Accumulates both streams and watches complete lines for progress output.
struct OutputSink {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    stdout_lines: LineBuffer,
    stderr_lines: LineBuffer,
    limit: usize,
    on_progress: Option<ProgressCallback>,
}

impl OutputSink {
    fn new(options: &ExecOptions) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            stdout_lines: LineBuffer::default(),
            stderr_lines: LineBuffer::default(),
            limit: options.max_output_bytes,
            on_progress: options.on_progress.clone(),
        }
    }

    fn accept(&mut self, chunk: OutputChunk) -> Result<(), ProcessError> {
        let (buffer, lines) = match chunk.stream {
            StreamKind::Stdout => (&mut self.stdout, &mut self.stdout_lines),
            StreamKind::Stderr => (&mut self.stderr, &mut self.stderr_lines),
        };
        if buffer.len() + chunk.bytes.len() > self.limit {
            return Err(ProcessError::OutputLimit { limit: self.limit });
        }
        buffer.extend_from_slice(&chunk.bytes);
        let complete = lines.push(&chunk.bytes);

        for line in complete {
            self.observe(chunk.stream, &line);
        }
        Ok(())
    }

    fn observe(&self, stream: StreamKind, line: &str) {
        if line.is_empty() {
            return;
        }
        if is_progress_line(line) {
            info!("Progress: {}", line);
            if let Some(callback) = &self.on_progress {
                callback(line);
            }
        } else if stream == StreamKind::Stderr {
            debug!("stderr: {}", line);
        }
    }

    fn finish(mut self, code: Option<i32>) -> CommandOutput {
        if let Some(line) = self.stdout_lines.finish() {
            self.observe(StreamKind::Stdout, &line);
        }
        if let Some(line) = self.stderr_lines.finish() {
            self.observe(StreamKind::Stderr, &line);
        }
        CommandOutput {
            code,
            stdout: self.stdout,
            stderr: self.stderr,
        }
    }
}

/// Splits a byte stream into lines across chunk boundaries.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n' || *b == b'\r') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&raw).trim().to_string());
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&raw).trim().to_string())
    }
}

fn progress_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b\d{1,3}(?:\.\d+)?%").expect("progress pattern is valid"))
}

/// Whether a line reports a percentage, e.g. `users  1024/2048  (50.0%)`.
pub fn is_progress_line(line: &str) -> bool {
    progress_pattern().is_match(line)
}
