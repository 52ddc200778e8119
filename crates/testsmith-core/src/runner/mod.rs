//! Child-process execution for test runners.
//!
//! Adapters describe a runner invocation as a [`CommandSpec`] and get back a
//! [`CommandOutput`]. Only a failure to start (or wait on) the process is an
//! error; a non-zero exit or a timeout is a normal result.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// One external command to run.
///
/// Use [`CommandSpec::new`] for the program, then chain the builder-style
/// setters.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Executable to run (resolved through `$PATH`).
    pub program: String,
    /// Arguments passed verbatim.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Wall-clock limit before the child is killed.
    pub timeout: Duration,
}

impl CommandSpec {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `program arg1 arg2 ...`, for logs and error messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// What a finished (or killed) command produced.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, or `None` if killed by a signal or by the timeout.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Whether the timeout fired.
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr, the way a terminal would interleave them
    /// when nothing is written concurrently.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Run `cmd` in `working_dir`, capturing stdout and stderr.
pub async fn run_command(cmd: &CommandSpec, working_dir: &Path) -> Result<CommandOutput> {
    let start = Instant::now();

    let mut child = Command::new(&cmd.program)
        .args(&cmd.args)
        .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(working_dir)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| {
            format!(
                "failed to start `{}` in {}",
                cmd.display(),
                working_dir.display()
            )
        })?;

    // Both pipes drain concurrently; whatever was read survives a timeout.
    let (stdout_buf, mut stdout_task) = drain(child.stdout.take());
    let (stderr_buf, mut stderr_task) = drain(child.stderr.take());

    let finished = tokio::time::timeout(cmd.timeout, async {
        let status = child.wait().await;
        let _ = (&mut stdout_task).await;
        let _ = (&mut stderr_task).await;
        status
    })
    .await;

    match finished {
        Ok(Ok(status)) => Ok(CommandOutput {
            exit_code: status.code(),
            stdout: take_lossy(&stdout_buf),
            stderr: take_lossy(&stderr_buf),
            duration_ms: elapsed_ms(start),
            timed_out: false,
        }),
        Ok(Err(e)) => Err(e).with_context(|| format!("failed to wait on `{}`", cmd.display())),
        Err(_) => {
            let _ = child.kill().await;
            tracing::warn!(
                command = %cmd.display(),
                timeout_secs = cmd.timeout.as_secs(),
                "command timed out, killed"
            );

            // Grandchildren may still hold the pipes open; keep what has
            // arrived and stop reading.
            let _ = tokio::time::timeout(DRAIN_GRACE, async {
                let _ = (&mut stdout_task).await;
                let _ = (&mut stderr_task).await;
            })
            .await;
            stdout_task.abort();
            stderr_task.abort();

            let mut stderr = take_lossy(&stderr_buf);
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!(
                "`{}` timed out after {}s",
                cmd.display(),
                cmd.timeout.as_secs()
            ));
            Ok(CommandOutput {
                exit_code: None,
                stdout: take_lossy(&stdout_buf),
                stderr,
                duration_ms: elapsed_ms(start),
                timed_out: true,
            })
        }
    }
}

/// How long to keep reading pipes after a timed-out child is killed.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

type SharedBuf = Arc<Mutex<Vec<u8>>>;

/// Copy `pipe` into a shared buffer chunk by chunk until EOF.
fn drain<R>(pipe: Option<R>) -> (SharedBuf, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = SharedBuf::default();
    let sink = Arc::clone(&buf);
    let task = tokio::spawn(async move {
        let Some(mut pipe) = pipe else { return };
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .extend_from_slice(&chunk[..n]),
            }
        }
    });
    (buf, task)
}

fn take_lossy(buf: &SharedBuf) -> String {
    let bytes = std::mem::take(&mut *buf.lock().unwrap_or_else(|e| e.into_inner()));
    String::from_utf8_lossy(&bytes).into_owned()
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn true_exits_zero() {
        let out = run_command(&CommandSpec::new("true"), Path::new("/tmp"))
            .await
            .expect("should run");
        assert!(out.success());
        assert!(!out.timed_out);
    }

    #[tokio::test]
    async fn false_is_not_an_error() {
        let out = run_command(&CommandSpec::new("false"), Path::new("/tmp"))
            .await
            .expect("process ran, just returned non-zero");
        assert_eq!(out.exit_code, Some(1));
        assert!(!out.success());
    }

    #[tokio::test]
    async fn captures_both_streams() {
        let cmd = CommandSpec::new("sh").args(["-c", "echo out_line; echo err_line >&2"]);
        let out = run_command(&cmd, Path::new("/tmp")).await.unwrap();
        assert!(out.stdout.contains("out_line"));
        assert!(out.stderr.contains("err_line"));
        let combined = out.combined();
        assert!(combined.contains("out_line") && combined.contains("err_line"));
    }

    #[tokio::test]
    async fn runs_in_working_dir_with_env() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cmd = CommandSpec::new("sh")
            .args(["-c", "pwd; echo $TESTSMITH_MARKER"])
            .env("TESTSMITH_MARKER", "marker-value");
        let out = run_command(&cmd, tmp.path()).await.unwrap();
        let canonical = tmp.path().canonicalize().unwrap();
        assert!(out.stdout.contains(canonical.to_str().unwrap()));
        assert!(out.stdout.contains("marker-value"));
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let cmd = CommandSpec::new("this_command_does_not_exist_testsmith");
        let result = run_command(&cmd, Path::new("/tmp")).await;
        assert!(result.is_err());
        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("failed to start"), "unexpected: {msg}");
    }

    #[tokio::test]
    async fn timeout_kills_child() {
        let cmd = CommandSpec::new("sleep")
            .args(["60"])
            .timeout(Duration::from_secs(1));
        let out = run_command(&cmd, Path::new("/tmp")).await.unwrap();
        assert!(out.timed_out);
        assert!(out.exit_code.is_none());
        assert!(out.stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn timeout_keeps_partial_output() {
        let cmd = CommandSpec::new("sh")
            .args([
                "-c",
                "echo summary; echo 'PASSED tests/test_main.py::test_a'; echo warn >&2; sleep 5",
            ])
            .timeout(Duration::from_secs(1));
        let out = run_command(&cmd, Path::new("/tmp")).await.unwrap();
        assert!(out.timed_out);
        assert!(out.stdout.contains("summary"));
        assert!(out.stdout.contains("PASSED tests/test_main.py::test_a"));
        assert!(out.stderr.starts_with("warn\n"));
        assert!(out.stderr.contains("timed out after 1s"));
        assert!(out.duration_ms < 4000);
    }

    #[test]
    fn display_joins_args() {
        let cmd = CommandSpec::new("dotnet").args(["test", "--no-restore"]);
        assert_eq!(cmd.display(), "dotnet test --no-restore");
        assert_eq!(CommandSpec::new("true").display(), "true");
    }
}
