//! External process execution with a hard deadline.
//!
//! Both external tools go through [`ProcessRunner`]. Production code uses
//! [`TokioProcessRunner`]; tests substitute [`ScriptedRunner`], which
//! returns canned outcomes so the OCR logic can be exercised without
//! Ghostscript or Tesseract installed.
//!
//! ## Deadline handling
//!
//! stdout and stderr are drained on their own tasks while the child runs;
//! a tool that fills a pipe buffer would otherwise block forever and turn
//! every run into a timeout. When the deadline passes, the whole process
//! tree is killed (unix: the child leads its own process group, which
//! receives `SIGKILL`; windows: `taskkill /T /F`) and the child is reaped
//! before `run` returns, so no process outlives its job.

use async_trait::async_trait;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long to wait for the output pipes to close once the child has exited.
const PIPE_GRACE: Duration = Duration::from_secs(5);

/// Argument prefixes whose value must never reach a log line.
const SECRET_ARG_PREFIXES: [&str; 1] = ["-sPDFPassword="];

/// One external-process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The arguments as lossy strings.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Program and arguments for logging, with secret values masked.
    pub fn redacted(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in self.args_lossy() {
            line.push(' ');
            match SECRET_ARG_PREFIXES.iter().find(|p| arg.starts_with(*p)) {
                Some(prefix) => {
                    line.push_str(prefix);
                    line.push_str("***");
                }
                None => line.push_str(&arg),
            }
        }
        line
    }
}

/// What one external-process run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubprocessOutcome {
    /// `None` when the process was killed (deadline or signal).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl SubprocessOutcome {
    /// A clean exit with the given code and no output.
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Default::default()
        }
    }

    /// A run that hit its deadline and was killed.
    pub fn timeout() -> Self {
        Self {
            timed_out: true,
            ..Default::default()
        }
    }

    pub fn with_stdout(mut self, s: impl Into<String>) -> Self {
        self.stdout = s.into();
        self
    }

    pub fn with_stderr(mut self, s: impl Into<String>) -> Self {
        self.stderr = s.into();
        self
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs one external process to completion or deadline.
///
/// `Err` is reserved for failing to start the process at all; everything
/// that happens after a successful spawn is described by the outcome.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> io::Result<SubprocessOutcome>;
}

// ── Production runner ────────────────────────────────────────────────────

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<SubprocessOutcome> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = cmd.spawn()?;
        debug!("Spawned pid {:?}: {}", child.id(), invocation.redacted());

        let stdout_task = tokio::spawn(drain(child.stdout.take()));
        let stderr_task = tokio::spawn(drain(child.stderr.take()));

        let (exit_code, timed_out) =
            match tokio::time::timeout(invocation.timeout, child.wait()).await {
                Ok(status) => (status?.code(), false),
                Err(_) => {
                    warn!(
                        "{} did not exit within {}s, killing it",
                        invocation.program.display(),
                        invocation.timeout.as_secs()
                    );
                    kill_tree(&mut child).await;
                    (None, true)
                }
            };

        Ok(SubprocessOutcome {
            exit_code,
            stdout: collect(stdout_task).await,
            stderr: collect(stderr_task).await,
            timed_out,
        })
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("Error reading child pipe: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn collect(mut task: JoinHandle<String>) -> String {
    match tokio::time::timeout(PIPE_GRACE, &mut task).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            debug!("Pipe reader task failed: {}", e);
            String::new()
        }
        Err(_) => {
            // A surviving descendant still holds the pipe open.
            debug!("Child pipe still open after {:?}; dropping output", PIPE_GRACE);
            task.abort();
            String::new()
        }
    }
}

/// Kill the child and its descendants, then reap it. Failures are logged only.
async fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: plain syscall on a process group id we created; no memory is shared.
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            warn!(
                "Failed to kill process group {}: {}",
                pid,
                io::Error::last_os_error()
            );
        }
    }

    #[cfg(windows)]
    if let Some(pid) = child.id() {
        match Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .output()
            .await
        {
            Ok(out) if out.status.success() => {}
            Ok(out) => warn!(
                "taskkill for pid {} failed: {}",
                pid,
                String::from_utf8_lossy(&out.stderr).trim()
            ),
            Err(e) => warn!("Failed to run taskkill for pid {}: {}", pid, e),
        }
    }

    if let Err(e) = child.kill().await {
        warn!("Failed to kill process {:?}: {}", child.id(), e);
    }
}

// ── Test double ──────────────────────────────────────────────────────────

type Script = dyn Fn(&Invocation) -> io::Result<SubprocessOutcome> + Send + Sync;

/// A [`ProcessRunner`] that answers from a closure and records every call.
///
/// The closure sees the full invocation, so it can play the tool's part:
/// write the `.txt` a real OCR engine would produce, or return a canned
/// stderr to exercise classification.
///
/// ```rust
/// use docmgr_ocr::pipeline::process::{Invocation, ProcessRunner, ScriptedRunner, SubprocessOutcome};
/// use std::time::Duration;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let runner = ScriptedRunner::with_outcome(SubprocessOutcome::exited(0).with_stdout("ok"));
/// let out = runner.run(&Invocation::new("gs", Duration::from_secs(1))).await.unwrap();
/// assert_eq!(out.stdout, "ok");
/// assert_eq!(runner.call_count(), 1);
/// # });
/// ```
pub struct ScriptedRunner {
    script: Box<Script>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&Invocation) -> io::Result<SubprocessOutcome> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with a clone of `outcome`.
    pub fn with_outcome(outcome: SubprocessOutcome) -> Self {
        Self::new(move |_| Ok(outcome.clone()))
    }

    /// Every invocation seen so far, in call order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("calls", &self.call_count())
            .finish()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<SubprocessOutcome> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }
        (self.script)(invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacted_masks_password() {
        let inv = Invocation::new("/usr/bin/gs", Duration::from_secs(1))
            .arg("-dNOPAUSE")
            .arg("-sPDFPassword=s3cret")
            .arg("in.pdf");
        let line = inv.redacted();
        assert!(!line.contains("s3cret"), "got: {line}");
        assert!(line.contains("-sPDFPassword=***"));
        assert!(line.ends_with("in.pdf"));
    }

    #[test]
    fn outcome_success_requires_zero_exit_and_no_timeout() {
        assert!(SubprocessOutcome::exited(0).success());
        assert!(!SubprocessOutcome::exited(1).success());
        assert!(!SubprocessOutcome::timeout().success());
    }

    #[tokio::test]
    async fn scripted_runner_records_calls() {
        let runner = ScriptedRunner::new(|inv| {
            Ok(SubprocessOutcome::exited(0).with_stdout(inv.args_lossy().join(",")))
        });
        let inv = Invocation::new("tool", Duration::from_secs(1)).arg("a").arg("b");
        let out = runner.run(&inv).await.unwrap();
        assert_eq!(out.stdout, "a,b");
        assert_eq!(runner.invocations(), vec![inv]);
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let inv = Invocation::new("/nonexistent/docmgr-ocr-tool", Duration::from_secs(1));
        let err = TokioProcessRunner.run(&inv).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let inv = Invocation::new("/bin/sh", Duration::from_secs(10))
            .arg("-c")
            .arg("echo out; echo err >&2; exit 3");
        let out = TokioProcessRunner.run(&inv).await.unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert!(!out.timed_out);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn large_output_does_not_deadlock() {
        // Far more than a pipe buffer on both streams.
        let inv = Invocation::new("/bin/sh", Duration::from_secs(20))
            .arg("-c")
            .arg("i=0; while [ $i -lt 20000 ]; do echo line-$i; echo warn-$i >&2; i=$((i+1)); done");
        let out = TokioProcessRunner.run(&inv).await.unwrap();
        assert!(!out.timed_out);
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout.lines().count(), 20000);
        assert_eq!(out.stderr.lines().count(), 20000);
    }

    /// Zombies count as dead: an orphan may wait a while for its reaper.
    #[cfg(unix)]
    fn process_alive(pid: i32) -> bool {
        if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            let state = stat.rsplit(')').next().and_then(|rest| rest.trim().chars().next());
            return !matches!(state, Some('Z') | Some('X'));
        }
        unsafe { libc::kill(pid, 0) == 0 }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn deadline_kills_process_tree() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        // The shell starts a background sleeper (a descendant) then blocks itself.
        let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());
        let inv = Invocation::new("/bin/sh", Duration::from_millis(500))
            .arg("-c")
            .arg(script);

        let start = std::time::Instant::now();
        let out = TokioProcessRunner.run(&inv).await.unwrap();
        assert!(out.timed_out);
        assert_eq!(out.exit_code, None);
        assert!(start.elapsed() < Duration::from_secs(10));

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let mut alive = true;
        for _ in 0..50 {
            alive = process_alive(pid);
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(!alive, "descendant {pid} survived the deadline");
    }
}
