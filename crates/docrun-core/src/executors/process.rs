// src/executors/process.rs
//
// Shared spawn/wait/kill logic for the local runner and environment.

use chrono::{DateTime, Utc};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{elapsed_since, Termination, TERMINATED_EXIT_CODE};
use crate::config::ResourceLimits;
use crate::errors::ExecutorError;

/// How long to keep reading pipes after the process is gone. A grandchild
/// that left the process group can hold them open indefinitely.
pub(crate) const DRAIN_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8 * 1024;

pub(crate) struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub termination: Termination,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited && self.exit_code == 0
    }

    /// Error describing a non-successful outcome, if any.
    pub fn error(&self, timeout: Duration) -> Option<ExecutorError> {
        match self.termination {
            Termination::TimedOut => Some(ExecutorError::Timeout(timeout)),
            Termination::Canceled => Some(ExecutorError::Canceled),
            Termination::Exited if self.exit_code != 0 => Some(ExecutorError::Execution {
                exit_code: self.exit_code,
            }),
            Termination::Exited => None,
        }
    }
}

/// Spawn `cmd` in its own process group and wait for exit, timeout, or
/// cancellation. Whatever is left of the group afterwards is killed, so
/// background jobs never outlive the call.
pub(crate) async fn run(
    mut cmd: Command,
    display: &str,
    timeout: Duration,
    limits: &ResourceLimits,
    cancel: &CancellationToken,
) -> Result<ProcessOutput, ExecutorError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    {
        cmd.process_group(0);
        apply_limits(&mut cmd, limits);
    }

    let start_time = Utc::now();
    let mut child = cmd.spawn().map_err(|e| ExecutorError::Launch {
        command: display.to_string(),
        message: e.to_string(),
    })?;
    let pid = child.id();
    log::debug!("Spawned '{}' (pid {:?}, timeout {:?})", display, pid, timeout);

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let waited = tokio::select! {
        status = child.wait() => Some(status),
        _ = tokio::time::sleep(timeout) => None,
        _ = cancel.cancelled() => None,
    };

    let (exit_code, termination) = match waited {
        Some(Ok(status)) => {
            kill_group(pid, display);
            (exit_code_of(status), Termination::Exited)
        }
        Some(Err(e)) => {
            terminate(pid, display, &mut child).await;
            return Err(ExecutorError::Io(format!("Failed waiting for '{}': {}", display, e)));
        }
        None => {
            let termination = if cancel.is_cancelled() {
                log::warn!("Canceled '{}' (pid {:?})", display, pid);
                Termination::Canceled
            } else {
                log::warn!("'{}' exceeded its {:?} deadline (pid {:?})", display, timeout, pid);
                Termination::TimedOut
            };
            terminate(pid, display, &mut child).await;
            (TERMINATED_EXIT_CODE, termination)
        }
    };

    let (stdout, stderr) = tokio::join!(collect(stdout), collect(stderr));
    let (end_time, duration) = elapsed_since(start_time);

    Ok(ProcessOutput {
        exit_code,
        stdout,
        stderr,
        termination,
        start_time,
        end_time,
        duration,
    })
}

/// Output read so far, shared with the reader task so a bounded drain keeps
/// everything that arrived before the deadline.
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

fn drain<R>(mut pipe: R) -> Drain
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buf);
    let task = tokio::spawn(async move {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    log::debug!("Pipe read ended with error: {}", e);
                    break;
                }
            }
        }
    });
    Drain { buf, task }
}

async fn collect(drain: Option<Drain>) -> String {
    let Some(Drain { buf, mut task }) = drain else {
        return String::new();
    };
    match tokio::time::timeout(DRAIN_GRACE, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("Output reader task failed: {}", e),
        Err(_) => {
            log::warn!(
                "Output pipe still open {:?} after exit; keeping what was read",
                DRAIN_GRACE
            );
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    log::warn!("Output reader task failed: {}", e);
                }
            }
        }
    }
    let bytes = buf.lock().await;
    String::from_utf8_lossy(&bytes).into_owned()
}

async fn terminate(pid: Option<u32>, display: &str, child: &mut Child) {
    kill_group(pid, display);
    if let Err(e) = child.kill().await {
        log::debug!("Kill of pid {:?} failed: {}", pid, e);
    }
}

/// SIGKILL every process still in the group led by `pid`. A group that is
/// already empty is not an error.
fn kill_group(pid: Option<u32>, display: &str) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => log::debug!("Killed leftover processes of '{}' (group {})", display, pid),
            Err(Errno::ESRCH) => {}
            Err(e) => log::debug!("killpg({}) failed: {}", pid, e),
        }
    }
    #[cfg(not(unix))]
    let _ = (pid, display);
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    TERMINATED_EXIT_CODE
}

/// Apply rlimits in the child between fork and exec. Requests above the
/// inherited hard limit are clamped to it.
#[cfg(unix)]
fn apply_limits(cmd: &mut Command, limits: &ResourceLimits) {
    if limits.is_unlimited() {
        return;
    }

    const MB: u64 = 1024 * 1024;
    let mut requested: Vec<(nix::sys::resource::Resource, u64)> = Vec::new();
    {
        use nix::sys::resource::Resource;
        if let Some(mb) = limits.max_memory_mb {
            requested.push((Resource::RLIMIT_AS, mb.saturating_mul(MB)));
        }
        if let Some(mb) = limits.max_disk_mb {
            requested.push((Resource::RLIMIT_FSIZE, mb.saturating_mul(MB)));
        }
        if let Some(n) = limits.max_processes {
            requested.push((Resource::RLIMIT_NPROC, n));
        }
        if let Some(n) = limits.max_file_handles {
            requested.push((Resource::RLIMIT_NOFILE, n));
        }
    }

    // SAFETY: the closure only calls getrlimit/setrlimit, which are
    // async-signal-safe, and allocates nothing.
    unsafe {
        cmd.pre_exec(move || {
            use nix::sys::resource::{getrlimit, setrlimit};
            for (resource, value) in &requested {
                let (_, hard) = getrlimit(*resource)?;
                let value = (*value as nix::libc::rlim_t).min(hard);
                setrlimit(*resource, value, value)?;
            }
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn test_captures_both_streams() {
        let cancel = CancellationToken::new();
        let out = run(
            sh("echo out; echo err >&2; exit 3"),
            "test",
            Duration::from_secs(5),
            &ResourceLimits::default(),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(out.exit_code, 3);
        assert_eq!(out.termination, Termination::Exited);
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert!(!out.success());
        assert!(matches!(out.error(Duration::from_secs(5)), Some(ExecutorError::Execution { exit_code: 3 })));
    }

    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        let cancel = CancellationToken::new();
        let started = std::time::Instant::now();
        let out = run(
            sh("sleep 30 & sleep 30; wait"),
            "test",
            Duration::from_millis(300),
            &ResourceLimits::default(),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(out.termination, Termination::TimedOut);
        assert_eq!(out.exit_code, TERMINATED_EXIT_CODE);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(out.error(Duration::from_millis(300)).unwrap().to_string().contains("deadline exceeded"));
    }

    #[tokio::test]
    async fn test_cancel_is_distinct_from_timeout() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let out = run(sh("sleep 30"), "test", Duration::from_secs(30), &ResourceLimits::default(), &cancel)
            .await
            .unwrap();

        assert_eq!(out.termination, Termination::Canceled);
        assert_eq!(out.error(Duration::from_secs(30)).unwrap().to_string(), "execution canceled");
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_error() {
        let cancel = CancellationToken::new();
        let err = run(
            Command::new("/definitely/not/a/binary"),
            "missing",
            Duration::from_secs(1),
            &ResourceLimits::default(),
            &cancel,
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ExecutorError::Launch { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_handle_limit_applied() {
        let cancel = CancellationToken::new();
        let limits = ResourceLimits {
            max_file_handles: Some(64),
            ..Default::default()
        };
        let out = run(sh("ulimit -n"), "test", Duration::from_secs(5), &limits, &cancel)
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "64");
    }

    #[cfg(unix)]
    fn process_gone(pid: i32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        if kill(Pid::from_raw(pid), None).is_err() {
            return true;
        }
        // Reparented zombies linger until init reaps them.
        std::fs::read_to_string(format!("/proc/{}/stat", pid))
            .map(|stat| stat.contains(") Z "))
            .unwrap_or(true)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_background_job_is_killed_and_output_kept() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("bg.pid");
        let script = format!("echo hello; sleep 30 & echo $! > {}", pid_file.display());

        let started = std::time::Instant::now();
        let out = run(sh(&script), "test", Duration::from_secs(10), &ResourceLimits::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(started.elapsed() < DRAIN_GRACE, "took {:?}", started.elapsed());
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");

        let pid: i32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        let mut gone = false;
        for _ in 0..20 {
            if process_gone(pid) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "background pid {} still running", pid);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_escaped_pipe_holder_keeps_earlier_output() {
        // setsid moves the holder out of the group, so only the drain bound applies.
        if which::which("setsid").is_err() {
            return;
        }
        let started = std::time::Instant::now();
        let out = run(
            sh("echo before; setsid sleep 5 &"),
            "test",
            Duration::from_secs(10),
            &ResourceLimits::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(started.elapsed() < DRAIN_GRACE * 2, "took {:?}", started.elapsed());
        assert_eq!(out.stdout.trim(), "before");
    }

    #[tokio::test]
    async fn test_duration_matches_timestamps() {
        let cancel = CancellationToken::new();
        let out = run(sh("true"), "test", Duration::from_secs(5), &ResourceLimits::default(), &cancel)
            .await
            .unwrap();
        assert!(out.end_time >= out.start_time);
        assert_eq!((out.end_time - out.start_time).to_std().unwrap(), out.duration);
    }
}
