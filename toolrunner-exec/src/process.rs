//! Owned process handles with escalating, idempotent termination.
//!
//! Grounded in the reference agent's bash-runner `ProcessHandle`: a
//! `Drop`-based cleanup guarantee (terminate runs at most once, even if a
//! caller drops the handle without calling `terminate` explicitly) and a
//! broadcast channel for output fan-out.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, Mutex as AsyncMutex};

/// First signal sent during escalation, and how long we wait for the child
/// to exit on its own before escalating further.
const GRACEFUL_WAIT: Duration = Duration::from_secs(5);
/// How long we wait after SIGKILL before giving up on confirming exit.
const FORCEFUL_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    ExitedGracefully,
    ExitedAfterKill,
    KilledProcessGroup,
    AlreadyExited,
}

/// A running child process plus the bookkeeping needed to terminate it
/// safely from any task, at any time, exactly once.
pub struct ProcessHandle {
    pub id: u64,
    child: AsyncMutex<Option<Child>>,
    output_tx: broadcast::Sender<Vec<u8>>,
    stdout_buf: Arc<AsyncMutex<Vec<u8>>>,
    stderr_buf: Arc<AsyncMutex<Vec<u8>>>,
    exited: Arc<AtomicBool>,
    pid: Option<u32>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("exited", &self.exited.load(Ordering::SeqCst))
            .finish()
    }
}

impl ProcessHandle {
    /// Spawn `program` with `args` in `cwd`, capturing stdout+stderr onto a
    /// broadcast channel that callers can subscribe to repeatedly.
    pub fn spawn(
        id: u64,
        program: &str,
        args: &[String],
        cwd: &std::path::Path,
        envs: impl IntoIterator<Item = (String, String)>,
    ) -> anyhow::Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .envs(envs)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Make the child its own process group leader so `kill_process_group`'s
        // `kill(-pid, ...)` targets the child (and anything it forks), not
        // whatever group this runtime's own process happens to belong to.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                if libc::setpgid(0, 0) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = cmd.spawn()?;
        let pid = child.id();

        let (output_tx, _) = broadcast::channel(1024);
        let exited = Arc::new(AtomicBool::new(false));
        let stdout_buf = Arc::new(AsyncMutex::new(Vec::new()));
        let stderr_buf = Arc::new(AsyncMutex::new(Vec::new()));

        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, output_tx.clone(), stdout_buf.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, output_tx.clone(), stderr_buf.clone());
        }

        Ok(Self {
            id,
            child: AsyncMutex::new(Some(child)),
            output_tx,
            stdout_buf,
            stderr_buf,
            exited,
            pid,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.output_tx.subscribe()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_running(&self) -> bool {
        !self.exited.load(Ordering::SeqCst)
    }

    pub async fn stdout_snapshot(&self) -> String {
        String::from_utf8_lossy(&self.stdout_buf.lock().await).into_owned()
    }

    pub async fn stderr_snapshot(&self) -> String {
        String::from_utf8_lossy(&self.stderr_buf.lock().await).into_owned()
    }

    /// Waits for natural exit without escalating. Used by callers (the
    /// `bash` tool) that want the command's own exit status rather than a
    /// forced termination outcome; `terminate` remains the only path that
    /// sends signals.
    pub async fn wait(&self) -> anyhow::Result<std::process::ExitStatus> {
        let mut guard = self.child.lock().await;
        let Some(child) = guard.as_mut() else {
            anyhow::bail!("process already reaped");
        };
        let status = child.wait().await?;
        self.exited.store(true, Ordering::SeqCst);
        Ok(status)
    }

    /// Wait for natural exit, or run the escalation protocol:
    /// SIGTERM, wait up to `GRACEFUL_WAIT`, SIGKILL, wait up to
    /// `FORCEFUL_WAIT`, then kill the process group as a last resort.
    pub async fn terminate(&self) -> anyhow::Result<TerminationOutcome> {
        let mut guard = self.child.lock().await;
        let Some(child) = guard.as_mut() else {
            return Ok(TerminationOutcome::AlreadyExited);
        };

        if let Ok(Some(_)) = child.try_wait() {
            self.exited.store(true, Ordering::SeqCst);
            return Ok(TerminationOutcome::AlreadyExited);
        }

        send_signal(child, Signal::Term);
        if tokio::time::timeout(GRACEFUL_WAIT, child.wait()).await.is_ok() {
            self.exited.store(true, Ordering::SeqCst);
            return Ok(TerminationOutcome::ExitedGracefully);
        }

        send_signal(child, Signal::Kill);
        if tokio::time::timeout(FORCEFUL_WAIT, child.wait()).await.is_ok() {
            self.exited.store(true, Ordering::SeqCst);
            return Ok(TerminationOutcome::ExitedAfterKill);
        }

        kill_process_group(self.pid);
        let _ = child.wait().await;
        self.exited.store(true, Ordering::SeqCst);
        Ok(TerminationOutcome::KilledProcessGroup)
    }
}

enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn send_signal(child: &Child, sig: Signal) {
    if let Some(pid) = child.id() {
        let signum = match sig {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };
        unsafe {
            libc::kill(pid as libc::pid_t, signum);
        }
    }
}

#[cfg(not(unix))]
fn send_signal(child: &mut Child, sig: Signal) {
    if matches!(sig, Signal::Kill) {
        let _ = child.start_kill();
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

fn spawn_reader<R>(reader: R, tx: broadcast::Sender<Vec<u8>>, buf: Arc<AsyncMutex<Vec<u8>>>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut guard = buf.lock().await;
            guard.extend_from_slice(line.as_bytes());
            guard.push(b'\n');
            drop(guard);
            let _ = tx.send(line.into_bytes());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawned_process_reports_running_then_exited() {
        let handle = ProcessHandle::spawn(1, "true", &[], std::path::Path::new("."), std::env::vars())
            .expect("spawn true");
        assert!(handle.terminate().await.is_ok());
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn terminate_on_already_exited_process_is_idempotent() {
        let handle = ProcessHandle::spawn(2, "true", &[], std::path::Path::new("."), std::env::vars())
            .expect("spawn true");
        // give it a moment to exit naturally
        tokio::time::sleep(Duration::from_millis(50)).await;
        let first = handle.terminate().await.unwrap();
        let second = handle.terminate().await.unwrap();
        assert_eq!(second, TerminationOutcome::AlreadyExited);
        let _ = first;
    }
}
