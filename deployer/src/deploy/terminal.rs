//! Persistent shell session backing one terminal group.
//!
//! Each command is written to the shell's stdin followed by a line that
//! dumps the exit code into a uniquely named marker file. The session polls
//! for that file to learn when the command finished and how it exited, while
//! shell state (current directory, variables) carries over between commands.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::deploy::shell::ShellKind;
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::deploy::CommandStatus;

const MARKER_PREFIX: &str = ".deploy-exit-";

/// Polling and settling intervals for a session
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    pub poll_interval: Duration,
    pub output_settle: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            output_settle: Duration::from_millis(100),
        }
    }
}

/// Outcome of one command in a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRun {
    /// The exit-code marker appeared
    Exited {
        code: i32,
        stdout: String,
        stderr: String,
    },

    /// No marker within the command's ceiling
    TimedOut { after: Duration },

    /// The command could not run to completion (shell died, stdin broken)
    Aborted { reason: String },
}

impl CommandRun {
    pub fn status(&self) -> CommandStatus {
        match self {
            CommandRun::Exited { code: 0, .. } => CommandStatus::Success,
            CommandRun::Exited { .. } => CommandStatus::Failed,
            CommandRun::TimedOut { .. } | CommandRun::Aborted { .. } => CommandStatus::Error,
        }
    }

    pub fn message(&self) -> String {
        match self {
            CommandRun::Exited { code: 0, .. } => "executed successfully".to_string(),
            CommandRun::Exited {
                code,
                stdout,
                stderr,
            } => {
                if !stderr.trim().is_empty() {
                    stderr.trim().to_string()
                } else if !stdout.trim().is_empty() {
                    stdout.trim().to_string()
                } else {
                    format!("exited with code {}", code)
                }
            }
            CommandRun::TimedOut { after } => format!("command timed out after {:?}", after),
            CommandRun::Aborted { reason } => reason.clone(),
        }
    }
}

/// A live shell process for one terminal group
pub struct TerminalSession {
    terminal_id: String,
    shell: ShellKind,
    work_dir: PathBuf,
    timing: SessionTiming,
    child: Child,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    stdout: Arc<Mutex<String>>,
    stderr: Arc<Mutex<String>>,
    readers: Vec<JoinHandle<()>>,

    /// Markers of timed-out commands, removed once the shell is gone
    abandoned_markers: Vec<File>,
}

impl TerminalSession {
    /// Start a shell in `work_dir` and extend its PATH with `extra_paths`
    pub async fn spawn(
        terminal_id: &str,
        shell: ShellKind,
        work_dir: &Path,
        extra_paths: &[String],
        timing: SessionTiming,
    ) -> Result<Self, DeployError> {
        let program = shell.program();

        let mut std_command = std::process::Command::new(program);
        std_command
            .args(shell.session_args())
            .current_dir(work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // The shell leads its own group so every process it starts can be killed
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            std_command.process_group(0);
        }

        let mut child = Command::from(std_command)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DeployError::tool(program, format!("failed to start terminal: {}", e)))?;
        let pid = child.id();

        let stdin = child.stdin.take();
        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| DeployError::Internal("terminal stdout was not captured".into()))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| DeployError::Internal("terminal stderr was not captured".into()))?;

        let stdout = Arc::new(Mutex::new(String::new()));
        let stderr = Arc::new(Mutex::new(String::new()));
        let readers = vec![
            spawn_reader(stdout_pipe, stdout.clone(), terminal_id.to_string(), "stdout"),
            spawn_reader(stderr_pipe, stderr.clone(), terminal_id.to_string(), "stderr"),
        ];

        info!("Terminal {} started ({}) in {}", terminal_id, program, work_dir.display());

        let mut session = Self {
            terminal_id: terminal_id.to_string(),
            shell,
            work_dir: work_dir.to_path_buf(),
            timing,
            child,
            pid,
            stdin,
            stdout,
            stderr,
            readers,
            abandoned_markers: Vec::new(),
        };

        if let Some(line) = shell.path_line(extra_paths) {
            session.write_lines(&[line]).await?;
        }

        Ok(session)
    }

    pub fn terminal_id(&self) -> &str {
        &self.terminal_id
    }

    /// Run one rendered command line and wait for its exit-code marker
    pub async fn run(&mut self, line: &str, timeout: Duration) -> CommandRun {
        self.clear_output();

        let marker = File::new(
            self.work_dir
                .join(format!("{}{}.marker", MARKER_PREFIX, Uuid::new_v4().simple())),
        );
        let exit_line = self.shell.exit_code_line(marker.path());

        debug!("Terminal {} <- {}", self.terminal_id, line);
        let command_line = self.shell.detach_stdin(line);
        if let Err(e) = self.write_lines(&[command_line, exit_line]).await {
            return CommandRun::Aborted {
                reason: format!("failed to write to terminal: {}", e),
            };
        }

        let waited = tokio::time::timeout(timeout, self.wait_for_marker(&marker)).await;
        match waited {
            Ok(Ok(code)) => {
                // Readers may still be draining the command's last lines
                tokio::time::sleep(self.timing.output_settle).await;
                CommandRun::Exited {
                    code,
                    stdout: take(&self.stdout),
                    stderr: take(&self.stderr),
                }
            }
            Ok(Err(reason)) => CommandRun::Aborted { reason },
            Err(_) => {
                warn!(
                    "Terminal {}: command did not finish within {:?}",
                    self.terminal_id, timeout
                );
                self.abandoned_markers.push(marker);
                CommandRun::TimedOut { after: timeout }
            }
        }
    }

    /// Close stdin, give the shell `grace` to exit, then kill it and
    /// everything it started
    ///
    /// Background processes left behind by a shell that exited on its own are
    /// killed too, so nothing keeps writing into the working tree once the
    /// session is closed.
    pub async fn close(mut self, grace: Duration) {
        drop(self.stdin.take());

        let exited = tokio::time::timeout(grace, self.child.wait()).await;
        match exited {
            Ok(Ok(status)) => {
                debug!("Terminal {} exited with {}", self.terminal_id, status);
                self.kill_process_tree().await;
            }
            Ok(Err(e)) => {
                warn!("Terminal {} wait failed: {}", self.terminal_id, e);
                self.kill_process_tree().await;
            }
            Err(_) => {
                warn!(
                    "Terminal {} still running after {:?}, killing it",
                    self.terminal_id, grace
                );
                self.kill_process_tree().await;
                if let Err(e) = self.child.kill().await {
                    debug!("Terminal {} already gone: {}", self.terminal_id, e);
                }
            }
        }

        for reader in self.readers.drain(..) {
            reader.abort();
        }

        for marker in self.abandoned_markers.drain(..) {
            if let Err(e) = marker.delete().await {
                warn!("Failed to remove marker {}: {}", marker.path().display(), e);
            }
        }

        info!("Terminal {} closed", self.terminal_id);
    }

    /// Kill the shell's process group
    #[cfg(unix)]
    async fn kill_process_tree(&mut self) {
        let Some(pid) = self.pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
            return;
        };

        // SAFETY: killpg only sends a signal; the group id is the shell's pid
        let rc = unsafe { libc::killpg(pid, libc::SIGKILL) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!("Failed to kill process group of terminal {}: {}", self.terminal_id, err);
            }
        }
    }

    /// Kill the shell and its descendants with `taskkill /T`
    #[cfg(windows)]
    async fn kill_process_tree(&mut self) {
        let Some(pid) = self.pid else {
            return;
        };

        let result = Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = result {
            warn!("Failed to run taskkill for terminal {}: {}", self.terminal_id, e);
        }
    }

    async fn write_lines(&mut self, lines: &[String]) -> Result<(), DeployError> {
        let eol = self.shell.line_ending();
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| DeployError::Internal("terminal stdin is closed".into()))?;

        let mut payload = String::new();
        for line in lines {
            payload.push_str(line);
            payload.push_str(eol);
        }

        stdin.write_all(payload.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Poll until the marker holds a parsable exit code, then consume it
    async fn wait_for_marker(&mut self, marker: &File) -> Result<i32, String> {
        loop {
            if marker.exists().await {
                // The shell may still be writing; an unparsable read is retried
                if let Ok(contents) = marker.read_string().await {
                    if let Ok(code) = contents.trim().parse::<i32>() {
                        if let Err(e) = marker.delete().await {
                            warn!("Failed to remove marker {}: {}", marker.path().display(), e);
                        }
                        return Ok(code);
                    }
                }
            }

            if let Ok(Some(status)) = self.child.try_wait() {
                return Err(format!(
                    "terminal exited ({}) before the command completed",
                    status
                ));
            }

            tokio::time::sleep(self.timing.poll_interval).await;
        }
    }

    fn clear_output(&self) {
        self.stdout.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.stderr.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

fn take(buffer: &Mutex<String>) -> String {
    std::mem::take(&mut *buffer.lock().unwrap_or_else(|e| e.into_inner()))
}

fn spawn_reader<R>(
    pipe: R,
    buffer: Arc<Mutex<String>>,
    terminal_id: String,
    stream: &'static str,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut raw = Vec::new();

        loop {
            raw.clear();
            let read = reader.read_until(b'\n', &mut raw).await;
            match read {
                Ok(0) => break,
                Ok(_) => {
                    // Console code pages are not always UTF-8
                    let line = String::from_utf8_lossy(&raw);
                    debug!("Terminal {} {}: {}", terminal_id, stream, line.trim_end());
                    buffer
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push_str(&line);
                }
                Err(e) => {
                    warn!("Terminal {} {} read error: {}", terminal_id, stream, e);
                    break;
                }
            }
        }
    })
}
