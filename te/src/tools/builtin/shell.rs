//! bash tool - one-shot commands and a persistent interpreter session

use async_trait::async_trait;
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::ShellConfig;
use crate::tools::args::{SHELL_TOOL, ShellCommand};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

use super::maybe_truncate;

const SENTINEL_TOKEN_LEN: usize = 16;
const READ_CHUNK: usize = 8192;
const REAP_GRACE: Duration = Duration::from_secs(1);

/// How commands are run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShellMode {
    /// One long-lived interpreter; cwd and environment carry over
    #[default]
    Session,
    /// A fresh `<program> -c` per command
    OneShot,
}

impl ShellMode {
    /// Parse a mode name, tolerating the spellings agents tend to use
    pub fn parse_lenient(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().replace('_', "-").as_str() {
            "session" | "persistent" | "interactive" => Some(Self::Session),
            "one-shot" | "oneshot" | "once" => Some(Self::OneShot),
            other => {
                warn!(%other, "ShellMode::parse_lenient: unknown mode, using default");
                None
            }
        }
    }
}

/// Kill every process in the group led by `pid`
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return;
    };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => debug!(pid, "kill_process_group: sent SIGKILL"),
        Err(e) => debug!(pid, %e, "kill_process_group: failed"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

fn spawnable(program: &str, cwd: &Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(-1)
}

/// What reading one command's output amounted to
#[derive(Debug)]
enum SessionRun {
    Completed { output: String, status: i32 },
    TimedOut { partial: String },
    Exited { partial: String, status: Option<i32> },
}

/// A long-lived interpreter framed by sentinel lines
///
/// Each command is followed by a `printf` of `<sentinel>:<status>` on its own
/// line. The sentinel is a random per-session token plus a per-command
/// sequence number, so output that happens to look like an earlier sentinel
/// never ends a later read.
///
/// A command that leaves a quote or heredoc open swallows the `printf`, so
/// the sentinel never appears and the call ends in a timeout.
#[derive(Debug)]
pub struct ShellSession {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    token: String,
    sequence: u64,
    pending: Vec<u8>,
    timed_out: bool,
    exited: bool,
    killed: bool,
}

impl ShellSession {
    /// Spawn `program` in `cwd` with stderr folded into stdout
    pub async fn start(program: &str, cwd: &Path) -> std::io::Result<Self> {
        debug!(%program, ?cwd, "ShellSession::start: called");
        let mut child = spawnable(program, cwd).stdin(Stdio::piped()).spawn()?;

        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(std::io::Error::other("interpreter pipes unavailable"));
        };
        stdin.write_all(b"exec 2>&1\n").await?;
        stdin.flush().await?;

        info!(pid = ?child.id(), %program, "Started shell session");
        Ok(Self {
            child,
            stdin,
            stdout,
            token: Alphanumeric.sample_string(&mut rand::rng(), SENTINEL_TOKEN_LEN),
            sequence: 0,
            pending: Vec::new(),
            timed_out: false,
            exited: false,
            killed: false,
        })
    }

    /// Whether the session can take another command
    pub fn is_usable(&self) -> bool {
        !self.timed_out && !self.exited && !self.killed
    }

    async fn run(&mut self, command: &str, timeout: Duration) -> SessionRun {
        self.sequence += 1;
        let sentinel = format!("__te_{}_{}__", self.token, self.sequence);
        debug!(sequence = self.sequence, ?timeout, "ShellSession::run: called");

        // The blank line ends a trailing `\` continuation before the sentinel
        let script = format!("{}\n\nprintf '\\n%s:%s\\n' '{}' \"$?\"\n", command, sentinel);
        let written = async {
            self.stdin.write_all(script.as_bytes()).await?;
            self.stdin.flush().await
        }
        .await;
        if let Err(e) = written {
            debug!(%e, "ShellSession::run: write to interpreter failed");
            return self.exited(String::new()).await;
        }

        let marker = format!("\n{}:", sentinel).into_bytes();
        let mut buf = std::mem::take(&mut self.pending);
        let stdout = &mut self.stdout;
        let read = tokio::time::timeout(timeout, async {
            let mut chunk = vec![0u8; READ_CHUNK];
            loop {
                if let Some(at) = find(&buf, &marker) {
                    let rest = at + marker.len();
                    if let Some(newline) = buf[rest..].iter().position(|b| *b == b'\n') {
                        return Ok::<_, std::io::Error>(Some((at, rest, rest + newline)));
                    }
                }
                let n = stdout.read(&mut chunk).await?;
                if n == 0 {
                    return Ok(None);
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        })
        .await;

        match read {
            Ok(Ok(Some((at, status_start, status_end)))) => {
                let status = String::from_utf8_lossy(&buf[status_start..status_end])
                    .trim()
                    .parse()
                    .unwrap_or(-1);
                self.pending = buf.split_off(status_end + 1);
                buf.truncate(at);
                let mut output = String::from_utf8_lossy(&buf).into_owned();
                if output.ends_with('\n') {
                    output.pop();
                }
                debug!(status, len = output.len(), "ShellSession::run: sentinel observed");
                SessionRun::Completed { output, status }
            }
            Ok(Ok(None)) => {
                debug!("ShellSession::run: EOF before sentinel");
                self.exited(String::from_utf8_lossy(&buf).into_owned()).await
            }
            Ok(Err(e)) => {
                debug!(%e, "ShellSession::run: read failed");
                self.exited(String::from_utf8_lossy(&buf).into_owned()).await
            }
            Err(_) => {
                warn!(sequence = self.sequence, ?timeout, "Shell command timed out, killing session");
                self.timed_out = true;
                self.terminate().await;
                SessionRun::TimedOut {
                    partial: String::from_utf8_lossy(&buf).into_owned(),
                }
            }
        }
    }

    async fn exited(&mut self, partial: String) -> SessionRun {
        self.exited = true;
        let status = match tokio::time::timeout(REAP_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => Some(exit_code(status)),
            _ => None,
        };
        info!(?status, "Shell session exited");
        self.terminate().await;
        SessionRun::Exited { partial, status }
    }

    /// Kill the interpreter and everything it started
    pub async fn terminate(&mut self) {
        if self.killed {
            return;
        }
        debug!(pid = ?self.child.id(), "ShellSession::terminate: called");
        self.killed = true;
        kill_process_group(self.child.id());
        let _ = self.child.start_kill();
        let _ = tokio::time::timeout(REAP_GRACE, self.child.wait()).await;
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        if !self.killed {
            debug!(pid = ?self.child.id(), "ShellSession::drop: killing process group");
            kill_process_group(self.child.id());
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Shell tool with an optional persistent session
pub struct ShellTool {
    program: String,
    mode: ShellMode,
    timeout: Duration,
    max_response_len: usize,
    session: Option<ShellSession>,
}

impl ShellTool {
    pub fn new(config: &ShellConfig) -> Self {
        debug!(?config, "ShellTool::new: called");
        Self {
            program: config.program.clone(),
            mode: config.mode,
            timeout: Duration::from_secs(config.timeout_secs),
            max_response_len: config.max_response_len,
            session: None,
        }
    }

    /// Whether a live session is currently held
    pub fn has_session(&self) -> bool {
        self.session.as_ref().is_some_and(ShellSession::is_usable)
    }

    /// Terminate the session, if any
    pub async fn shutdown(&mut self) {
        debug!("ShellTool::shutdown: called");
        if let Some(mut session) = self.session.take() {
            session.terminate().await;
            info!("Shell session shut down");
        }
    }

    async fn restart(&mut self, cwd: &Path) -> ToolResult {
        debug!("ShellTool::restart: called");
        self.shutdown().await;
        match ShellSession::start(&self.program, cwd).await {
            Ok(session) => {
                self.session = Some(session);
                info!("Shell session restarted");
                ToolResult::success("tool has been restarted.")
            }
            Err(e) => ToolResult::error(format!("Failed to start {}: {}", self.program, e)),
        }
    }

    async fn run_in_session(&mut self, command: &str, timeout: Duration, cwd: &Path) -> ToolResult {
        let mut session = match self.session.take() {
            Some(session) if session.is_usable() => session,
            stale => {
                if let Some(mut old) = stale {
                    info!("Replacing unusable shell session");
                    old.terminate().await;
                }
                match ShellSession::start(&self.program, cwd).await {
                    Ok(session) => session,
                    Err(e) => {
                        debug!(%e, "ShellTool::run_in_session: spawn failed");
                        return ToolResult::error(format!("Failed to start {}: {}", self.program, e));
                    }
                }
            }
        };

        let run = session.run(command, timeout).await;
        self.session = Some(session);

        match run {
            SessionRun::Completed { output, status } => self.finished(output, status),
            SessionRun::TimedOut { partial } => self.timed_out(partial, timeout, ShellMode::Session),
            SessionRun::Exited { partial, status } => {
                let status = status.map_or_else(|| "unknown".to_string(), |s| s.to_string());
                let (partial, notice) = maybe_truncate(partial, self.max_response_len);
                ToolResult {
                    output: (!partial.is_empty()).then_some(partial),
                    error: Some(format!(
                        "{} has exited with returncode {}. A new session will be started on the next command.",
                        self.program, status
                    )),
                    system: notice,
                }
            }
        }
    }

    async fn run_once(&self, command: &str, timeout: Duration, cwd: &Path) -> ToolResult {
        debug!(?timeout, "ShellTool::run_once: called");
        let mut child = match spawnable(&self.program, cwd)
            .arg("-c")
            .arg(format!("exec 2>&1\n{}", command))
            .stdin(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                debug!(%e, "ShellTool::run_once: spawn failed");
                return ToolResult::error(format!("Failed to start {}: {}", self.program, e));
            }
        };
        let Some(mut stdout) = child.stdout.take() else {
            return ToolResult::error("Failed to capture command output");
        };

        let mut buf = Vec::new();
        let waited = tokio::time::timeout(timeout, async {
            stdout.read_to_end(&mut buf).await?;
            child.wait().await
        })
        .await;

        match waited {
            Ok(Ok(status)) => {
                let mut output = String::from_utf8_lossy(&buf).into_owned();
                if output.ends_with('\n') {
                    output.pop();
                }
                self.finished(output, exit_code(status))
            }
            Ok(Err(e)) => {
                debug!(%e, "ShellTool::run_once: wait failed");
                ToolResult::error(format!("Failed to run command: {}", e))
            }
            Err(_) => {
                warn!(?timeout, "One-shot command timed out, killing process group");
                kill_process_group(child.id());
                let _ = child.start_kill();
                self.timed_out(String::from_utf8_lossy(&buf).into_owned(), timeout, ShellMode::OneShot)
            }
        }
    }

    fn finished(&self, output: String, status: i32) -> ToolResult {
        let (output, notice) = maybe_truncate(output, self.max_response_len);
        if status == 0 {
            debug!("ShellTool::finished: command succeeded");
            ToolResult::success(output).with_system(notice)
        } else {
            debug!(status, "ShellTool::finished: command failed");
            ToolResult::partial(output, format!("Exit code: {}", status)).with_system(notice)
        }
    }

    fn timed_out(&self, partial: String, timeout: Duration, mode: ShellMode) -> ToolResult {
        let (partial, notice) = maybe_truncate(partial, self.max_response_len);
        let mut error = format!(
            "timed out: {} has not returned in {} seconds and was killed.",
            self.program,
            timeout.as_secs_f64()
        );
        if mode == ShellMode::Session {
            error.push_str(" A new session will be started on the next command.");
        }
        ToolResult {
            output: (!partial.is_empty()).then_some(partial),
            error: Some(error),
            system: notice,
        }
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new(&ShellConfig::default())
    }
}

#[async_trait]
impl Tool for ShellTool {
    type Command = ShellCommand;

    fn name(&self) -> &'static str {
        SHELL_TOOL
    }

    fn description(&self) -> &'static str {
        "Run commands in a bash shell\n\
         * When invoking this tool, the contents of the \"command\" parameter does NOT need to be XML-escaped.\n\
         * State is persistent across command calls and discussions with the user.\n\
         * To inspect a particular line range of a file, e.g. lines 10-25, try 'sed -n 10,25p /path/to/the/file'.\n\
         * Please avoid commands that may produce a very large amount of output.\n\
         * Please run long lived commands in the background, e.g. 'sleep 10 &' or start a server in the background."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to run. Required unless the tool is being restarted."
                },
                "restart": {
                    "type": "boolean",
                    "description": "Specifying true will restart this tool. Otherwise, leave this unspecified."
                },
                "timeout": {
                    "type": "number",
                    "description": "Seconds to wait for the command before killing it (default from configuration)"
                },
                "mode": {
                    "type": "string",
                    "enum": ["session", "one-shot"],
                    "description": "Run in the persistent session or in a fresh process"
                }
            }
        })
    }

    async fn execute(&mut self, command: ShellCommand, ctx: &mut ToolContext) -> Result<ToolResult, ToolError> {
        debug!(?command, "ShellTool::execute: called");
        let result = match command {
            ShellCommand::Restart => self.restart(&ctx.cwd).await,
            ShellCommand::Run { command, timeout, mode } => {
                if command.trim().is_empty() {
                    return Err(ToolError::EmptyCommand);
                }
                let timeout = timeout.unwrap_or(self.timeout);
                match mode.unwrap_or(self.mode) {
                    ShellMode::Session => self.run_in_session(&command, timeout, &ctx.cwd).await,
                    ShellMode::OneShot => self.run_once(&command, timeout, &ctx.cwd).await,
                }
            }
        };
        Ok(result)
    }
}
