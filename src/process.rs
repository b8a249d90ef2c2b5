//! Interactive shell processes that host a dev server.
//!
//! A spawned shell is wrapped in an opaque [`ServerProcess`] handle that can
//! only be disposed. Its output is forwarded to the user's terminal (or
//! discarded) and never parsed; its exit is announced on a channel as a
//! [`ProcessExit`] carrying the handle id.

use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::Path;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;

/// Handle to a spawned server shell. Exclusively owned by the launcher.
pub trait ServerProcess: Send {
    fn id(&self) -> &str;
    fn label(&self) -> &str;
    /// Tear the process down. Calling this again is a no-op.
    fn dispose(&mut self);
    fn is_disposed(&self) -> bool;
}

/// What to run, where, and under which human-readable label.
#[derive(Clone, Copy, Debug)]
pub struct ShellRequest<'a> {
    pub label: &'a str,
    pub cwd: &'a Path,
    pub command: &'a str,
}

/// Starts an interactive shell and types `request.command` into it.
pub trait ShellSpawner: Send {
    fn spawn(&self, request: &ShellRequest<'_>) -> Result<Box<dyn ServerProcess>, String>;
}

/// Posted when a spawned shell terminates, whoever caused it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessExit {
    pub process_id: String,
    pub label: String,
    pub exit_code: Option<u32>,
}

/// Where the shell's output goes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Copy to our stdout so the user sees the server log
    #[default]
    Inherit,
    Discard,
}

/// Get the platform-appropriate default shell when no override is configured.
pub(crate) fn default_shell() -> String {
    #[cfg(windows)]
    {
        std::env::var("COMSPEC").unwrap_or_else(|_| "powershell.exe".to_string())
    }
    #[cfg(not(windows))]
    {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string())
    }
}

/// Resolve the shell to use: explicit override > env default > platform default.
pub(crate) fn resolve_shell(override_shell: Option<String>) -> String {
    override_shell
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(default_shell)
}

/// Build a CommandBuilder for an interactive login shell rooted at `cwd`.
pub(crate) fn build_shell_command(shell: &str, cwd: &Path) -> CommandBuilder {
    let mut cmd = CommandBuilder::new(shell);
    // Login shell so version managers (nvm, fnm, volta) put npm on PATH
    #[cfg(not(windows))]
    cmd.arg("-l");
    #[cfg(not(windows))]
    {
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        if let Ok(lang) = std::env::var("LANG") {
            cmd.env("LANG", lang);
        } else {
            cmd.env("LANG", "en_US.UTF-8");
        }
    }
    cmd.cwd(cwd);
    cmd
}

/// The text typed into the shell for a command: one line, submitted.
pub(crate) fn command_line(command: &str) -> String {
    format!("{}\r", command.trim_end())
}

/// Spawns PTY-backed shells and reports their exits on `exit_tx`.
pub struct PtyShellSpawner {
    shell: String,
    output: OutputMode,
    exit_tx: UnboundedSender<ProcessExit>,
}

impl PtyShellSpawner {
    pub fn new(
        shell_override: Option<String>,
        output: OutputMode,
        exit_tx: UnboundedSender<ProcessExit>,
    ) -> Self {
        Self {
            shell: resolve_shell(shell_override),
            output,
            exit_tx,
        }
    }
}

impl ShellSpawner for PtyShellSpawner {
    fn spawn(&self, request: &ShellRequest<'_>) -> Result<Box<dyn ServerProcess>, String> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: DEFAULT_ROWS,
                cols: DEFAULT_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| format!("Failed to open PTY: {e}"))?;

        let cmd = build_shell_command(&self.shell, request.cwd);
        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| format!("Failed to spawn shell {}: {e}", self.shell))?;
        // The slave end belongs to the child now; keeping it open would hide EOF
        drop(pair.slave);

        let killer = child.clone_killer();
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| format!("Failed to get PTY reader: {e}"))?;
        let mut writer = pair
            .master
            .take_writer()
            .map_err(|e| format!("Failed to get PTY writer: {e}"))?;

        let id = Uuid::new_v4().to_string();
        let label = request.label.to_string();

        spawn_output_pump(reader, self.output);

        {
            let exit_tx = self.exit_tx.clone();
            let process_id = id.clone();
            let label = label.clone();
            std::thread::spawn(move || {
                let exit_code = match child.wait() {
                    Ok(status) => Some(status.exit_code()),
                    Err(e) => {
                        tracing::debug!(process_id = %process_id, "Error waiting for shell: {e}");
                        None
                    }
                };
                tracing::debug!(process_id = %process_id, ?exit_code, "Server shell exited");
                // Receiver gone means nobody is tracking sessions anymore
                let _ = exit_tx.send(ProcessExit {
                    process_id,
                    label,
                    exit_code,
                });
            });
        }

        writer
            .write_all(command_line(request.command).as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| format!("Failed to send command to shell: {e}"))?;

        tracing::info!(
            process_id = %id,
            label = %label,
            shell = %self.shell,
            cwd = %request.cwd.display(),
            command = %request.command,
            "Spawned server shell"
        );

        Ok(Box::new(PtyServerProcess {
            id,
            label,
            writer: Some(writer),
            master: Some(pair.master),
            killer: Some(killer),
        }))
    }
}

/// Drain the PTY so the child never blocks on a full buffer.
fn spawn_output_pump(mut reader: Box<dyn Read + Send>, output: OutputMode) {
    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if output == OutputMode::Inherit {
                        let mut stdout = std::io::stdout().lock();
                        if stdout.write_all(&buf[..n]).and_then(|_| stdout.flush()).is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });
}

struct PtyServerProcess {
    id: String,
    label: String,
    writer: Option<Box<dyn Write + Send>>,
    master: Option<Box<dyn MasterPty + Send>>,
    killer: Option<Box<dyn ChildKiller + Send + Sync>>,
}

impl ServerProcess for PtyServerProcess {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn dispose(&mut self) {
        let Some(mut killer) = self.killer.take() else {
            return;
        };
        // Ctrl-C first so the dev server gets a chance to release its port
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.write_all(&[0x03]);
            let _ = writer.flush();
        }
        if let Err(e) = killer.kill() {
            // Already gone: the exit waiter has or will report it
            tracing::debug!(process_id = %self.id, "Kill failed: {e}");
        }
        self.master = None;
        tracing::info!(process_id = %self.id, label = %self.label, "Disposed server shell");
    }

    fn is_disposed(&self) -> bool {
        self.killer.is_none()
    }
}

impl Drop for PtyServerProcess {
    fn drop(&mut self) {
        self.dispose();
    }
}
