use std::path::Path;

use crate::manifest::{detect_start_spec, StartSpec};
use crate::process::{ServerProcess, ShellRequest, ShellSpawner};

/// Decides how to start a project's dev server and owns the one shell that runs it.
pub struct Launcher {
    spawner: Box<dyn ShellSpawner>,
    label: String,
    current: Option<Box<dyn ServerProcess>>,
}

impl Launcher {
    pub fn new(spawner: Box<dyn ShellSpawner>, label: impl Into<String>) -> Self {
        Self {
            spawner,
            label: label.into(),
            current: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Detect the start command for `project_root`, replace any tracked shell
    /// with a fresh one running it, and return the predicted location.
    ///
    /// `Ok(None)` means there is no project root to work with. `Err` is only
    /// returned when the shell itself cannot be started.
    pub fn start_dev_server(
        &mut self,
        project_root: Option<&Path>,
    ) -> Result<Option<StartSpec>, String> {
        let Some(root) = project_root.filter(|p| p.is_dir()) else {
            tracing::info!(root = ?project_root, "No project root, nothing to launch");
            return Ok(None);
        };

        let spec = detect_start_spec(root);

        // Always a fresh shell per start
        self.dispose_current();

        let process = self.spawner.spawn(&ShellRequest {
            label: &self.label,
            cwd: root,
            command: &spec.command,
        })?;
        self.current = Some(process);

        Ok(Some(spec))
    }

    /// Dispose and forget the tracked shell, if any. Safe to call repeatedly.
    pub fn dispose_current(&mut self) {
        if let Some(mut process) = self.current.take() {
            process.dispose();
        }
    }

    pub fn current_process_id(&self) -> Option<&str> {
        self.current.as_deref().map(|p| p.id())
    }

    pub fn has_live_process(&self) -> bool {
        self.current.as_deref().is_some_and(|p| !p.is_disposed())
    }
}
