//! Single owner of the preview session.
//!
//! Every transition (open, poll result, stop, shell exit) goes through
//! [`PreviewController`]. Session, launcher and display mode share one lock
//! that is never held across an `.await`, so a stop issued while a poll is in
//! flight is applied immediately and the poll's late result is discarded.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::IbexConfig;
use crate::host::{NoticeLevel, PreviewHost};
use crate::launcher::Launcher;
use crate::poller::{poll_until_ready, PollPolicy, Probe};
use crate::preview::{normalize_manual_url, DocumentChange, PreviewTarget};
use crate::process::ProcessExit;
use crate::session::{Session, SessionState};
use crate::toolchain::has_cli;

pub const ALREADY_RUNNING_MESSAGE: &str = "⚠️ Ibex Server is already running. Please stop it first.";
pub const SELECT_FILE_MESSAGE: &str = "Select a file to start Ibex.";
pub const NO_PROJECT_MESSAGE: &str = "Open a project folder to start the dev server.";
pub const TIMEOUT_MESSAGE: &str = "Server timeout. Check terminal.";
pub const STOPPED_MESSAGE: &str = "🛑 Ibex Server Stopped.";
pub const NPM_MISSING_MESSAGE: &str = "npm was not found on PATH; the dev server may fail to start.";

const NPM: &str = "npm";

/// What the host is currently showing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PreviewMode {
    #[default]
    Home,
    Url(String),
    Html(PathBuf),
}

/// How an `open` request ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpenOutcome {
    AlreadyRunning,
    NothingSelected,
    Html(PathBuf),
    Unreadable(String),
    NoProject,
    LaunchFailed(String),
    /// Session state once polling finished; `Idle` if it was stopped meanwhile
    Server(SessionState),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControllerSettings {
    pub poll: PollPolicy,
    pub status_duration: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&IbexConfig::default())
    }
}

impl From<&IbexConfig> for ControllerSettings {
    fn from(config: &IbexConfig) -> Self {
        Self {
            poll: PollPolicy {
                max_attempts: config.max_attempts,
                retry_delay: Duration::from_millis(config.retry_delay_ms),
            },
            status_duration: Duration::from_millis(config.status_duration_ms),
        }
    }
}

struct Inner {
    session: Session,
    launcher: Launcher,
    mode: PreviewMode,
}

type ToolchainCheck = Box<dyn Fn(&str) -> bool + Send + Sync>;

pub struct PreviewController<H: PreviewHost, P: Probe> {
    host: H,
    probe: P,
    settings: ControllerSettings,
    toolchain_check: ToolchainCheck,
    inner: Mutex<Inner>,
}

impl<H: PreviewHost, P: Probe> PreviewController<H, P> {
    pub fn new(host: H, probe: P, launcher: Launcher, settings: ControllerSettings) -> Self {
        Self {
            host,
            probe,
            settings,
            toolchain_check: Box::new(has_cli),
            inner: Mutex::new(Inner {
                session: Session::new(),
                launcher,
                mode: PreviewMode::Home,
            }),
        }
    }

    /// Replace the `npm` presence check run before each launch.
    pub fn with_toolchain_check(mut self, check: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.toolchain_check = Box::new(check);
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().session.state()
    }

    pub fn predicted_url(&self) -> Option<String> {
        self.inner.lock().session.predicted_url().map(str::to_string)
    }

    pub fn mode(&self) -> PreviewMode {
        self.inner.lock().mode.clone()
    }

    /// Preview `path`: HTML is rendered directly, anything else boots the dev
    /// server of `project_root` and waits for it to answer.
    pub async fn open(&self, path: Option<&Path>, project_root: Option<&Path>) -> OpenOutcome {
        if self.state().is_running() {
            self.host.notify(NoticeLevel::Warning, ALREADY_RUNNING_MESSAGE);
            return OpenOutcome::AlreadyRunning;
        }

        let Some(path) = path else {
            self.host.notify(NoticeLevel::Info, SELECT_FILE_MESSAGE);
            return OpenOutcome::NothingSelected;
        };

        match PreviewTarget::classify(path) {
            PreviewTarget::Html(file) => self.open_html(file),
            PreviewTarget::DevServer(_) => self.start_server(project_root).await,
        }
    }

    fn open_html(&self, file: PathBuf) -> OpenOutcome {
        let content = match std::fs::read_to_string(&file) {
            Ok(c) => c,
            Err(e) => {
                let message = format!("Could not read {}: {e}", file.display());
                tracing::warn!("{message}");
                return OpenOutcome::Unreadable(message);
            }
        };
        self.inner.lock().mode = PreviewMode::Html(file.clone());
        self.host.load_html(&file, &content);
        OpenOutcome::Html(file)
    }

    async fn start_server(&self, project_root: Option<&Path>) -> OpenOutcome {
        if !(self.toolchain_check)(NPM) {
            self.host.notify(NoticeLevel::Warning, NPM_MISSING_MESSAGE);
        }
        self.host.show_loading();

        let launched = {
            let mut inner = self.inner.lock();
            if inner.session.state().is_running() {
                Err(OpenOutcome::AlreadyRunning)
            } else {
                match inner.launcher.start_dev_server(project_root) {
                    Ok(Some(spec)) => {
                        let process_id = inner.launcher.current_process_id().map(str::to_string);
                        inner
                            .session
                            .begin(spec.predicted_url.clone(), process_id)
                            .map(|ticket| (ticket, spec))
                            .map_err(|_| OpenOutcome::AlreadyRunning)
                    }
                    Ok(None) => {
                        inner.mode = PreviewMode::Home;
                        Err(OpenOutcome::NoProject)
                    }
                    Err(e) => {
                        inner.mode = PreviewMode::Home;
                        Err(OpenOutcome::LaunchFailed(e))
                    }
                }
            }
        };

        let (ticket, spec) = match launched {
            Ok(started) => started,
            Err(outcome) => {
                match &outcome {
                    OpenOutcome::AlreadyRunning => {
                        self.host.notify(NoticeLevel::Warning, ALREADY_RUNNING_MESSAGE);
                    }
                    OpenOutcome::NoProject => {
                        self.host.notify(NoticeLevel::Info, NO_PROJECT_MESSAGE);
                        self.host.reset_to_home();
                    }
                    OpenOutcome::LaunchFailed(e) => {
                        tracing::error!("Failed to start dev server: {e}");
                        self.host
                            .notify(NoticeLevel::Error, &format!("Failed to start dev server: {e}"));
                        self.host.reset_to_home();
                    }
                    _ => {}
                }
                return outcome;
            }
        };

        tracing::info!(
            url = %spec.predicted_url,
            command = %spec.command,
            epoch = ticket.epoch,
            "Booting up server"
        );
        let url = spec.predicted_url;
        let outcome = poll_until_ready(&self.probe, &url, &self.settings.poll, ticket.cancel).await;

        let applied = {
            let mut inner = self.inner.lock();
            let applied = inner.session.finish_poll(ticket.epoch, outcome);
            if applied.is_some() {
                inner.mode = PreviewMode::Url(url.clone());
            }
            applied
        };

        match applied {
            Some(SessionState::Ready) => {
                self.host.load_url(&url);
                self.host
                    .set_status(&format!("Ibex Live: {url}"), self.settings.status_duration);
                OpenOutcome::Server(SessionState::Ready)
            }
            Some(state) => {
                self.host.notify(NoticeLevel::Error, TIMEOUT_MESSAGE);
                // Best effort: the guessed port may still be right
                self.host.load_url(&url);
                OpenOutcome::Server(state)
            }
            None => {
                tracing::debug!(url = %url, ?outcome, "Discarding stale poll result");
                OpenOutcome::Server(self.state())
            }
        }
    }

    /// Stop the tracked server. Returns `false` when nothing was running.
    pub fn stop(&self) -> bool {
        let stopped = {
            let mut inner = self.inner.lock();
            let stopped = inner.session.stop();
            inner.launcher.dispose_current();
            if stopped {
                inner.mode = PreviewMode::Home;
            }
            stopped
        };
        if !stopped {
            tracing::debug!("Stop requested with no server running");
            return false;
        }
        self.host.reset_to_home();
        self.host.notify(NoticeLevel::Info, STOPPED_MESSAGE);
        true
    }

    /// React to a server shell terminating on its own (closed by the user,
    /// crashed). Exits of shells that are no longer tracked are ignored.
    pub fn on_process_exited(&self, exit: &ProcessExit) -> bool {
        let tracked = {
            let mut inner = self.inner.lock();
            if inner.session.tracks_process(&exit.process_id) {
                inner.session.stop();
                inner.launcher.dispose_current();
                inner.mode = PreviewMode::Home;
                true
            } else {
                false
            }
        };
        if !tracked {
            tracing::debug!(process_id = %exit.process_id, "Ignoring exit of untracked shell");
            return false;
        }
        tracing::info!(
            process_id = %exit.process_id,
            label = %exit.label,
            exit_code = ?exit.exit_code,
            "Server shell closed"
        );
        self.host.reset_to_home();
        true
    }

    /// Push edited HTML to the host if that document is the one on display.
    pub fn on_document_changed(&self, change: &DocumentChange) -> bool {
        let showing = matches!(&self.inner.lock().mode, PreviewMode::Html(p) if *p == change.path);
        if showing {
            self.host.update_html(&change.content);
        }
        showing
    }

    /// Load a URL typed by the user. Blank input is ignored (`Ok(None)`).
    pub fn load_manual_url(&self, input: &str) -> Result<Option<String>, String> {
        if input.trim().is_empty() {
            tracing::debug!("Ignoring empty URL");
            return Ok(None);
        }
        match normalize_manual_url(input) {
            Ok(url) => {
                self.inner.lock().mode = PreviewMode::Url(url.clone());
                self.host.load_url(&url);
                Ok(Some(url))
            }
            Err(e) => {
                self.host.notify(NoticeLevel::Warning, &e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::test_support::{HostEvent, RecordingHost};
    use crate::launcher::test_support::FakeSpawner;
    use crate::poller::test_support::ScriptedProbe;
    use std::fs;
    use tempfile::TempDir;

    type TestController = PreviewController<RecordingHost, ScriptedProbe>;

    fn controller(script: Vec<bool>) -> (TestController, FakeSpawner) {
        let spawner = FakeSpawner::default();
        let launcher = Launcher::new(Box::new(spawner.clone()), "Ibex Auto-Server");
        let controller = PreviewController::new(
            RecordingHost::default(),
            ScriptedProbe::new(script),
            launcher,
            ControllerSettings::default(),
        )
        .with_toolchain_check(|_| true);
        (controller, spawner)
    }

    fn vite_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"scripts":{"dev":"vite"},"devDependencies":{"vite":"^5.0.0"}}"#,
        )
        .unwrap();
        fs::write(dir.path().join("main.ts"), "console.log(1)").unwrap();
        dir
    }

    async fn wait_for_state(controller: &TestController, state: SessionState) {
        while controller.state() != state {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ready_server_is_loaded_with_live_status() {
        let (controller, spawner) = controller(vec![false, true]);
        let project = vite_project();

        let outcome = controller
            .open(Some(&project.path().join("main.ts")), Some(project.path()))
            .await;

        assert_eq!(outcome, OpenOutcome::Server(SessionState::Ready));
        assert_eq!(controller.state(), SessionState::Ready);
        assert_eq!(controller.predicted_url().as_deref(), Some("http://localhost:5173"));
        assert_eq!(controller.mode(), PreviewMode::Url("http://localhost:5173".to_string()));
        assert_eq!(spawner.records()[0].command, "npm run dev");
        assert_eq!(
            controller.host().events(),
            vec![
                HostEvent::Loading,
                HostEvent::Url("http://localhost:5173".to_string()),
                HostEvent::Status("Ibex Live: http://localhost:5173".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_warns_and_still_shows_url() {
        let (controller, _) = controller(Vec::new());
        let project = TempDir::new().unwrap();

        let outcome = controller
            .open(Some(&project.path().join("app.js")), Some(project.path()))
            .await;

        assert_eq!(outcome, OpenOutcome::Server(SessionState::TimedOutButShown));
        assert_eq!(
            controller.host().events(),
            vec![
                HostEvent::Loading,
                HostEvent::Notice(NoticeLevel::Error, TIMEOUT_MESSAGE.to_string()),
                HostEvent::Url("http://localhost:3000".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_launch_while_ready_is_rejected() {
        let (controller, spawner) = controller(vec![true]);
        let project = vite_project();
        let file = project.path().join("main.ts");

        controller.open(Some(&file), Some(project.path())).await;
        let outcome = controller.open(Some(&file), Some(project.path())).await;

        assert_eq!(outcome, OpenOutcome::AlreadyRunning);
        let records = spawner.records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].disposed());
        assert_eq!(
            controller.host().notices(NoticeLevel::Warning),
            vec![ALREADY_RUNNING_MESSAGE.to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_launch_while_starting_is_rejected() {
        let (controller, spawner) = controller(Vec::new());
        let project = vite_project();
        let file = project.path().join("main.ts");

        let (first, second) = tokio::join!(controller.open(Some(&file), Some(project.path())), async {
            wait_for_state(&controller, SessionState::Starting).await;
            let outcome = controller.open(Some(&file), Some(project.path())).await;
            assert_eq!(spawner.records().len(), 1);
            assert!(!spawner.records()[0].disposed());
            controller.stop();
            outcome
        });

        assert_eq!(second, OpenOutcome::AlreadyRunning);
        assert_eq!(first, OpenOutcome::Server(SessionState::Idle));
        assert_eq!(spawner.records().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_poll_discards_result() {
        let (controller, spawner) = controller(Vec::new());
        let project = TempDir::new().unwrap();
        let file = project.path().join("server.js");

        let (outcome, stopped) = tokio::join!(controller.open(Some(&file), Some(project.path())), async {
            wait_for_state(&controller, SessionState::Starting).await;
            controller.stop()
        });

        assert!(stopped);
        assert_eq!(outcome, OpenOutcome::Server(SessionState::Idle));
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(spawner.records()[0].disposed());
        assert_eq!(
            controller.host().events(),
            vec![
                HostEvent::Loading,
                HostEvent::Home,
                HostEvent::Notice(NoticeLevel::Info, STOPPED_MESSAGE.to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_then_relaunch_spawns_fresh_shell() {
        let (controller, spawner) = controller(vec![true, true]);
        let project = vite_project();
        let file = project.path().join("main.ts");

        controller.open(Some(&file), Some(project.path())).await;
        assert!(controller.stop());
        assert!(!controller.stop(), "second stop has nothing to do");

        let outcome = controller.open(Some(&file), Some(project.path())).await;
        assert_eq!(outcome, OpenOutcome::Server(SessionState::Ready));
        let records = spawner.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].dispose_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(!records[1].disposed());
    }

    #[tokio::test(start_paused = true)]
    async fn exit_of_tracked_shell_resets_session() {
        let (controller, spawner) = controller(vec![true]);
        let project = vite_project();
        controller
            .open(Some(&project.path().join("main.ts")), Some(project.path()))
            .await;

        let stale = ProcessExit {
            process_id: "someone-else".to_string(),
            label: "Ibex Auto-Server".to_string(),
            exit_code: Some(0),
        };
        assert!(!controller.on_process_exited(&stale));
        assert_eq!(controller.state(), SessionState::Ready);

        let tracked = ProcessExit {
            process_id: spawner.records()[0].id.clone(),
            ..stale
        };
        assert!(controller.on_process_exited(&tracked));
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.mode(), PreviewMode::Home);
        assert_eq!(controller.host().events().last(), Some(&HostEvent::Home));
        assert!(controller.host().notices(NoticeLevel::Info).is_empty());

        // A repeated notification is harmless
        assert!(!controller.on_process_exited(&tracked));
    }

    #[tokio::test]
    async fn html_file_is_rendered_without_spawning() {
        let (controller, spawner) = controller(Vec::new());
        let dir = TempDir::new().unwrap();
        let page = dir.path().join("index.HTML");
        fs::write(&page, "<h1>hi</h1>").unwrap();

        let outcome = controller.open(Some(&page), Some(dir.path())).await;

        assert_eq!(outcome, OpenOutcome::Html(page.clone()));
        assert!(spawner.records().is_empty());
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(
            controller.host().events(),
            vec![HostEvent::Html(page.clone(), "<h1>hi</h1>".to_string())]
        );

        let change = DocumentChange {
            path: page.clone(),
            content: "<h1>edited</h1>".to_string(),
        };
        assert!(controller.on_document_changed(&change));
        let other = DocumentChange {
            path: dir.path().join("other.html"),
            content: "x".to_string(),
        };
        assert!(!controller.on_document_changed(&other));
        assert_eq!(
            controller.host().events().last(),
            Some(&HostEvent::HtmlUpdate("<h1>edited</h1>".to_string()))
        );
    }

    #[tokio::test]
    async fn unreadable_html_leaves_host_alone() {
        let (controller, _) = controller(Vec::new());
        let dir = TempDir::new().unwrap();

        let outcome = controller.open(Some(&dir.path().join("missing.html")), None).await;

        assert!(matches!(outcome, OpenOutcome::Unreadable(_)));
        assert!(controller.host().events().is_empty());
    }

    #[tokio::test]
    async fn nothing_selected_is_informational() {
        let (controller, spawner) = controller(Vec::new());
        assert_eq!(controller.open(None, None).await, OpenOutcome::NothingSelected);
        assert!(spawner.records().is_empty());
        assert_eq!(
            controller.host().notices(NoticeLevel::Info),
            vec![SELECT_FILE_MESSAGE.to_string()]
        );
    }

    #[tokio::test]
    async fn missing_project_root_returns_home() {
        let (controller, spawner) = controller(Vec::new());
        let outcome = controller.open(Some(Path::new("src/app.ts")), None).await;

        assert_eq!(outcome, OpenOutcome::NoProject);
        assert!(spawner.records().is_empty());
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(
            controller.host().events(),
            vec![
                HostEvent::Loading,
                HostEvent::Notice(NoticeLevel::Info, NO_PROJECT_MESSAGE.to_string()),
                HostEvent::Home,
            ]
        );
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_and_session_stays_idle() {
        let (controller, spawner) = controller(Vec::new());
        *spawner.fail_with.lock() = Some("Failed to open PTY: denied".to_string());
        let project = TempDir::new().unwrap();

        let outcome = controller
            .open(Some(&project.path().join("app.js")), Some(project.path()))
            .await;

        assert!(matches!(outcome, OpenOutcome::LaunchFailed(_)));
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.host().notices(NoticeLevel::Error).len(), 1);
        assert_eq!(controller.host().events().last(), Some(&HostEvent::Home));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_npm_warns_but_launches() {
        let (controller, spawner) = controller(vec![true]);
        let controller = controller.with_toolchain_check(|_| false);
        let project = TempDir::new().unwrap();

        controller
            .open(Some(&project.path().join("app.js")), Some(project.path()))
            .await;

        assert_eq!(spawner.records().len(), 1);
        assert_eq!(
            controller.host().notices(NoticeLevel::Warning),
            vec![NPM_MISSING_MESSAGE.to_string()]
        );
    }

    #[test]
    fn manual_url_is_normalized_and_loaded() {
        let (controller, _) = controller(Vec::new());
        assert_eq!(
            controller.load_manual_url("localhost:4000").unwrap().as_deref(),
            Some("http://localhost:4000")
        );
        assert_eq!(controller.load_manual_url("   ").unwrap(), None);
        assert!(controller.load_manual_url("httpx://host").is_err());
        assert_eq!(controller.mode(), PreviewMode::Url("http://localhost:4000".to_string()));

        let events = controller.host().events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], HostEvent::Url("http://localhost:4000".to_string()));
        assert!(matches!(&events[1], HostEvent::Notice(NoticeLevel::Warning, _)));
    }

    #[test]
    fn settings_follow_config() {
        let config = IbexConfig {
            max_attempts: 3,
            retry_delay_ms: 250,
            status_duration_ms: 1500,
            ..IbexConfig::default()
        };
        let settings = ControllerSettings::from(&config);
        assert_eq!(settings.poll.max_attempts, 3);
        assert_eq!(settings.poll.retry_delay, Duration::from_millis(250));
        assert_eq!(settings.status_duration, Duration::from_millis(1500));
    }
}
