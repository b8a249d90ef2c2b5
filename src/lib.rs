//! Ibex: preview a file as rendered HTML or through its project's
//! auto-detected local dev server.

pub mod config;
pub mod controller;
pub mod host;
pub mod launcher;
pub mod logging;
pub mod manifest;
pub mod poller;
pub mod preview;
pub mod process;
pub mod session;
pub mod toolchain;

pub use config::IbexConfig;
pub use controller::{ControllerSettings, OpenOutcome, PreviewController, PreviewMode};
pub use host::{NoticeLevel, PreviewHost, TerminalHost};
pub use launcher::Launcher;
pub use manifest::{detect_start_spec, infer_start_spec, StartSpec};
pub use poller::{check_server_availability, poll_until_ready, HttpProbe, PollOutcome, PollPolicy, Probe};
pub use preview::{normalize_manual_url, DocumentChange, HtmlWatcher, PreviewTarget};
pub use process::{OutputMode, ProcessExit, PtyShellSpawner, ServerProcess, ShellSpawner};
pub use session::{Session, SessionState};
