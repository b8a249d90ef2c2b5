//! The display layer the controller drives.
//!
//! In an editor this is a docked preview panel plus the notification area.
//! The CLI uses [`TerminalHost`], which renders everything as status lines on
//! stderr so the server's own output keeps stdout to itself.

use std::path::Path;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

pub trait PreviewHost: Send + Sync {
    /// Show the "starting server" placeholder.
    fn show_loading(&self);
    fn load_url(&self, url: &str);
    fn load_html(&self, path: &Path, content: &str);
    /// Replace the rendered document in place (live edit).
    fn update_html(&self, content: &str);
    /// Back to the idle landing view.
    fn reset_to_home(&self);
    fn notify(&self, level: NoticeLevel, message: &str);
    /// Transient status line that clears itself after `duration`.
    fn set_status(&self, message: &str, duration: Duration);
}

/// Writes host events to stderr.
#[derive(Debug, Default)]
pub struct TerminalHost;

impl PreviewHost for TerminalHost {
    fn show_loading(&self) {
        eprintln!("[Ibex] Starting server... establishing connection");
    }

    fn load_url(&self, url: &str) {
        eprintln!("[Ibex] Preview: {url}");
    }

    fn load_html(&self, path: &Path, content: &str) {
        eprintln!(
            "[Ibex] Live HTML preview: {} ({} bytes)",
            path.display(),
            content.len()
        );
    }

    fn update_html(&self, content: &str) {
        eprintln!("[Ibex] HTML updated ({} bytes)", content.len());
    }

    fn reset_to_home(&self) {
        eprintln!("[Ibex] Engine ready");
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => eprintln!("[Ibex] {message}"),
            NoticeLevel::Warning => eprintln!("[Ibex] warning: {message}"),
            NoticeLevel::Error => eprintln!("[Ibex] error: {message}"),
        }
    }

    fn set_status(&self, message: &str, _duration: Duration) {
        // A terminal line cannot expire; print it once
        eprintln!("[Ibex] {message}");
    }
}
