use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind, Debouncer};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Debounce interval to coalesce the burst of writes an editor save produces
const DEBOUNCE_MS: u64 = 200;

/// What opening a file means.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreviewTarget {
    /// Render the document directly
    Html(PathBuf),
    /// Anything else previews the project's dev server
    DevServer(PathBuf),
}

impl PreviewTarget {
    pub fn classify(path: &Path) -> Self {
        let is_html = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"));
        if is_html {
            PreviewTarget::Html(path.to_path_buf())
        } else {
            PreviewTarget::DevServer(path.to_path_buf())
        }
    }
}

/// Turn whatever was typed into the address bar into a loadable URL.
/// Bare hosts get `http://`.
pub fn normalize_manual_url(input: &str) -> Result<String, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("URL is empty".to_string());
    }
    let candidate = if trimmed.starts_with("http") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let parsed = url::Url::parse(&candidate).map_err(|e| format!("Invalid URL \"{trimmed}\": {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(candidate),
        scheme => Err(format!("Scheme \"{scheme}\" is not allowed; use http or https")),
    }
}

/// New content of a watched HTML document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentChange {
    pub path: PathBuf,
    pub content: String,
}

/// Watches one HTML file and posts its content whenever it changes.
/// Dropping the watcher stops it.
pub struct HtmlWatcher {
    path: PathBuf,
    _debouncer: Debouncer<notify::RecommendedWatcher>,
}

impl HtmlWatcher {
    pub fn start(path: &Path, tx: UnboundedSender<DocumentChange>) -> Result<Self, String> {
        let file_name: OsString = path
            .file_name()
            .ok_or_else(|| format!("Not a file: {}", path.display()))?
            .to_os_string();
        // Watch the directory: editors often save by writing a temp file and
        // renaming it over the original, which a file-level watch would miss
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let watched = path.to_path_buf();
        let reported = watched.clone();

        let mut debouncer = new_debouncer(
            Duration::from_millis(DEBOUNCE_MS),
            move |events: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                let Ok(events) = events else { return };

                let touched = events.iter().any(|e| {
                    matches!(e.kind, DebouncedEventKind::Any)
                        && e.path.file_name() == Some(file_name.as_os_str())
                });
                if !touched {
                    return;
                }

                match std::fs::read_to_string(&watched) {
                    Ok(content) => {
                        let _ = tx.send(DocumentChange {
                            path: watched.clone(),
                            content,
                        });
                    }
                    Err(e) => {
                        tracing::debug!(path = %watched.display(), "Skipping unreadable document: {e}");
                    }
                }
            },
        )
        .map_err(|e| format!("Failed to create watcher: {e}"))?;

        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| format!("Failed to watch {}: {e}", dir.display()))?;

        tracing::debug!(path = %reported.display(), "Watching HTML document");
        Ok(Self {
            path: reported,
            _debouncer: debouncer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
