//! Locating the JavaScript toolchain before a launch.
//!
//! Editor- and desktop-launched processes often do not inherit the user's
//! shell PATH, so `npm` is also looked for in the directories Node installers
//! and version managers use. A miss is only a warning: the login shell that
//! runs the dev server may still find it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Directories where Node tooling lives but that may be missing from PATH.
fn node_bin_dirs() -> &'static [PathBuf] {
    static DIRS: OnceLock<Vec<PathBuf>> = OnceLock::new();
    DIRS.get_or_init(|| {
        let home = dirs::home_dir().unwrap_or_default();
        let mut dirs = Vec::new();

        #[cfg(target_os = "macos")]
        dirs.extend([
            PathBuf::from("/usr/local/bin"),
            PathBuf::from("/opt/homebrew/bin"),
        ]);

        #[cfg(target_os = "linux")]
        dirs.extend([
            PathBuf::from("/usr/bin"),
            PathBuf::from("/usr/local/bin"),
            home.join(".local/bin"),
            PathBuf::from("/snap/bin"),
        ]);

        #[cfg(not(target_os = "windows"))]
        dirs.extend([
            home.join(".volta/bin"),
            home.join(".npm-global/bin"),
            home.join(".local/share/fnm/aliases/default/bin"),
        ]);

        #[cfg(target_os = "windows")]
        {
            let program_files =
                std::env::var("ProgramFiles").unwrap_or_else(|_| "C:\\Program Files".to_string());
            dirs.push(PathBuf::from(program_files).join("nodejs"));
            dirs.push(home.join("AppData\\Roaming\\npm"));
            dirs.push(home.join(".volta\\bin"));
        }

        dirs
    })
}

fn executable_names(name: &str) -> Vec<String> {
    if cfg!(windows) {
        vec![format!("{name}.cmd"), format!("{name}.exe"), name.to_string()]
    } else {
        vec![name.to_string()]
    }
}

/// First candidate in `dirs` that exists.
fn find_in_dirs(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| executable_names(name).into_iter().map(move |n| dir.join(n)))
        .find(|candidate| candidate.is_file())
}

fn on_path(name: &str) -> bool {
    let checker = if cfg!(target_os = "windows") {
        "where"
    } else {
        "which"
    };
    std::process::Command::new(checker)
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check if a CLI tool exists on PATH or in well-known Node directories.
/// Results are cached per name; installs do not move while we run.
pub fn has_cli(name: &str) -> bool {
    static CACHE: OnceLock<parking_lot::Mutex<HashMap<String, bool>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| parking_lot::Mutex::new(HashMap::new()));

    if let Some(found) = cache.lock().get(name) {
        return *found;
    }

    let found = on_path(name) || find_in_dirs(name, node_bin_dirs()).is_some();
    cache.lock().insert(name.to_string(), found);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn node_bin_dirs_has_no_duplicates() {
        let mut seen = std::collections::HashSet::new();
        for dir in node_bin_dirs() {
            assert!(seen.insert(dir), "Duplicate directory: {}", dir.display());
        }
    }

    #[test]
    fn find_in_dirs_finds_candidate() {
        let dir = TempDir::new().unwrap();
        let name = executable_names("npm").remove(0);
        std::fs::write(dir.path().join(&name), "").unwrap();

        let found = find_in_dirs("npm", &[PathBuf::from("/definitely/not/here"), dir.path().to_path_buf()]);
        assert_eq!(found, Some(dir.path().join(name)));
    }

    #[test]
    fn find_in_dirs_misses_cleanly() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_in_dirs("npm", &[dir.path().to_path_buf()]), None);
    }

    #[test]
    fn has_cli_false_for_unknown_binary_and_cached() {
        assert!(!has_cli("nonexistent_binary_ibex_12345"));
        assert!(!has_cli("nonexistent_binary_ibex_12345"));
    }
}
