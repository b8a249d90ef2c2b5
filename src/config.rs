use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that relocates the whole config directory.
pub(crate) const CONFIG_DIR_ENV: &str = "IBEX_CONFIG_DIR";

const APP_CONFIG_FILE: &str = "config.json";

/// Get the config directory using platform-appropriate location.
///
/// - `$IBEX_CONFIG_DIR` when set
/// - macOS: `~/Library/Application Support/ibex/`
/// - Linux: `~/.config/ibex/` (or `$XDG_CONFIG_HOME`)
/// - Windows: `%APPDATA%/ibex/`
///
/// Falls back to `~/.ibex/` if the platform dir is unavailable.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .map(|d| d.join("ibex"))
        .unwrap_or_else(legacy_dotdir)
}

fn legacy_dotdir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ibex")
}

/// Load a JSON config file from `dir`, returning Default if missing or corrupt.
/// A file that exists but cannot be read or parsed is logged, so a corrupt
/// config is visible instead of silently resetting.
pub(crate) fn load_json_config<T: DeserializeOwned + Default>(dir: &Path, filename: &str) -> T {
    let path = dir.join(filename);
    if !path.exists() {
        return T::default();
    }
    let content = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Could not read config: {e}");
            return T::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(path = %path.display(), "Corrupt config: {e}. Using defaults.");
            T::default()
        }
    }
}

/// Save a JSON config file atomically (temp file + rename).
/// Sets 0600 permissions on Unix.
pub(crate) fn save_json_config<T: Serialize>(
    dir: &Path,
    filename: &str,
    config: &T,
) -> Result<PathBuf, String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("Failed to create config directory: {e}"))?;

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {e}"))?;

    let target = dir.join(filename);
    let temp = dir.join(format!("{}.tmp.{}", filename, std::process::id()));

    std::fs::write(&temp, &json).map_err(|e| format!("Failed to write temp config: {e}"))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&temp, perms)
            .map_err(|e| format!("Failed to set config permissions: {e}"))?;
    }

    std::fs::rename(&temp, &target).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        format!("Failed to commit config: {e}")
    })?;

    Ok(target)
}

/// User-tunable launch and polling settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IbexConfig {
    /// Shell override for the server terminal (None = platform default)
    #[serde(default)]
    pub shell: Option<String>,
    /// Label of the interactive shell that runs the dev server
    #[serde(default = "default_terminal_label")]
    pub terminal_label: String,
    /// Probe cycles before giving up on the dev server
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between probe cycles
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Upper bound for a single probe request
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// How long the "live" status message stays visible
    #[serde(default = "default_status_duration_ms")]
    pub status_duration_ms: u64,
}

fn default_terminal_label() -> String {
    "Ibex Auto-Server".to_string()
}

fn default_max_attempts() -> u32 {
    20
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_status_duration_ms() -> u64 {
    5000
}

impl Default for IbexConfig {
    fn default() -> Self {
        Self {
            shell: None,
            terminal_label: default_terminal_label(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            status_duration_ms: default_status_duration_ms(),
        }
    }
}

impl IbexConfig {
    pub fn load_from(dir: &Path) -> Self {
        load_json_config(dir, APP_CONFIG_FILE)
    }

    pub fn save_to(&self, dir: &Path) -> Result<PathBuf, String> {
        save_json_config(dir, APP_CONFIG_FILE, self)
    }

    /// Load from the default config directory.
    pub fn load() -> Self {
        Self::load_from(&config_dir())
    }

    pub fn config_path() -> PathBuf {
        config_dir().join(APP_CONFIG_FILE)
    }
}
