//! Start-command and port inference from a project's `package.json`.
//!
//! The manifest is read as a generic JSON mapping. Only `scripts.dev` and
//! `devDependencies.vite` influence the result; everything else is ignored.
//! The port is a guess: nothing here ever observes the port the spawned
//! server actually binds.

use serde::Serialize;
use serde_json::Value;
use std::path::Path;

pub(crate) const MANIFEST_FILE: &str = "package.json";

pub(crate) const DEFAULT_COMMAND: &str = "npm start";
pub(crate) const DEV_COMMAND: &str = "npm run dev";
pub(crate) const DEFAULT_PORT: u16 = 3000;
pub(crate) const VITE_PORT: u16 = 5173;

/// How to start a project's dev server and where it is expected to listen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSpec {
    pub command: String,
    pub predicted_port: u16,
    pub predicted_url: String,
}

impl StartSpec {
    fn new(command: &str, predicted_port: u16) -> Self {
        Self {
            command: command.to_string(),
            predicted_port,
            predicted_url: format!("http://localhost:{predicted_port}"),
        }
    }
}

/// JS-style truthiness, which is how the manifest fields have always been read.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Infer the start command and port from an already-parsed manifest.
/// `None` (no manifest, or one that failed to parse) yields the defaults.
pub fn infer_start_spec(manifest: Option<&Value>) -> StartSpec {
    let Some(manifest) = manifest else {
        return StartSpec::new(DEFAULT_COMMAND, DEFAULT_PORT);
    };

    let dev_script = manifest
        .get("scripts")
        .and_then(|s| s.get("dev"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());

    let Some(dev_script) = dev_script else {
        return StartSpec::new(DEFAULT_COMMAND, DEFAULT_PORT);
    };

    let vite_dev_dependency = manifest
        .get("devDependencies")
        .and_then(|d| d.get("vite"))
        .is_some_and(is_truthy);

    let port = if dev_script.contains("vite") || vite_dev_dependency {
        VITE_PORT
    } else {
        DEFAULT_PORT
    };

    StartSpec::new(DEV_COMMAND, port)
}

/// Read `<root>/package.json`. A missing file is `None`; read and parse
/// failures are logged and also `None`, so callers fall back to defaults.
pub(crate) fn read_manifest(root: &Path) -> Option<Value> {
    let path = root.join(MANIFEST_FILE);
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "No manifest, using default start command");
        return None;
    }
    let content = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Could not read manifest: {e}");
            return None;
        }
    };
    match serde_json::from_str::<Value>(&content) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(path = %path.display(), "Ignoring unparsable manifest: {e}");
            None
        }
    }
}

/// Inspect a project root and decide how its dev server should be started.
pub fn detect_start_spec(root: &Path) -> StartSpec {
    let manifest = read_manifest(root);
    let spec = infer_start_spec(manifest.as_ref());
    tracing::debug!(
        root = %root.display(),
        command = %spec.command,
        port = spec.predicted_port,
        "Inferred start spec"
    );
    spec
}
