//! Project metadata read from `package.json`.
//!
//! Only five fields matter: they become the root variables of the HTML
//! templater (`@@name`, `@@description`, `@@version`, `@@repository`,
//! `@@license`). A missing file or field yields an empty string so templates
//! still render.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectMeta {
    pub name: String,
    pub description: String,
    pub version: String,
    pub repository: String,
    pub license: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct PackageJson {
    name: Option<String>,
    description: Option<String>,
    version: Option<String>,
    repository: Option<Value>,
    license: Option<Value>,
}

impl ProjectMeta {
    /// Read metadata from a `package.json`; unreadable files log a warning and
    /// produce empty metadata.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => {
                tracing::debug!(path = %path.display(), "no package.json, using empty metadata");
                return Self::default();
            }
        };
        match serde_json::from_str::<PackageJson>(&content) {
            Ok(pkg) => Self::from_package(pkg),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed package.json");
                Self::default()
            }
        }
    }

    fn from_package(pkg: PackageJson) -> Self {
        Self {
            name: pkg.name.unwrap_or_default(),
            description: pkg.description.unwrap_or_default(),
            version: pkg.version.unwrap_or_default(),
            repository: pkg.repository.as_ref().map(url_of).unwrap_or_default(),
            license: pkg.license.as_ref().map(url_of).unwrap_or_default(),
        }
    }

    /// Root context for the HTML templater.
    pub fn template_context(&self) -> Map<String, Value> {
        let mut context = Map::new();
        context.insert("name".into(), Value::String(self.name.clone()));
        context.insert("description".into(), Value::String(self.description.clone()));
        context.insert("version".into(), Value::String(self.version.clone()));
        context.insert("repository".into(), Value::String(self.repository.clone()));
        context.insert("license".into(), Value::String(self.license.clone()));
        context
    }
}

/// `"repository": "github:x/y"` or `{"type": "git", "url": "..."}`; the legacy
/// `{"type": "MIT"}` license object form is handled the same way.
fn url_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("url")
            .or_else(|| obj.get("type"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}
