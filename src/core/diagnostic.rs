//! Purpose: Capture what a failed module resolution needs to be debugged.
//! Exports: `EnvSnapshot`, `DirListing`, `DirState`, `Diagnostic`.
//! Role: Structured payload of `ProbeResult::Failed`, rendered as text or JSON.
//! Invariants: Every candidate directory gets exactly one listing line, in candidate order.
//! Invariants: Listings are sorted by file name so output is stable.
//! Invariants: Capturing never fails; unreadable directories are recorded, not raised.
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};

use crate::core::error::Error;
use crate::core::search_path::library_path_var;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvSnapshot {
    pub executable: Option<PathBuf>,
    pub version: String,
    pub platform: String,
    pub module_search: Vec<PathBuf>,
    pub library_var: String,
    pub library_path: Option<OsString>,
}

impl EnvSnapshot {
    pub fn capture(module_search: Vec<PathBuf>, library_path: Option<OsString>) -> Self {
        Self {
            executable: env::current_exe().ok(),
            version: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            platform: format!("{} {}", env::consts::OS, env::consts::ARCH),
            module_search,
            library_var: library_path_var().to_string(),
            library_path,
        }
    }

    fn module_search_display(&self) -> String {
        let items = self
            .module_search
            .iter()
            .map(|dir| format!("{:?}", dir.display().to_string()))
            .collect::<Vec<_>>();
        format!("[{}]", items.join(", "))
    }

    fn library_path_display(&self) -> String {
        self.library_path
            .as_ref()
            .map(|value| value.to_string_lossy().into_owned())
            .unwrap_or_else(|| "<unset>".to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirState {
    Missing,
    Listed(Vec<String>),
    Unreadable(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirListing {
    pub dir: PathBuf,
    pub state: DirState,
}

impl DirListing {
    pub fn capture(dir: &Path) -> Self {
        let state = if !dir.is_dir() {
            DirState::Missing
        } else {
            match fs::read_dir(dir) {
                Ok(entries) => {
                    let mut names = entries
                        .filter_map(|entry| entry.ok())
                        .map(|entry| entry.file_name().to_string_lossy().into_owned())
                        .collect::<Vec<_>>();
                    names.sort();
                    DirState::Listed(names)
                }
                Err(err) => DirState::Unreadable(err.to_string()),
            }
        };
        Self {
            dir: dir.to_path_buf(),
            state,
        }
    }

    pub fn line(&self) -> String {
        let dir = self.dir.display();
        match &self.state {
            DirState::Missing => format!("{dir}: does not exist"),
            DirState::Listed(names) => format!("{dir}: [{}]", names.join(", ")),
            DirState::Unreadable(reason) => format!("{dir}: unreadable ({reason})"),
        }
    }

    fn json(&self) -> Value {
        let mut inner = Map::new();
        inner.insert("dir".to_string(), json!(self.dir.display().to_string()));
        match &self.state {
            DirState::Missing => {
                inner.insert("exists".to_string(), json!(false));
            }
            DirState::Listed(names) => {
                inner.insert("exists".to_string(), json!(true));
                inner.insert("files".to_string(), json!(names));
            }
            DirState::Unreadable(reason) => {
                inner.insert("exists".to_string(), json!(true));
                inner.insert("error".to_string(), json!(reason));
            }
        }
        Value::Object(inner)
    }
}

#[derive(Debug)]
pub struct Diagnostic {
    pub module: String,
    pub error: Error,
    pub env: EnvSnapshot,
    pub listings: Vec<DirListing>,
}

impl Diagnostic {
    pub fn capture(module: &str, error: Error, candidates: &[PathBuf], env: EnvSnapshot) -> Self {
        let listings = candidates
            .iter()
            .map(|dir| DirListing::capture(dir))
            .collect();
        Self {
            module: module.to_string(),
            error,
            env,
            listings,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Error importing {}: {}",
            self.module,
            self.error.summary()
        )];
        if let Some(hint) = self.error.hint() {
            lines.push(format!("Hint: {hint}"));
        }
        let executable = self
            .env
            .executable
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        lines.push(format!("Executable: {executable}"));
        lines.push(format!("Version: {} ({})", self.env.version, self.env.platform));
        lines.push(format!(
            "Module search path: {}",
            self.env.module_search_display()
        ));
        lines.push(format!(
            "Library search path ({}): {}",
            self.env.library_var,
            self.env.library_path_display()
        ));
        lines.push(String::new());
        lines.push("Candidate directories:".to_string());
        lines.extend(self.listings.iter().map(|listing| format!("  {}", listing.line())));
        lines
    }

    pub fn json(&self) -> Value {
        let mut error = Map::new();
        error.insert("kind".to_string(), json!(format!("{:?}", self.error.kind())));
        error.insert("message".to_string(), json!(self.error.summary()));
        if let Some(hint) = self.error.hint() {
            error.insert("hint".to_string(), json!(hint));
        }
        if let Some(path) = self.error.path() {
            error.insert("path".to_string(), json!(path.display().to_string()));
        }

        let env = json!({
            "executable": self.env.executable.as_ref().map(|p| p.display().to_string()),
            "version": self.env.version,
            "platform": self.env.platform,
            "module_search": self
                .env
                .module_search
                .iter()
                .map(|dir| dir.display().to_string())
                .collect::<Vec<_>>(),
            "library_var": self.env.library_var,
            "library_path": self
                .env
                .library_path
                .as_ref()
                .map(|v| v.to_string_lossy().into_owned()),
        });

        json!({
            "module": self.module,
            "error": Value::Object(error),
            "env": env,
            "candidates": self.listings.iter().map(DirListing::json).collect::<Vec<_>>(),
        })
    }
}
