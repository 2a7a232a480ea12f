//! Purpose: Model the ordered directory list used to resolve native modules.
//! Exports: `SearchPathSet`, `library_path_var`, `current_library_path`.
//! Role: Replace ambient search-path mutation with an explicit value.
//! Invariants: Earlier entries win; duplicates collapse to their first occurrence.
//! Invariants: Augmentation returns a new value and never writes process state.
//! Invariants: Missing directories are kept; resolution reports them later.
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchPathSet {
    dirs: Vec<PathBuf>,
}

impl SearchPathSet {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut unique: Vec<PathBuf> = Vec::new();
        for dir in dirs {
            let dir = dir.into();
            if !unique.contains(&dir) {
                unique.push(dir);
            }
        }
        Self { dirs: unique }
    }

    /// Candidate directories given relative to a probe root.
    pub fn under<S: AsRef<Path>>(root: &Path, relative: &[S]) -> Self {
        Self::new(relative.iter().map(|rel| root.join(rel)))
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// New candidates first, then the entries of `current`.
    ///
    /// A candidate already listed in `current` keeps its existing position, so
    /// repeated augmentation never reorders what an earlier pass inserted.
    pub fn effective_dirs(&self, current: Option<&OsStr>) -> Vec<PathBuf> {
        let existing = SearchPathSet::new(
            current
                .map(|value| env::split_paths(value).collect::<Vec<_>>())
                .unwrap_or_default()
                .into_iter()
                .filter(|dir| !dir.as_os_str().is_empty()),
        );
        self.dirs
            .iter()
            .filter(|dir| !existing.dirs.contains(*dir))
            .chain(existing.dirs.iter())
            .cloned()
            .collect()
    }

    /// Effective value for the library-search variable, extended rather than replaced.
    pub fn augment(&self, current: Option<&OsStr>) -> Result<OsString, Error> {
        env::join_paths(self.effective_dirs(current)).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("candidate directory contains the path-list separator")
                .with_source(err)
        })
    }
}

#[cfg(target_os = "windows")]
pub fn library_path_var() -> &'static str {
    "PATH"
}

#[cfg(target_os = "macos")]
pub fn library_path_var() -> &'static str {
    "DYLD_LIBRARY_PATH"
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub fn library_path_var() -> &'static str {
    "LD_LIBRARY_PATH"
}

pub fn current_library_path() -> Option<OsString> {
    env::var_os(library_path_var())
}
