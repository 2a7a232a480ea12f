//! Purpose: Define the public Rust API boundary for bindprobe.
//! Exports: Core types and operations needed by the CLI and embedders.
//! Role: Flat, additive-only re-export surface over `core`.
//! Invariants: Names exported here stay stable; `core` layout may move underneath.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::call::{Arg, CallValue, Operation};
pub use crate::core::diagnostic::{Diagnostic, DirListing, DirState, EnvSnapshot};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::module::{
    DylibLoader, DylibModule, ModuleLoader, NativeModule, module_file_name,
};
pub use crate::core::probe::{
    CallOutcome, LoadedProbe, ProbeObserver, ProbePolicy, ProbeResult, Prober,
};
pub use crate::core::search_path::{SearchPathSet, current_library_path, library_path_var};
