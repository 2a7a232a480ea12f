//! Purpose: Library crate behind the `bindprobe` CLI and its tests.
//! Exports: `core` (search paths, loading, probing, errors), `api`, `profiles`, `runner`.
//! Role: Keeps probing logic testable without touching process-global state.
//! Invariants: Only `main` writes process environment; library code takes explicit inputs.
pub mod api;
pub mod core;
pub mod profiles;
pub mod runner;
