// Core modules: search paths, module loading, calls, probing, and error modeling.
pub mod call;
pub mod diagnostic;
pub mod error;
pub mod module;
pub mod probe;
pub mod search_path;
