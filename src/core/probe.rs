//! Purpose: Run one probe: resolve a module, exercise its calls, collect outcomes.
//! Exports: `Prober`, `ProbePolicy`, `ProbeResult`, `LoadedProbe`, `CallOutcome`, `ProbeObserver`.
//! Role: The binding prober; pure with respect to process state.
//! Invariants: Resolution failure yields `Failed` and no call is attempted.
//! Invariants: Calls run in the given order; outcomes are recorded in that order.
//! Invariants: Under the stop policy nothing runs after the first failed call.
use std::ffi::OsString;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::core::call::{CallValue, Operation};
use crate::core::diagnostic::{Diagnostic, EnvSnapshot};
use crate::core::error::Error;
use crate::core::module::{ModuleLoader, NativeModule};
use crate::core::search_path::SearchPathSet;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ProbePolicy {
    pub continue_on_invocation_error: bool,
}

impl ProbePolicy {
    pub fn stop_on_error() -> Self {
        Self {
            continue_on_invocation_error: false,
        }
    }

    pub fn continue_on_error() -> Self {
        Self {
            continue_on_invocation_error: true,
        }
    }
}

#[derive(Debug)]
pub struct CallOutcome {
    pub op: Operation,
    pub result: Result<CallValue, Error>,
}

#[derive(Debug)]
pub struct LoadedProbe {
    pub module: Box<dyn NativeModule>,
    pub outcomes: Vec<CallOutcome>,
    /// Set when a call failed under the stop policy, even if it was the last one.
    pub stopped: bool,
    /// Calls that were never attempted because the stop policy tripped.
    pub skipped: Vec<Operation>,
}

impl LoadedProbe {
    pub fn failures(&self) -> impl Iterator<Item = (&Operation, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err().map(|err| (&outcome.op, err)))
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn is_success(&self) -> bool {
        !self.stopped && self.failure_count() == 0
    }

    pub fn stopped_early(&self) -> bool {
        self.stopped
    }
}

/// Hooks fired while a probe runs, before its result is assembled.
pub trait ProbeObserver {
    fn loaded(&mut self, _module: &dyn NativeModule) {}

    fn finished(&mut self, _outcome: &CallOutcome) {}
}

impl<F> ProbeObserver for F
where
    F: FnMut(&CallOutcome),
{
    fn finished(&mut self, outcome: &CallOutcome) {
        self(outcome)
    }
}

#[derive(Debug)]
pub enum ProbeResult {
    Loaded(LoadedProbe),
    Failed(Diagnostic),
}

#[derive(Clone, Debug)]
pub struct Prober {
    search: SearchPathSet,
    library_path: Option<OsString>,
    policy: ProbePolicy,
}

impl Prober {
    pub fn new(search: SearchPathSet, policy: ProbePolicy) -> Self {
        Self {
            search,
            library_path: None,
            policy,
        }
    }

    /// Current value of the library-search variable to extend.
    pub fn with_library_path(mut self, value: Option<OsString>) -> Self {
        self.library_path = value;
        self
    }

    pub fn effective_search(&self) -> Vec<PathBuf> {
        self.search.effective_dirs(self.library_path.as_deref())
    }

    /// Effective library-search value, for the binary to apply before loading.
    pub fn effective_library_path(&self) -> Result<OsString, Error> {
        self.search.augment(self.library_path.as_deref())
    }

    pub fn probe(&self, loader: &dyn ModuleLoader, module: &str, ops: &[Operation]) -> ProbeResult {
        self.probe_with(loader, module, ops, &mut |_: &CallOutcome| {})
    }

    /// Like `probe`, reporting the load and each outcome as they happen.
    pub fn probe_with(
        &self,
        loader: &dyn ModuleLoader,
        module: &str,
        ops: &[Operation],
        observer: &mut dyn ProbeObserver,
    ) -> ProbeResult {
        let search = self.effective_search();
        debug!(module, dirs = search.len(), "resolving module");

        let handle = match loader.load(module, &search) {
            Ok(handle) => handle,
            Err(err) => {
                debug!(module, error = %err, "resolution failed");
                let env = EnvSnapshot::capture(search, self.effective_library_path().ok());
                return ProbeResult::Failed(Diagnostic::capture(
                    module,
                    err,
                    self.search.dirs(),
                    env,
                ));
            }
        };

        debug!(module, path = ?handle.location(), "module loaded");
        observer.loaded(handle.as_ref());

        let mut outcomes = Vec::with_capacity(ops.len());
        let mut skipped = Vec::new();
        let mut stopped = false;
        for (idx, op) in ops.iter().enumerate() {
            let outcome = CallOutcome {
                op: op.clone(),
                result: handle.call(op),
            };
            observer.finished(&outcome);
            let failed = outcome.result.is_err();
            if let Err(err) = &outcome.result {
                warn!(module, call = %op, error = %err, "call failed");
            }
            outcomes.push(outcome);
            if failed && !self.policy.continue_on_invocation_error {
                stopped = true;
                skipped.extend(ops[idx + 1..].iter().cloned());
                break;
            }
        }

        ProbeResult::Loaded(LoadedProbe {
            module: handle,
            outcomes,
            stopped,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{CallOutcome, ProbePolicy, ProbeResult, Prober};
    use crate::core::call::{Arg, CallValue, Operation};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::module::{ModuleLoader, NativeModule};
    use crate::core::search_path::SearchPathSet;
    use std::cell::RefCell;
    use std::ffi::OsString;
    use std::path::{Path, PathBuf};

    #[derive(Debug)]
    struct Echo;

    impl NativeModule for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn location(&self) -> Option<&Path> {
            None
        }

        fn call(&self, op: &Operation) -> Result<CallValue, Error> {
            match op.name() {
                "fail" => Err(Error::new(ErrorKind::Invocation).with_message("boom")),
                _ => Ok(CallValue::Str(op.to_string())),
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Vec<PathBuf>>,
        available: bool,
    }

    impl ModuleLoader for Recorder {
        fn load(&self, name: &str, search: &[PathBuf]) -> Result<Box<dyn NativeModule>, Error> {
            *self.seen.borrow_mut() = search.to_vec();
            if self.available {
                Ok(Box::new(Echo))
            } else {
                Err(Error::new(ErrorKind::Resolution)
                    .with_message(format!("no module named `{name}`")))
            }
        }
    }

    fn ops() -> Vec<Operation> {
        vec![
            Operation::function("first", vec![]),
            Operation::function("fail", vec![]),
            Operation::function("third", vec![Arg::Int(3)]),
        ]
    }

    #[test]
    fn loader_sees_candidates_before_library_path() {
        let loader = Recorder::default();
        let current = std::env::join_paths(["/usr/lib"]).expect("join");
        let prober = Prober::new(SearchPathSet::new(["/a", "/b"]), ProbePolicy::stop_on_error())
            .with_library_path(Some(current));
        let _ = prober.probe(&loader, "m", &[]);
        assert_eq!(
            *loader.seen.borrow(),
            vec![
                PathBuf::from("/a"),
                PathBuf::from("/b"),
                PathBuf::from("/usr/lib")
            ]
        );
    }

    #[test]
    fn resolution_failure_returns_diagnostic_without_calls() {
        let loader = Recorder::default();
        let prober = Prober::new(
            SearchPathSet::new(["/nonexistent/x"]),
            ProbePolicy::continue_on_error(),
        );
        let mut calls = 0;
        let mut count = |_: &CallOutcome| calls += 1;
        let result = prober.probe_with(&loader, "m", &ops(), &mut count);
        assert_eq!(calls, 0);
        match result {
            ProbeResult::Failed(diag) => {
                assert_eq!(diag.module, "m");
                assert_eq!(diag.error.kind(), ErrorKind::Resolution);
                assert_eq!(diag.listings.len(), 1);
            }
            ProbeResult::Loaded(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn stop_policy_skips_remaining_calls() {
        let loader = Recorder {
            available: true,
            ..Recorder::default()
        };
        let prober = Prober::new(SearchPathSet::default(), ProbePolicy::stop_on_error());
        let ProbeResult::Loaded(loaded) = prober.probe(&loader, "m", &ops()) else {
            panic!("expected load");
        };
        assert_eq!(loaded.outcomes.len(), 2);
        assert_eq!(loaded.skipped, vec![Operation::function("third", vec![Arg::Int(3)])]);
        assert!(loaded.stopped_early());
        assert!(!loaded.is_success());
    }

    #[test]
    fn failure_on_the_last_call_still_stops() {
        let loader = Recorder {
            available: true,
            ..Recorder::default()
        };
        let prober = Prober::new(SearchPathSet::default(), ProbePolicy::stop_on_error());
        let only = [Operation::function("fail", Vec::new())];
        let ProbeResult::Loaded(loaded) = prober.probe(&loader, "m", &only) else {
            panic!("expected load");
        };
        assert_eq!(loaded.failure_count(), 1);
        assert!(loaded.skipped.is_empty());
        assert!(loaded.stopped_early());
        assert!(!loaded.is_success());
    }

    #[test]
    fn continue_policy_runs_every_call() {
        let loader = Recorder {
            available: true,
            ..Recorder::default()
        };
        let prober = Prober::new(SearchPathSet::default(), ProbePolicy::continue_on_error());
        let mut order = Vec::new();
        let result = prober.probe_with(&loader, "m", &ops(), &mut |outcome: &CallOutcome| {
            order.push(outcome.op.name().to_string())
        });
        let ProbeResult::Loaded(loaded) = result else {
            panic!("expected load");
        };
        assert_eq!(order, ["first", "fail", "third"]);
        assert_eq!(loaded.failure_count(), 1);
        assert!(!loaded.stopped_early());
        assert_eq!(
            loaded.outcomes[2].result.as_ref().ok(),
            Some(&CallValue::Str("third(3)".to_string()))
        );
    }

    #[test]
    fn effective_library_path_extends_current_value() {
        let prober = Prober::new(SearchPathSet::new(["/a"]), ProbePolicy::stop_on_error())
            .with_library_path(Some(OsString::from("/x")));
        let value = prober.effective_library_path().expect("augment");
        assert_eq!(value, std::env::join_paths(["/a", "/x"]).expect("join"));
    }
}
