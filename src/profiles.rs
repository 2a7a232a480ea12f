//! Purpose: Built-in probes for the project's three native bindings, plus ad-hoc plans.
//! Exports: `Profile`, `ProbePlan`, `ResultStyle`, `LOGGER`, `ARITH`, `GREETING`, `find`.
//! Role: Data, not logic; `runner` executes a `ProbePlan` whichever way it was built.
//! Invariants: Candidate directories are relative to the probe root and kept in order.
//! Invariants: Profile call expressions always parse (covered by tests).
use std::path::Path;

use crate::core::call::{Arg, CallValue, Operation};
use crate::core::error::Error;
use crate::core::probe::ProbePolicy;
use crate::core::search_path::SearchPathSet;

/// How call results are printed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResultStyle {
    /// `5 + 7 = 12`, `Greeting: Hello, World!`, `call(..) -> value`.
    Labeled,
    /// The returned value alone.
    Raw,
}

#[derive(Debug)]
pub struct Profile {
    pub name: &'static str,
    pub about: &'static str,
    pub module: &'static str,
    /// Where the module file itself is expected.
    pub module_dirs: &'static [&'static str],
    /// Where its runtime dependencies are expected.
    pub library_dirs: &'static [&'static str],
    pub calls: &'static [&'static str],
    pub banner: Option<&'static str>,
    pub style: ResultStyle,
    pub policy: ProbePolicy,
}

pub const LOGGER: Profile = Profile {
    name: "logger",
    about: "Load the js_ext logging binding and log one message",
    module: "js_ext",
    module_dirs: &["build/lib/Release"],
    library_dirs: &[
        "build/bin/Release",
        "build/vcpkg_installed/x64-windows-custom/bin",
    ],
    calls: &["Logger.log(\"Hello from bindprobe!\")"],
    banner: Some("Testing js_ext bindings..."),
    style: ResultStyle::Labeled,
    policy: ProbePolicy {
        continue_on_invocation_error: false,
    },
};

pub const ARITH: Profile = Profile {
    name: "arith",
    about: "Load the cpp_ext binding and call add and get_greeting",
    module: "cpp_ext",
    module_dirs: &["build/python"],
    library_dirs: &[],
    calls: &["add(5, 7)", "get_greeting(\"World\")"],
    banner: None,
    style: ResultStyle::Labeled,
    policy: ProbePolicy {
        continue_on_invocation_error: true,
    },
};

pub const GREETING: Profile = Profile {
    name: "greeting",
    about: "Load the _cpp_ext binding and print its greeting",
    module: "_cpp_ext",
    module_dirs: &["build/python"],
    library_dirs: &[],
    calls: &["get_greeting(\"World\")"],
    banner: None,
    style: ResultStyle::Raw,
    policy: ProbePolicy {
        continue_on_invocation_error: false,
    },
};

pub fn all() -> [&'static Profile; 3] {
    [&LOGGER, &ARITH, &GREETING]
}

pub fn find(name: &str) -> Option<&'static Profile> {
    all().into_iter().find(|profile| profile.name == name)
}

impl Profile {
    pub fn plan(&self, root: &Path) -> Result<ProbePlan, Error> {
        let calls = self
            .calls
            .iter()
            .map(|expr| Operation::parse(expr))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ProbePlan {
            module: self.module.to_string(),
            module_dirs: SearchPathSet::under(root, self.module_dirs),
            library_dirs: SearchPathSet::under(root, self.library_dirs),
            calls,
            banner: self.banner.map(str::to_string),
            style: self.style,
            policy: self.policy,
        })
    }
}

/// Everything the runner needs for one probe.
#[derive(Clone, Debug)]
pub struct ProbePlan {
    pub module: String,
    pub module_dirs: SearchPathSet,
    pub library_dirs: SearchPathSet,
    pub calls: Vec<Operation>,
    pub banner: Option<String>,
    pub style: ResultStyle,
    pub policy: ProbePolicy,
}

impl ProbePlan {
    /// Ad-hoc plan from CLI input: every directory serves both purposes.
    pub fn custom(
        module: &str,
        dirs: SearchPathSet,
        calls: Vec<Operation>,
        policy: ProbePolicy,
    ) -> Self {
        Self {
            module: module.to_string(),
            module_dirs: dirs,
            library_dirs: SearchPathSet::default(),
            calls,
            banner: None,
            style: ResultStyle::Labeled,
            policy,
        }
    }

    pub fn with_policy(mut self, policy: ProbePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Module directories first, then library directories.
    pub fn search(&self) -> SearchPathSet {
        SearchPathSet::new(
            self.module_dirs
                .dirs()
                .iter()
                .chain(self.library_dirs.dirs())
                .cloned(),
        )
    }

    pub fn success_message(&self) -> String {
        format!("{} extension test completed successfully!", self.module)
    }

    /// Text line for a successful call, or `None` when there is nothing to show.
    pub fn render(&self, op: &Operation, value: &CallValue) -> Option<String> {
        if *value == CallValue::Unit {
            return None;
        }
        if self.style == ResultStyle::Raw {
            return Some(value.to_string());
        }
        let line = match (op.class(), op.name(), op.args()) {
            (None, "add", [Arg::Int(a), Arg::Int(b)]) => format!("{a} + {b} = {value}"),
            (None, "get_greeting", _) => format!("Greeting: {value}"),
            _ => format!("{op} -> {value}"),
        };
        Some(line)
    }
}
