//! Purpose: Execute a `ProbePlan` and report it as human text or a JSON document.
//! Exports: `run_plan`, `OutputMode`, `RunOutcome`.
//! Role: Output layer shared by every CLI command; writes to any `io::Write`.
//! Invariants: Text output is flushed before each foreign call so native output stays in order.
//! Invariants: Exit codes come from `to_exit_code`; full or best-effort success is 0.
//! Invariants: Every failure path writes its diagnostic before returning.
use std::ffi::OsString;
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value, json};

use crate::core::call::{CallValue, Operation};
use crate::core::error::{Error, ErrorKind, to_exit_code};
use crate::core::module::{ModuleLoader, NativeModule};
use crate::core::probe::{CallOutcome, LoadedProbe, ProbeObserver, ProbeResult, Prober};
use crate::profiles::ProbePlan;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputMode {
    Text,
    Json { pretty: bool },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RunOutcome {
    pub exit_code: i32,
}

impl RunOutcome {
    pub fn ok() -> Self {
        Self { exit_code: 0 }
    }

    pub fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

pub fn run_plan<W: Write>(
    plan: &ProbePlan,
    loader: &dyn ModuleLoader,
    library_path: Option<OsString>,
    mode: OutputMode,
    out: &mut W,
) -> Result<RunOutcome, Error> {
    let prober = Prober::new(plan.search(), plan.policy).with_library_path(library_path);
    match mode {
        OutputMode::Text => run_text(plan, &prober, loader, out),
        OutputMode::Json { pretty } => run_json(plan, &prober, loader, pretty, out),
    }
}

fn outcome_code(result: &ProbeResult) -> RunOutcome {
    match result {
        ProbeResult::Failed(_) => RunOutcome::with_code(to_exit_code(ErrorKind::Resolution)),
        ProbeResult::Loaded(loaded) if loaded.stopped_early() => {
            RunOutcome::with_code(to_exit_code(ErrorKind::Invocation))
        }
        ProbeResult::Loaded(_) => RunOutcome::ok(),
    }
}

fn io_error(err: io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("failed to write probe output")
        .with_source(err)
}

struct TextObserver<'a, W: Write> {
    plan: &'a ProbePlan,
    out: &'a mut W,
    io_error: Option<Error>,
}

impl<W: Write> TextObserver<'_, W> {
    fn write_line(&mut self, line: &str) {
        if self.io_error.is_some() {
            return;
        }
        let result = writeln!(self.out, "{line}").and_then(|_| self.out.flush());
        if let Err(err) = result {
            self.io_error = Some(io_error(err));
        }
    }
}

impl<W: Write> ProbeObserver for TextObserver<'_, W> {
    fn loaded(&mut self, module: &dyn NativeModule) {
        let from = module
            .location()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<built-in>".to_string());
        self.write_line(&format!("Successfully imported {} from {from}", module.name()));
        if let Some(banner) = &self.plan.banner {
            self.write_line("");
            self.write_line(banner);
        }
    }

    fn finished(&mut self, outcome: &CallOutcome) {
        match &outcome.result {
            Ok(value) => {
                if let Some(line) = self.plan.render(&outcome.op, value) {
                    self.write_line(&line);
                }
            }
            Err(err) => self.write_line(&format!("Error: {}", err.summary())),
        }
    }
}

fn run_text<W: Write>(
    plan: &ProbePlan,
    prober: &Prober,
    loader: &dyn ModuleLoader,
    out: &mut W,
) -> Result<RunOutcome, Error> {
    for dir in plan.module_dirs.dirs() {
        writeln!(out, "Looking for extension in: {}", dir.display()).map_err(io_error)?;
    }
    for dir in plan.library_dirs.dirs() {
        writeln!(out, "Looking for libraries in: {}", dir.display()).map_err(io_error)?;
    }
    out.flush().map_err(io_error)?;

    let mut observer = TextObserver {
        plan,
        out: &mut *out,
        io_error: None,
    };
    let result = prober.probe_with(loader, &plan.module, &plan.calls, &mut observer);
    if let Some(err) = observer.io_error.take() {
        return Err(err);
    }

    let outcome = outcome_code(&result);
    match &result {
        ProbeResult::Failed(diagnostic) => {
            for line in diagnostic.lines() {
                writeln!(out, "{line}").map_err(io_error)?;
            }
        }
        ProbeResult::Loaded(loaded) => write_summary(plan, loaded, out).map_err(io_error)?,
    }
    Ok(outcome)
}

fn write_summary<W: Write>(plan: &ProbePlan, loaded: &LoadedProbe, out: &mut W) -> io::Result<()> {
    if loaded.stopped_early() {
        if loaded.skipped.is_empty() {
            return writeln!(out, "Stopped after a failed call");
        }
        let skipped = loaded
            .skipped
            .iter()
            .map(Operation::to_string)
            .collect::<Vec<_>>();
        return writeln!(
            out,
            "Stopped after a failed call; not attempted: {}",
            skipped.join(", ")
        );
    }
    let failed = loaded.failure_count();
    if failed > 0 {
        writeln!(out, "{failed} of {} calls failed", loaded.outcomes.len())?;
    }
    writeln!(out)?;
    writeln!(out, "{}", plan.success_message())
}

fn run_json<W: Write>(
    plan: &ProbePlan,
    prober: &Prober,
    loader: &dyn ModuleLoader,
    pretty: bool,
    out: &mut W,
) -> Result<RunOutcome, Error> {
    let result = prober.probe(loader, &plan.module, &plan.calls);
    let value = probe_json(plan, &result);
    let text = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("json encode failed")
            .with_source(err)
    })?;
    writeln!(out, "{text}").map_err(io_error)?;
    Ok(outcome_code(&result))
}

fn probe_time_now() -> Option<String> {
    use time::format_description::well_known::Rfc3339;
    let duration = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(duration.as_nanos() as i128).ok()?;
    ts.format(&Rfc3339).ok()
}

fn call_json(outcome: &CallOutcome) -> Value {
    let mut inner = Map::new();
    inner.insert("call".to_string(), json!(outcome.op.to_string()));
    match &outcome.result {
        Ok(value) => {
            inner.insert("ok".to_string(), json!(true));
            if *value != CallValue::Unit {
                inner.insert("value".to_string(), json!(value));
            }
        }
        Err(err) => {
            inner.insert("ok".to_string(), json!(false));
            inner.insert("error".to_string(), json!(err.summary()));
        }
    }
    Value::Object(inner)
}

fn probe_json(plan: &ProbePlan, result: &ProbeResult) -> Value {
    let mut inner = Map::new();
    inner.insert("module".to_string(), json!(plan.module));
    inner.insert("time".to_string(), json!(probe_time_now()));
    inner.insert(
        "search".to_string(),
        json!(
            plan.search()
                .dirs()
                .iter()
                .map(|dir| dir.display().to_string())
                .collect::<Vec<_>>()
        ),
    );
    match result {
        ProbeResult::Failed(diagnostic) => {
            inner.insert("status".to_string(), json!("unresolved"));
            inner.insert("diagnostic".to_string(), diagnostic.json());
        }
        ProbeResult::Loaded(loaded) => {
            let status = if loaded.stopped_early() {
                "stopped"
            } else if loaded.is_success() {
                "ok"
            } else {
                "partial"
            };
            inner.insert("status".to_string(), json!(status));
            inner.insert(
                "path".to_string(),
                json!(loaded.module.location().map(|path| path.display().to_string())),
            );
            inner.insert(
                "calls".to_string(),
                Value::Array(loaded.outcomes.iter().map(call_json).collect()),
            );
            inner.insert(
                "skipped".to_string(),
                json!(
                    loaded
                        .skipped
                        .iter()
                        .map(Operation::to_string)
                        .collect::<Vec<_>>()
                ),
            );
        }
    }

    let mut outer = Map::new();
    outer.insert("probe".to_string(), Value::Object(inner));
    Value::Object(outer)
}
