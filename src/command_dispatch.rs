//! Purpose: Hold top-level CLI command dispatch for `bindprobe`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every probe command builds a `ProbePlan` and goes through `runner::run_plan`.
//! Invariants: The augmented library path is applied exactly once per process.

use super::*;

use std::env;
use std::ffi::OsString;
use std::path::Path;

use bindprobe::api::{
    DylibLoader, Operation, SearchPathSet, current_library_path, library_path_var,
};
use bindprobe::profiles::{self, ProbePlan, Profile};
use bindprobe::runner::run_plan;

pub(super) fn dispatch_command(cli: Cli) -> Result<RunOutcome, Error> {
    let mode = cli.output_mode();
    let policy = cli.policy_override();
    let root = resolve_root(cli.root.as_deref())?;

    match cli.command {
        Command::Logger => run_profile(&profiles::LOGGER, &root, policy, mode),
        Command::Arith => run_profile(&profiles::ARITH, &root, policy, mode),
        Command::Greeting => run_profile(&profiles::GREETING, &root, policy, mode),
        Command::Probe(args) => {
            let calls = args
                .calls
                .iter()
                .map(|expr| Operation::parse(expr))
                .collect::<Result<Vec<_>, _>>()?;
            let dirs = SearchPathSet::new(args.dirs.iter().map(|dir| root.join(dir)));
            let plan = ProbePlan::custom(
                &args.module,
                dirs,
                calls,
                policy.unwrap_or_else(ProbePolicy::stop_on_error),
            );
            execute(&plan, mode)
        }
        Command::List => {
            emit_profiles(mode);
            Ok(RunOutcome::ok())
        }
        Command::Completion { shell } => {
            let mut cmd = cli_command();
            clap_complete::aot::generate(shell, &mut cmd, "bindprobe", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
    }
}

fn resolve_root(root: Option<&Path>) -> Result<PathBuf, Error> {
    match root {
        Some(root) => Ok(root.to_path_buf()),
        None => env::current_dir().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read current directory")
                .with_hint("Pass --root explicitly.")
                .with_source(err)
        }),
    }
}

fn run_profile(
    profile: &Profile,
    root: &Path,
    policy: Option<ProbePolicy>,
    mode: OutputMode,
) -> Result<RunOutcome, Error> {
    let mut plan = profile.plan(root)?;
    if let Some(policy) = policy {
        plan = plan.with_policy(policy);
    }
    execute(&plan, mode)
}

fn execute(plan: &ProbePlan, mode: OutputMode) -> Result<RunOutcome, Error> {
    let current = current_library_path();
    apply_library_path(plan, current.clone())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_plan(plan, &DylibLoader::new(), current, mode, &mut out)
}

/// Export the augmented library-search variable for this process.
///
/// Windows consults `PATH` on every load, so the module's own dependencies
/// resolve from the candidate directories there. glibc and dyld read their
/// variables once at startup; on those platforms the write only reaches child
/// processes and dependencies must be found through rpath or an inherited value.
fn apply_library_path(plan: &ProbePlan, current: Option<OsString>) -> Result<(), Error> {
    let value = plan.search().augment(current.as_deref())?;
    tracing::debug!(var = library_path_var(), value = ?value, "library search path");
    // SAFETY: called from the main thread before any module is loaded; nothing else
    // in the process reads or writes the environment concurrently.
    unsafe { env::set_var(library_path_var(), &value) };
    Ok(())
}

fn emit_profiles(mode: OutputMode) {
    let all = profiles::all();
    if let OutputMode::Json { pretty } = mode {
        let values = all
            .iter()
            .map(|profile| {
                json!({
                    "name": profile.name,
                    "module": profile.module,
                    "about": profile.about,
                    "dirs": profile
                        .module_dirs
                        .iter()
                        .chain(profile.library_dirs)
                        .collect::<Vec<_>>(),
                    "calls": profile.calls,
                    "continue_on_error": profile.policy.continue_on_invocation_error,
                })
            })
            .collect::<Vec<_>>();
        let value = json!({ "profiles": values });
        let text = if pretty {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        }
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
        println!("{text}");
        return;
    }

    for profile in all {
        println!("{:<10} {:<10} {}", profile.name, profile.module, profile.about);
        for call in profile.calls {
            println!("{:<21} {call}", "");
        }
    }
}
