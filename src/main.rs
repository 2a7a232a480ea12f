//! Purpose: `bindprobe` CLI entry point.
//! Role: Binary crate root; parses args, applies the library search path, runs probes.
//! Invariants: Probe reports go to stdout; logs and CLI errors go to stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: The library-search variable is written once, before any module is opened.
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use bindprobe::api::{Error, ErrorKind, ProbePolicy, to_exit_code};
use bindprobe::runner::{OutputMode, RunOutcome};

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, json)) => {
            emit_error(&err, json);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, bool)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        false,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `bindprobe --help`."),
                    false,
                ));
            }
        },
    };

    let json = cli.json;
    command_dispatch::dispatch_command(cli).map_err(|err| (err, json))
}

#[derive(Parser)]
#[command(
    name = "bindprobe",
    version,
    about = "Locate, load, and smoke-test precompiled native binding modules",
    long_about = None,
    after_help = r#"EXAMPLES
  $ bindprobe arith                       # build/python/libcpp_ext.* : add + get_greeting
  $ bindprobe --root ../proj logger       # js_ext Logger under ../proj/build
  $ bindprobe probe --module cpp_ext --dir build/python --call 'add(5, 7)'
  $ bindprobe --json greeting

EXIT STATUS
  0 success, 1 module not resolved, 2 usage, 3 stopped on a failed call"#,
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    #[arg(
        long,
        global = true,
        env = "BINDPROBE_ROOT",
        help = "Directory the candidate paths are relative to (default: current directory)",
        value_hint = ValueHint::DirPath
    )]
    pub(crate) root: Option<PathBuf>,
    #[arg(long, global = true, help = "Emit one JSON document instead of text")]
    pub(crate) json: bool,
    #[arg(
        long,
        global = true,
        conflicts_with = "stop_on_error",
        help = "Keep calling after a call fails"
    )]
    pub(crate) continue_on_error: bool,
    #[arg(long, global = true, help = "Stop at the first failed call")]
    pub(crate) stop_on_error: bool,
    #[command(subcommand)]
    pub(crate) command: Command,
}

impl Cli {
    pub(crate) fn policy_override(&self) -> Option<ProbePolicy> {
        if self.continue_on_error {
            Some(ProbePolicy::continue_on_error())
        } else if self.stop_on_error {
            Some(ProbePolicy::stop_on_error())
        } else {
            None
        }
    }

    pub(crate) fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json {
                pretty: io::stdout().is_terminal(),
            }
        } else {
            OutputMode::Text
        }
    }
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Load the js_ext logging binding and log one message
    Logger,
    /// Load the cpp_ext binding and call add and get_greeting
    Arith,
    /// Load the _cpp_ext binding and print its greeting
    Greeting,
    /// Probe any module with explicit directories and calls
    Probe(ProbeArgs),
    /// List the built-in probes
    List,
    /// Generate shell completions
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub(crate) struct ProbeArgs {
    #[arg(long, help = "Module name, without platform prefix or suffix")]
    pub(crate) module: String,
    #[arg(
        long = "dir",
        required = true,
        help = "Candidate directory (repeatable; earlier wins)",
        value_hint = ValueHint::DirPath
    )]
    pub(crate) dirs: Vec<PathBuf>,
    #[arg(long = "call", help = "Call expression, e.g. 'add(5, 7)' (repeatable)")]
    pub(crate) calls: Vec<String>,
}

pub(crate) fn cli_command() -> clap::Command {
    Cli::command()
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_message(err: &Error) -> String {
    match err.message() {
        Some(message) => message.to_string(),
        None => format!("{} error", err.kind().label()),
    }
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn emit_error(err: &Error, json: bool) {
    if !json {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, clap_error_summary, error_json, error_text};
    use bindprobe::api::{Error, ErrorKind, ProbePolicy};
    use clap::Parser;
    use std::io;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from(["bindprobe", "arith", "--json", "--stop-on-error"])
            .expect("parse");
        assert!(cli.json);
        assert!(matches!(cli.command, Command::Arith));
        assert_eq!(cli.policy_override(), Some(ProbePolicy::stop_on_error()));
    }

    #[test]
    fn policy_flags_conflict() {
        let err = Cli::try_parse_from([
            "bindprobe",
            "--continue-on-error",
            "--stop-on-error",
            "logger",
        ])
        .err()
        .expect("conflict");
        assert!(!clap_error_summary(&err).is_empty());
    }

    #[test]
    fn probe_requires_a_dir() {
        assert!(Cli::try_parse_from(["bindprobe", "probe", "--module", "m"]).is_err());
        let cli = Cli::try_parse_from([
            "bindprobe", "probe", "--module", "m", "--dir", "a", "--dir", "b", "--call", "f()",
        ])
        .expect("parse");
        let Command::Probe(args) = cli.command else {
            panic!("expected probe");
        };
        assert_eq!(args.dirs.len(), 2);
        assert_eq!(args.calls, vec!["f()".to_string()]);
    }

    #[test]
    fn error_rendering_includes_hint_and_cause() {
        let err = Error::new(ErrorKind::Io)
            .with_message("failed to write probe output")
            .with_hint("check stdout")
            .with_source(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        let text = error_text(&err);
        assert!(text.starts_with("error: failed to write probe output"));
        assert!(text.contains("hint: check stdout"));
        assert!(text.contains("caused by: pipe closed"));

        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "Io");
        assert_eq!(value["error"]["causes"][0], "pipe closed");
    }
}
