//! Purpose: Exercise the real C calling paths against the binding compiled by build.rs.
//! Exports: Integration tests only.
//! Role: Cover `DylibModule::call` for every known signature plus its failure modes.
//! Invariants: Tests skip (with a note on stderr) when no C compiler was available at build time.
#![cfg(unix)]

use std::path::{Path, PathBuf};

use bindprobe::api::{
    Arg, CallValue, DylibLoader, ErrorKind, ModuleLoader, NativeModule, Operation, ProbePolicy,
    module_file_name,
};
use bindprobe::profiles::{ARITH, GREETING, LOGGER};
use bindprobe::runner::{OutputMode, run_plan};
use serde_json::Value;

fn fixture_root() -> Option<PathBuf> {
    let root = option_env!("BINDPROBE_FIXTURE_ROOT").map(PathBuf::from);
    if root.is_none() {
        eprintln!("native test binding was not built; skipping");
    }
    root
}

fn load(root: &Path, dir: &str, name: &str) -> Box<dyn NativeModule> {
    DylibLoader::new()
        .load(name, &[root.join(dir)])
        .expect("load test binding")
}

fn run_text(plan: &bindprobe::profiles::ProbePlan) -> (i32, String) {
    let mut out = Vec::new();
    let outcome = run_plan(plan, &DylibLoader::new(), None, OutputMode::Text, &mut out)
        .expect("run");
    (outcome.exit_code, String::from_utf8(out).expect("utf8"))
}

#[test]
fn arith_profile_calls_into_c() {
    let Some(root) = fixture_root() else { return };
    let plan = ARITH.plan(&root).expect("plan");
    let (code, text) = run_text(&plan);

    assert_eq!(code, 0, "{text}");
    let library = root.join("build").join("python").join(module_file_name("cpp_ext"));
    assert!(text.contains(&format!("Successfully imported cpp_ext from {}", library.display())));
    assert!(text.lines().any(|line| line == "5 + 7 = 12"));
    assert!(text.lines().any(|line| line == "Greeting: Hello, World!"));
    assert!(text.ends_with("cpp_ext extension test completed successfully!\n"));
}

#[test]
fn greeting_profile_prints_the_c_string() {
    let Some(root) = fixture_root() else { return };
    let plan = GREETING.plan(&root).expect("plan");
    let (code, text) = run_text(&plan);

    assert_eq!(code, 0, "{text}");
    assert!(text.lines().any(|line| line == "Hello, World!"));
}

#[test]
fn logger_profile_runs_the_instance_lifecycle() {
    let Some(root) = fixture_root() else { return };
    let plan = LOGGER.plan(&root).expect("plan");
    let mut out = Vec::new();
    let outcome = run_plan(
        &plan,
        &DylibLoader::new(),
        None,
        OutputMode::Json { pretty: false },
        &mut out,
    )
    .expect("run");

    assert_eq!(outcome.exit_code, 0);
    let value: Value = serde_json::from_slice(&out).expect("json");
    assert_eq!(value["probe"]["status"], "ok");
    assert_eq!(value["probe"]["calls"][0]["call"], "Logger.log(\"Hello from bindprobe!\")");
    assert_eq!(value["probe"]["calls"][0]["ok"], true);
}

#[test]
fn owned_strings_are_released_through_free_string() {
    let Some(root) = fixture_root() else { return };
    let module = load(&root, "build/python", "cpp_ext");
    let path = module.location().expect("path").to_path_buf();
    let counter = unsafe { libloading::Library::new(&path) }.expect("reopen");
    let freed = unsafe {
        counter
            .get::<unsafe extern "C" fn() -> libc::c_int>(b"binding_freed_strings")
            .expect("counter symbol")
    };

    let before = unsafe { freed() };
    let op = Operation::function("get_greeting", vec![Arg::Str("Ada".to_string())]);
    for _ in 0..2 {
        let value = module.call(&op).expect("call");
        assert_eq!(value, CallValue::Str("Hello, Ada!".to_string()));
    }
    assert!(unsafe { freed() } >= before + 2);
}

#[test]
fn null_string_result_is_an_invocation_error() {
    let Some(root) = fixture_root() else { return };
    let module = load(&root, "build/python", "cpp_ext");
    let err = module
        .call(&Operation::parse("get_greeting(\"\")").expect("op"))
        .expect_err("null result");

    assert_eq!(err.kind(), ErrorKind::Invocation);
    assert!(err.summary().contains("returned a null string"));
}

#[test]
fn missing_export_is_an_invocation_error() {
    let Some(root) = fixture_root() else { return };
    let module = load(&root, "build/lib/Release", "js_ext");

    let err = module.call(&Operation::parse("add(5, 7)").expect("op")).expect_err("no add");
    assert_eq!(err.kind(), ErrorKind::Invocation);
    assert!(err.summary().contains("module has no attribute `add`"));
    assert_eq!(err.path(), module.location());

    let err = module
        .call(&Operation::parse("Widget.log(\"x\")").expect("op"))
        .expect_err("no class");
    assert_eq!(err.kind(), ErrorKind::Invocation);
    assert!(err.summary().contains("`Widget_new`"));
}

#[test]
fn stop_policy_on_a_failing_only_call_exits_non_zero() {
    let Some(root) = fixture_root() else { return };
    let mut plan = GREETING
        .plan(&root)
        .expect("plan")
        .with_policy(ProbePolicy::stop_on_error());
    plan.calls = vec![Operation::parse("get_greeting(\"\")").expect("op")];
    let (code, text) = run_text(&plan);

    assert_eq!(code, 3, "{text}");
    assert!(text.contains("returned a null string"));
    assert!(text.contains("Stopped after a failed call"));
    assert!(!text.contains("completed successfully"));
}
