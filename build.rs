//! Purpose: Compile the C test binding into shared libraries laid out like a project build tree.
//! Role: Cargo build-script; uses `cc` to locate the target C compiler and links with `-shared`.
//! Invariants: Output lives under `OUT_DIR/fixture-root`, exported as `BINDPROBE_FIXTURE_ROOT`.
//! Invariants: A missing or failing compiler only warns; native-call tests then skip.
//! Invariants: Windows targets are skipped (the layout uses Unix `lib<name>` file names).
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const FIXTURES: &[(&str, &str, &[&str])] = &[
    ("build/python", "cpp_ext", &[]),
    ("build/python", "_cpp_ext", &[]),
    ("build/lib/Release", "js_ext", &["-DBINDING_LOGGER_ONLY"]),
];

fn main() {
    println!("cargo:rerun-if-changed=tests/fixtures/binding.c");

    let target = env::var("TARGET").unwrap_or_default();
    if target.contains("windows") {
        return;
    }
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));
    let source = manifest_dir.join("tests").join("fixtures").join("binding.c");
    let root = out_dir.join("fixture-root");
    let extension = if target.contains("apple") { "dylib" } else { "so" };

    for (dir, name, defines) in FIXTURES {
        let dir = root.join(dir);
        let output = dir.join(format!("lib{name}.{extension}"));
        let built = fs::create_dir_all(&dir)
            .map_err(|err| format!("create {}: {err}", dir.display()))
            .and_then(|_| compile_shared(&source, &output, name, defines));
        if let Err(err) = built {
            println!("cargo:warning=native test binding not built: {err}");
            return;
        }
    }
    println!("cargo:rustc-env=BINDPROBE_FIXTURE_ROOT={}", root.display());
}

fn compile_shared(
    source: &Path,
    output: &Path,
    name: &str,
    defines: &[&str],
) -> Result<(), String> {
    let compiler = cc::Build::new()
        .cargo_metadata(false)
        .warnings(false)
        .try_get_compiler()
        .map_err(|err| err.to_string())?;
    let mut command = compiler.to_command();
    command
        .arg("-shared")
        .arg("-fPIC")
        .arg(format!("-DBINDING_NAME=\"{name}\""))
        .args(defines)
        .arg("-o")
        .arg(output)
        .arg(source);
    let status = command
        .status()
        .map_err(|err| format!("{}: {err}", compiler.path().display()))?;
    if !status.success() {
        return Err(format!("{} exited with {status}", compiler.path().display()));
    }
    Ok(())
}
