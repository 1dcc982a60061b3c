//! Workspace automation tasks.
//!
//! Run as `cargo run -p xtask -- <task>`. Each task shells out to cargo
//! and stops at the first non-zero exit status.

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

type DynError = Box<dyn std::error::Error>;

fn main() -> ExitCode {
    let task = env::args().nth(1);
    let outcome = match task.as_deref() {
        Some("ci") => ci(),
        Some("fmt") => cargo(&["fmt", "--all"]),
        Some("fmt-check") => cargo(&["fmt", "--all", "--", "--check"]),
        Some("lint") => lint(),
        Some("test") => cargo(&["test", "--workspace"]),
        Some("doc") => cargo(&["doc", "--workspace", "--no-deps"]),
        Some("fuzz-check") => fuzz_check(),
        Some(other) => Err(format!("unknown task `{other}`").into()),
        None => {
            print_tasks();
            Ok(())
        }
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("xtask: {err}");
            ExitCode::FAILURE
        }
    }
}

fn print_tasks() {
    eprintln!("usage: cargo run -p xtask -- <task>");
    eprintln!();
    eprintln!("tasks:");
    eprintln!("  ci          fmt-check, lint, and test in sequence");
    eprintln!("  fmt         format the workspace");
    eprintln!("  fmt-check   fail on formatting diffs");
    eprintln!("  lint        clippy over all targets, warnings denied");
    eprintln!("  test        run every workspace test suite");
    eprintln!("  doc         build workspace docs without dependencies");
    eprintln!("  fuzz-check  type-check the fuzz targets");
}

fn ci() -> Result<(), DynError> {
    cargo(&["fmt", "--all", "--", "--check"])?;
    lint()?;
    cargo(&["test", "--workspace"])?;
    Ok(())
}

fn lint() -> Result<(), DynError> {
    cargo(&["clippy", "--workspace", "--", "-D", "warnings"])
}

/// The fuzz crate is excluded from the workspace, so it needs its own
/// invocation from inside `fuzz/`.
fn fuzz_check() -> Result<(), DynError> {
    let mut command = Command::new(cargo_bin());
    command.arg("check").current_dir(workspace_root().join("fuzz"));
    run("cargo check (fuzz)", &mut command)
}

fn cargo(args: &[&str]) -> Result<(), DynError> {
    let label = format!("cargo {}", args.join(" "));
    let mut command = Command::new(cargo_bin());
    command.args(args).current_dir(workspace_root());
    run(&label, &mut command)
}

fn run(label: &str, command: &mut Command) -> Result<(), DynError> {
    let status = command.status()?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("{label} exited with {status}").into())
    }
}

fn cargo_bin() -> String {
    env::var("CARGO").unwrap_or_else(|_| "cargo".to_owned())
}

fn workspace_root() -> PathBuf {
    // xtask/ sits one level below the workspace root.
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}
