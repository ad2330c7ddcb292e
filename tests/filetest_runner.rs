//! Runs every `.sfl` script under `tests/filetests` through the check harness.

use std::fs;
use std::path::{Path, PathBuf};

use scopeflow::script::check::{TestRunner, TestSpec};

/// Discovers all .sfl files in a directory recursively
fn discover_sfl_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(discover_sfl_files(&path));
            } else if path.extension().and_then(|s| s.to_str()) == Some("sfl") {
                files.push(path);
            }
        }
    }

    files.sort();
    files
}

fn run_sfl_file(path: &Path) -> Result<(), String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let spec = TestSpec::parse(&content);
    TestRunner::new(false).run_test(&spec)
}

#[test]
fn run_all_filetests() {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/filetests");
    let files = discover_sfl_files(&dir);
    assert!(!files.is_empty(), "no filetests found in {}", dir.display());

    let mut failures = Vec::new();
    for file in &files {
        if let Err(e) = run_sfl_file(file) {
            failures.push(format!("{}: {}", file.display(), e));
        }
    }

    if !failures.is_empty() {
        panic!(
            "{} of {} filetests failed:\n{}",
            failures.len(),
            files.len(),
            failures.join("\n\n")
        );
    }
}
