//! Source path resolution against the working directory.
//!
//! Kept in its own test binary: the test changes the process working directory,
//! which would race the tests in `import_test.rs` if they shared a process.

use ldbc_loader::error::ImportError;
use ldbc_loader::source::{self, LoadOptions};
use std::env;
use std::fs;
use tempfile::TempDir;

#[test]
fn falls_back_to_working_directory() {
    let cwd = TempDir::new().unwrap();
    let elsewhere = TempDir::new().unwrap();
    fs::write(cwd.path().join("tag_0_0.csv"), "id|name\n10|Rust\n").unwrap();

    let original = env::current_dir().unwrap();
    env::set_current_dir(cwd.path()).unwrap();

    let configured = elsewhere.path().join("test/static/tag_0_0.csv");
    let resolved = source::resolve_path(&configured);
    let loaded = source::load(&configured, &LoadOptions::default());
    let missing = source::resolve_path(&elsewhere.path().join("test/static/post_0_0.csv"));

    env::set_current_dir(&original).unwrap();

    let resolved = resolved.unwrap();
    assert_eq!(resolved.file_name().unwrap(), "tag_0_0.csv");
    assert_eq!(
        resolved.canonicalize().unwrap(),
        cwd.path().join("tag_0_0.csv").canonicalize().unwrap()
    );

    let set = loaded.unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(set.columns, vec!["id", "name"]);

    match missing.unwrap_err() {
        ImportError::FileNotFound { path, fallback } => {
            assert!(path.ends_with("test/static/post_0_0.csv"));
            assert_eq!(fallback.file_name().unwrap(), "post_0_0.csv");
        }
        other => panic!("expected file not found, got {other}"),
    }
}
