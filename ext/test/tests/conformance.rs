//! Conformance tests that run YAML fixtures against linre
//!
//! Run with: cargo test -p linre-test --test conformance

#![cfg(feature = "fixtures")]

use linre_test::fixture::Fixture;
use std::fs;
use std::path::{Path, PathBuf};

/// The `fixtures/` directory at the workspace root.
fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent() // ext
        .and_then(Path::parent) // workspace root
        .expect("could not find the workspace root")
        .join("fixtures")
}

/// Load and run all fixtures in a directory
fn run_fixtures_in_dir(dir: &Path) {
    let _ = env_logger::builder().is_test(true).try_init();
    assert!(
        dir.exists(),
        "Fixtures directory does not exist: {}",
        dir.display()
    );

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| entry.expect("dir entry").path())
        .filter(|path| path.extension().is_some_and(|e| e == "yaml" || e == "yml"))
        .collect();
    paths.sort();
    assert!(!paths.is_empty(), "no fixtures in {}", dir.display());

    for path in paths {
        log::info!("running fixture file {}", path.display());
        let yaml = fs::read_to_string(&path).expect("read yaml");

        // Parse potentially multiple fixtures (separated by ---)
        let fixtures = Fixture::from_yaml_multi(&yaml).unwrap_or_else(|e| {
            panic!("Failed to parse {}: {}", path.display(), e);
        });

        for fixture in fixtures {
            log::debug!("  {}: {}", fixture.name, fixture.description);
            fixture.run_and_assert();
        }
    }
}

#[test]
fn test_search() {
    run_fixtures_in_dir(&fixtures_dir().join("01_search"));
}

#[test]
fn test_findall() {
    run_fixtures_in_dir(&fixtures_dir().join("02_findall"));
}

#[test]
fn test_sub() {
    run_fixtures_in_dir(&fixtures_dir().join("03_sub"));
}

#[test]
fn test_compile() {
    run_fixtures_in_dir(&fixtures_dir().join("04_compile"));
}
