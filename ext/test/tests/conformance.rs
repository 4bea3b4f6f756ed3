//! Conformance tests that run YAML fixtures through the evident pipeline
//!
//! Run with: cargo test -p evident-test --test conformance --features evident-test/fixtures
//!
//! Note: This test file requires the `fixtures` feature to be enabled.

#![cfg(feature = "fixtures")]

use evident_test::fixture::Fixture;
use std::fs;
use std::path::{Path, PathBuf};

/// The `fixtures/` directory at the workspace root
fn fixtures_dir() -> PathBuf {
    // ext/test -> ext -> workspace root
    let root = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .expect("Could not find workspace root");

    root.join("fixtures")
}

/// Load and run one fixture file
fn run_fixture_file(name: &str) {
    let path = fixtures_dir().join(name);
    let yaml = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));

    // Parse potentially multiple fixtures (separated by ---)
    let fixtures = Fixture::from_yaml_multi(&yaml).unwrap_or_else(|e| {
        panic!("Failed to parse {}: {}", path.display(), e);
    });
    assert!(!fixtures.is_empty(), "{} has no fixtures", path.display());

    for fixture in fixtures {
        println!("  Running: {}", fixture.name);
        fixture.run_and_assert();
    }
}

#[test]
fn test_single_source() {
    run_fixture_file("01_single_source.yaml");
}

#[test]
fn test_multi_header() {
    run_fixture_file("02_multi_header.yaml");
}

#[test]
fn test_response_headers() {
    run_fixture_file("03_response_headers.yaml");
}

#[test]
fn test_javascript_body() {
    run_fixture_file("04_javascript_body.yaml");
}

#[test]
fn test_config_errors() {
    run_fixture_file("05_config_errors.yaml");
}

#[test]
fn test_every_fixture_file_is_covered() {
    let mut files: Vec<_> = fs::read_dir(fixtures_dir())
        .expect("read fixtures dir")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".yaml"))
        .collect();
    files.sort();
    assert_eq!(
        files,
        [
            "01_single_source.yaml",
            "02_multi_header.yaml",
            "03_response_headers.yaml",
            "04_javascript_body.yaml",
            "05_config_errors.yaml",
        ]
    );
}
