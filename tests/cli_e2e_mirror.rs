//! End-to-end tests for the `unit-mirror mirror` and `slice` commands.
//!
//! These tests invoke the binary against directory repositories written by
//! the shared fixture and check its output, exit status and the resulting
//! destination.

#[allow(dead_code)]
mod common;
#[allow(unused_imports)]
use common::prelude::*;

use unit_mirror::repository::{ArtifactRepository, MetadataRepository};

#[test]
fn test_mirror_help() {
    let mut cmd = cargo_bin_cmd!("unit-mirror");
    cmd.arg("mirror")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--destination"))
        .stdout(predicate::str::contains("--compare-against"))
        .stdout(predicate::str::contains("--write-mode"))
        .stdout(predicate::str::contains("--roots"));
}

#[test]
fn test_mirror_roots() {
    let fixture = RepoFixture::new().with_sample_source("src");
    fixture
        .command()
        .args(["--color", "never", "mirror", "--no-progress"])
        .args(["--source", &fixture.location("src")])
        .args(["--destination", &fixture.location("dst")])
        .args(["--roots", "app/[1.0,2.0),tool"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[SLICE] Resolved 5 units"))
        .stdout(predicate::str::contains(
            "Artifacts: 5 copied, 0 already present, 0 failed, 0 not attempted",
        ))
        .stdout(predicate::str::contains("Mirror finished: OK"));

    assert_eq!(fixture.open_artifacts("dst").keys().unwrap().len(), 5);
    assert_eq!(fixture.open_metadata("dst").units().unwrap().len(), 5);
}

#[test]
fn test_mirror_without_sources_fails() {
    let fixture = RepoFixture::new();
    fixture
        .command()
        .args(["mirror", "--destination", &fixture.location("dst")])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No source repositories configured"));
    assert!(!fixture.repo_path("dst").exists());
}

#[test]
fn test_mirror_missing_source_fails() {
    let fixture = RepoFixture::new();
    fixture
        .command()
        .args(["mirror", "--no-progress"])
        .args(["--source", &fixture.location("nowhere")])
        .args(["--destination", &fixture.location("dst")])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("content.yaml"));
}

#[test]
fn test_mirror_corrupt_source_exits_with_failure() {
    let fixture = RepoFixture::new().with_sample_source("src");
    std::fs::write(
        fixture.repo_path("src").join("binary").join("docs_1.0.0"),
        b"tampered",
    )
    .unwrap();

    fixture
        .command()
        .args(["--color", "never", "mirror", "--no-progress", "--ignore-errors"])
        .args(["--source", &fixture.location("src")])
        .args(["--destination", &fixture.location("dst")])
        .args(["--log", "mirror.log"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("4 copied"))
        .stdout(predicate::str::contains("[ERR] binary,docs,1.0.0: verification failed"))
        .stdout(predicate::str::contains("Mirror finished: ERROR"));

    fixture
        .child("mirror.log")
        .assert(predicate::str::contains("[ERROR] binary,docs,1.0.0: verification failed"));
}

#[test]
fn test_mirror_from_config_file() {
    let fixture = RepoFixture::new().with_sample_source("src");
    let yaml = format!(
        "sources: [\"{}\"]\ndestination: \"{}\"\nroots: [lib]\nslicing:\n  include_optional_dependencies: false\n",
        fixture.location("src"),
        fixture.location("dst")
    );
    let fixture = fixture.with_file("mirror.yaml", &yaml);

    fixture
        .command()
        .args(["--color", "never", "mirror", "--no-progress", "--config", "mirror.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Resolved 2 units"));
}

#[test]
fn test_mirror_compare_second_run() {
    let fixture = RepoFixture::new().with_sample_source("src");
    let run = |extra: &[&str]| {
        fixture
            .command()
            .args(["--color", "never", "mirror", "--no-progress"])
            .args(["--source", &fixture.location("src")])
            .args(["--destination", &fixture.location("dst")])
            .args(extra)
            .assert()
            .success()
    };
    run(&[]);
    run(&["--compare", "--comparator", "bytes"])
        .stdout(predicate::str::contains("0 copied, 5 already present"));
}

#[test]
fn test_mirror_invalid_write_mode_is_usage_error() {
    let fixture = RepoFixture::new();
    fixture
        .command()
        .args(["mirror", "--write-mode", "overwrite"])
        .assert()
        .code(2);
}

#[test]
fn test_slice_prints_closure() {
    let fixture = RepoFixture::new().with_sample_source("src");
    fixture
        .command()
        .args(["--color", "never", "slice", "--no-optional"])
        .args(["--source", &fixture.location("src")])
        .args(["--roots", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Closure: 3 units"))
        .stdout(predicate::str::contains("lib 1.5.0 (1 artifacts)"))
        .stdout(predicate::str::contains("docs").not());
}

#[test]
fn test_slice_json() {
    let fixture = RepoFixture::new().with_sample_source("src");
    let output = fixture
        .command()
        .args(["slice", "--json", "--latest-only"])
        .args(["--source", &fixture.location("src")])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let units = value["units"].as_array().unwrap();
    assert_eq!(units.len(), 4);
    assert_eq!(value["severity"], "ok");
    assert!(units
        .iter()
        .any(|u| u["id"] == "lib" && u["version"] == "1.5.0"));
}

#[test]
fn test_slice_unknown_root_warns() {
    let fixture = RepoFixture::new().with_sample_source("src");
    fixture
        .command()
        .args(["--color", "never", "slice"])
        .args(["--source", &fixture.location("src")])
        .args(["--roots", "missing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[WARN] Root missing matches no unit"));
}
