//! End-to-end tests for the `resolve` command.
//!
//! These tests invoke the actual CLI binary. The manifests only contain
//! entries that never reach the fetcher (storage blobs, unsupported kinds,
//! false conditions), so neither network access nor nix is needed.

mod common;

use common::prelude::*;

#[test]
fn test_resolve_help() {
    let mut cmd = cargo_bin_cmd!("deps-vendor");
    cmd.arg("resolve")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--target-os"))
        .stdout(predicate::str::contains("--deny-warnings"));
}

#[test]
fn test_resolve_missing_manifest_has_hint() {
    let fixture = TestFixture::new();
    fixture
        .command()
        .arg("resolve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Root manifest not found"))
        .stderr(predicate::str::contains("hint:"));
}

#[test]
fn test_resolve_writes_nix_to_stdout() {
    let fixture = TestFixture::new().with_file("src/DEPS", manifests::OFFLINE);
    fixture
        .command()
        .args(["resolve", "--target-os", "unix", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "# GENERATED BY 'deps-vendor' for unix\n",
        ))
        .stdout(predicate::str::contains("{fetchgit, fetchurl, runCommand}:"))
        .stdout(predicate::str::contains(
            "https://storage.googleapis.com/fonts-bucket/fonts/9a8b7c6d",
        ))
        .stdout(predicate::str::contains("nacl").not())
        .stderr(predicate::str::contains("src/tools/luci-go"));
}

#[test]
fn test_resolve_json_to_file() {
    let fixture = TestFixture::new().with_file("src/DEPS", manifests::OFFLINE);
    fixture
        .command()
        .args(["resolve", "--format", "json", "--output", "vendor.json", "--quiet"])
        .assert()
        .success();

    let written = std::fs::read_to_string(fixture.path().join("vendor.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&written).unwrap();
    let fonts = &parsed["src/third_party/test_fonts"];
    assert_eq!(fonts["type"], "blob");
    assert_eq!(fonts["digest"]["algorithm"], "sha256");
    assert!(parsed.get("src/tools/luci-go").is_none());
}

#[test]
fn test_resolve_deny_warnings_fails() {
    let fixture = TestFixture::new().with_file("src/DEPS", manifests::OFFLINE);
    fixture
        .command()
        .args(["resolve", "--deny-warnings", "--quiet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("skipped as unsupported"));
}

#[test]
fn test_resolve_skip_flag_silences_warning() {
    let fixture = TestFixture::new().with_file("src/DEPS", manifests::OFFLINE);
    fixture
        .command()
        .args([
            "resolve",
            "--skip",
            "src/tools/*",
            "--deny-warnings",
            "--quiet",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("luci-go").not());
}

#[test]
fn test_resolve_reads_config_file() {
    let fixture = TestFixture::new()
        .with_file("deps/DEPS", manifests::OFFLINE)
        .with_config("manifest: deps/DEPS\nlabel: 120.0.6099.0\ntarget_os: [unix, android]\n");
    fixture
        .command()
        .args(["resolve", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "# GENERATED BY 'deps-vendor 120.0.6099.0' for unix, android\n",
        ));
}

#[test]
fn test_resolve_config_typo_suggests_key() {
    let fixture = TestFixture::new()
        .with_file("src/DEPS", "deps = {}")
        .with_config("tagret_os: [unix]\n");
    fixture
        .command()
        .arg("resolve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("did you mean 'target_os'?"));
}

#[test]
fn test_resolve_bad_var_flag() {
    let fixture = TestFixture::new().with_file("src/DEPS", "deps = {}");
    fixture
        .command()
        .args(["resolve", "--var", "checkout_nacl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid variable assignment"));
}

#[test]
fn test_resolve_malformed_manifest() {
    let fixture = TestFixture::new().with_file("src/DEPS", "deps = {'src/a': ");
    fixture
        .command()
        .args(["resolve", "--quiet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Malformed manifest"));
}

#[test]
fn test_resolve_missing_fetch_tool_has_hint() {
    let fixture = TestFixture::new()
        .with_file("src/DEPS", "deps = {'src/a': 'https://git.example/a.git@abc'}")
        .with_config(
            "fetch:\n  program: deps-vendor-no-such-prefetch-tool\n  attempts: 1\n",
        );
    fixture
        .command()
        .args(["resolve", "--quiet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Failed to run fetch tool 'deps-vendor-no-such-prefetch-tool'",
        ));
}

/// Resolves a small real repository with nix-prefetch-git.
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_resolve_real_repository() {
    let fixture = TestFixture::new().with_file(
        "src/DEPS",
        "deps = {'src/third_party/zlib': \
         'https://chromium.googlesource.com/chromium/src/third_party/zlib.git@1e85c01b15363d11fab81c46fe2b5c2179113f70'}",
    );
    fixture
        .command()
        .args(["resolve", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r#"sha256 = "[0-9a-z]{52}""#).unwrap());
    assert!(fixture.child("src/third_party/zlib").path().is_dir());
}
