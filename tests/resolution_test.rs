//! End-to-end resolution tests against the library API.
//!
//! A scripted fetcher stands in for nix-prefetch-git; everything else (the
//! cache, materialization, the fixpoint loop, emission) is the real thing.

mod common;

use std::fs;
use std::path::Path;

use common::manifests;
use common::FakeFetcher;
use deps_vendor::cache::{CacheEntry, ContentCache};
use deps_vendor::cancel::CancellationToken;
use deps_vendor::condition::GclientConditions;
use deps_vendor::config::VendorConfig;
use deps_vendor::context::VarValue;
use deps_vendor::emit::{self, EmitOptions, OutputFormat};
use deps_vendor::error::{Error, Result};
use deps_vendor::fetcher::{FetchRequest, FetchedSource, SourceFetcher};
use deps_vendor::phases::{orchestrator, Outcome, Resolution, ResolvedSource};
use tempfile::TempDir;

struct Workspace {
    _temp: TempDir,
    root: std::path::PathBuf,
    cache_root: std::path::PathBuf,
}

impl Workspace {
    fn new(root_manifest: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("workspace");
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/DEPS"), root_manifest).unwrap();
        let cache_root = temp.path().join("cache");
        Self {
            _temp: temp,
            root,
            cache_root,
        }
    }

    fn cache(&self) -> ContentCache {
        ContentCache::open(&self.cache_root).unwrap()
    }

    fn resolve(&self, config: &VendorConfig, fetcher: &dyn SourceFetcher) -> Result<Resolution> {
        orchestrator::execute(
            config,
            &self.root,
            fetcher,
            &GclientConditions,
            &self.cache(),
            CancellationToken::new(),
        )
    }
}

fn linux() -> VendorConfig {
    VendorConfig {
        target_os: Some(vec!["unix".into()]),
        jobs: Some(2),
        ..VendorConfig::default()
    }
}

fn scenario_fetcher() -> FakeFetcher {
    FakeFetcher::new().with_file("R1", "DEPS", manifests::NESTED_IN_A)
}

fn pin(resolution: &Resolution, path: &str) -> (String, String) {
    match resolution.get(path) {
        Some(ResolvedSource::Git { url, revision, .. }) => (url.clone(), revision.clone()),
        other => panic!("expected git record at {path}, got {other:?}"),
    }
}

fn seed(cache: &ContentCache, revision: &str, files: &[(&str, &str)]) {
    let copy = cache.copy_path(revision);
    fs::create_dir_all(&copy).unwrap();
    for (name, content) in files {
        fs::write(copy.join(name), content).unwrap();
    }
    cache
        .store(
            revision,
            CacheEntry {
                local_copy: copy,
                content_hash: FakeFetcher::hash_of(revision),
            },
        )
        .unwrap();
}

#[test]
fn test_nested_manifest_scenario() {
    let ws = Workspace::new(manifests::ROOT);
    let fetcher = scenario_fetcher();

    let resolution = ws.resolve(&linux(), &fetcher).unwrap();

    assert_eq!(resolution.outcome(), Outcome::Complete);
    assert_eq!(
        resolution.records.keys().collect::<Vec<_>>(),
        vec!["src/a", "src/b", "src/c"]
    );
    assert_eq!(
        pin(&resolution, "src/a"),
        ("https://git.example/a.git".into(), "R1".into())
    );
    assert_eq!(
        pin(&resolution, "src/b"),
        ("https://git.example/b.git".into(), "R2".into())
    );
    assert_eq!(
        pin(&resolution, "src/c"),
        ("https://git.example/c.git".into(), "R3".into())
    );
    assert_eq!(fetcher.calls(), vec!["R1", "R2", "R3"]);
    assert!(ws.root.join("src/a/DEPS").is_file());
    assert!(ws.root.join("src/c/README").is_file());
}

#[test]
fn test_false_condition_drops_dependency() {
    let ws = Workspace::new(manifests::ROOT);
    let fetcher = scenario_fetcher();
    let mut config = linux();
    config
        .vars
        .insert("checkout_linux".into(), VarValue::Bool(false));

    let resolution = ws.resolve(&config, &fetcher).unwrap();

    assert!(resolution.get("src/b").is_none());
    assert!(resolution.get("src/a").is_some());
    assert!(resolution.get("src/c").is_some());
    assert_eq!(fetcher.calls(), vec!["R1", "R3"]);
    assert!(!ws.root.join("src/b").exists());
}

#[test]
fn test_warm_cache_fetches_only_missing_revision() {
    let ws = Workspace::new(manifests::ROOT);
    let cache = ws.cache();
    seed(&cache, "R1", &[("DEPS", manifests::NESTED_IN_A)]);
    seed(&cache, "R2", &[]);
    drop(cache);

    let fetcher = scenario_fetcher();
    let resolution = ws.resolve(&linux(), &fetcher).unwrap();

    assert_eq!(resolution.len(), 3);
    assert_eq!(fetcher.calls(), vec!["R3"]);
    assert_eq!(resolution.stats.fetches, 1);
    assert_eq!(resolution.stats.cache_hits, 2);
}

#[test]
fn test_second_run_is_served_from_cache() {
    let ws = Workspace::new(manifests::ROOT);
    let fetcher = scenario_fetcher();

    let first = ws.resolve(&linux(), &fetcher).unwrap();
    assert_eq!(fetcher.call_count(), 3);

    fetcher.reset();
    let second = ws.resolve(&linux(), &fetcher).unwrap();
    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(first.records, second.records);

    ws.cache().remove("R3").unwrap();
    let third = ws.resolve(&linux(), &fetcher).unwrap();
    assert_eq!(fetcher.calls(), vec!["R3"]);
    assert_eq!(first.records, third.records);
}

#[test]
fn test_output_is_byte_identical_across_runs() {
    let render = |resolution: &Resolution, format| {
        emit::emit(
            resolution,
            &EmitOptions {
                format,
                header: Some(linux().header()),
            },
        )
        .unwrap()
    };

    let first = {
        let ws = Workspace::new(manifests::ROOT);
        ws.resolve(&linux(), &scenario_fetcher()).unwrap()
    };
    let second = {
        let ws = Workspace::new(manifests::ROOT);
        let mut config = linux();
        config.jobs = Some(1);
        ws.resolve(&config, &scenario_fetcher()).unwrap()
    };

    for format in [OutputFormat::Nix, OutputFormat::Json] {
        assert_eq!(render(&first, format), render(&second, format));
    }
    let nix = render(&first, OutputFormat::Nix);
    let a = nix.find("\"src/a\"").unwrap();
    let c = nix.find("\"src/c\"").unwrap();
    assert!(a < c);
}

#[test]
fn test_conflicting_pins_abort() {
    let ws = Workspace::new(manifests::ROOT);
    let fetcher = FakeFetcher::new().with_file(
        "R1",
        "DEPS",
        "deps = {'src/b': 'https://git.example/b.git@R2-other'}",
    );

    let err = ws.resolve(&linux(), &fetcher).unwrap_err();
    match err {
        Error::ConflictingDependency { path, .. } => assert_eq!(path, "src/b"),
        other => panic!("expected ConflictingDependency, got {other:?}"),
    }
}

#[test]
fn test_identical_redeclaration_is_not_a_conflict() {
    let ws = Workspace::new(manifests::ROOT);
    let fetcher = FakeFetcher::new().with_file(
        "R1",
        "DEPS",
        "deps = {'src/b': 'https://git.example/b.git@R2'}",
    );

    let resolution = ws.resolve(&linux(), &fetcher).unwrap();
    assert_eq!(resolution.len(), 2);
    assert_eq!(fetcher.calls(), vec!["R1", "R2"]);
}

#[test]
fn test_git_pin_after_cipd_declaration_conflicts() {
    let ws = Workspace::new(
        r#"deps = {
  'src/a': 'https://git.example/a.git@R1',
  'src/x': {'dep_type': 'cipd', 'packages': [{'package': 'infra/x', 'version': 'v1'}]},
}"#,
    );
    let fetcher = FakeFetcher::new().with_file(
        "R1",
        "DEPS",
        "deps = {'src/x': 'https://git.example/x.git@RX'}",
    );

    let err = ws.resolve(&linux(), &fetcher).unwrap_err();
    match err {
        Error::ConflictingDependency {
            path, conflicting, ..
        } => {
            assert_eq!(path, "src/x");
            assert!(conflicting.contains("https://git.example/x.git@RX"));
        }
        other => panic!("expected ConflictingDependency, got {other:?}"),
    }
    assert_eq!(fetcher.calls(), vec!["R1"]);
}

#[test]
fn test_nested_manifest_cannot_escape_workspace() {
    let ws = Workspace::new("deps = {'src/a': 'https://git.example/a.git@R1'}");
    let victim = ws.root.parent().unwrap().join("victim");
    fs::create_dir_all(&victim).unwrap();
    fs::write(victim.join("precious.txt"), "keep").unwrap();
    let fetcher = FakeFetcher::new().with_file(
        "R1",
        "DEPS",
        "deps = {'../victim': 'https://git.example/v.git@R9'}",
    );

    let err = ws.resolve(&linux(), &fetcher).unwrap_err();
    assert!(matches!(err, Error::MalformedManifest { .. }), "{err:?}");
    assert!(victim.join("precious.txt").is_file());
    assert_eq!(fetcher.calls(), vec!["R1"]);
}

#[test]
fn test_cycle_terminates() {
    let ws = Workspace::new("deps = {'src/a': 'https://git.example/a.git@RA'}");
    let fetcher = FakeFetcher::new()
        .with_file("RA", "DEPS", "deps = {'src/b': 'https://git.example/b.git@RB'}")
        .with_file("RB", "DEPS", "deps = {'src/a': 'https://git.example/a.git@RA'}");

    let resolution = ws.resolve(&linux(), &fetcher).unwrap();
    assert_eq!(resolution.len(), 2);
    assert_eq!(fetcher.calls(), vec!["RA", "RB"]);
}

#[test]
fn test_offline_manifest_needs_no_fetches() {
    let ws = Workspace::new(manifests::OFFLINE);
    let fetcher = FakeFetcher::new();

    let resolution = ws.resolve(&linux(), &fetcher).unwrap();

    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(resolution.outcome(), Outcome::CompleteWithWarnings);
    assert_eq!(resolution.warnings.len(), 1);
    assert_eq!(resolution.warnings[0].path(), "src/tools/luci-go");
    match resolution.get("src/third_party/test_fonts") {
        Some(ResolvedSource::Blob { url, digest }) => {
            assert_eq!(
                url,
                "https://storage.googleapis.com/fonts-bucket/fonts/9a8b7c6d"
            );
            assert_eq!(digest.value.len(), 64);
        }
        other => panic!("expected blob, got {other:?}"),
    }
}

#[test]
fn test_condition_gating_follows_target_flags() {
    const OSES: &[&str] = &["android", "chromeos", "fuchsia", "ios", "mac", "unix", "win"];
    let mut selections: Vec<Vec<&str>> = OSES.iter().map(|os| vec![*os]).collect();
    for (i, first) in OSES.iter().enumerate() {
        for second in &OSES[i + 1..] {
            selections.push(vec![first, second]);
        }
    }

    for oses in selections {
        let ws = Workspace::new(manifests::ROOT);
        let config = VendorConfig {
            target_os: Some(oses.iter().map(|s| s.to_string()).collect()),
            jobs: Some(2),
            ..VendorConfig::default()
        };
        let resolution = ws.resolve(&config, &scenario_fetcher()).unwrap();
        let expected: &[&str] = if oses.contains(&"unix") {
            &["src/a", "src/b", "src/c"]
        } else {
            &["src/a", "src/c"]
        };
        assert_eq!(
            resolution.records.keys().map(String::as_str).collect::<Vec<_>>(),
            expected.to_vec(),
            "targets {:?}",
            oses
        );
    }
}

/// Cancels the shared token as soon as the first fetch finishes
struct CancellingFetcher {
    inner: FakeFetcher,
    token: CancellationToken,
}

impl SourceFetcher for CancellingFetcher {
    fn fetch(&self, request: &FetchRequest, cancel: &CancellationToken) -> Result<FetchedSource> {
        let fetched = self.inner.fetch(request, cancel)?;
        self.token.cancel();
        Ok(fetched)
    }
}

#[test]
fn test_cancellation_stops_between_passes() {
    let ws = Workspace::new(manifests::ROOT);
    let token = CancellationToken::new();
    let fetcher = CancellingFetcher {
        inner: scenario_fetcher(),
        token: token.clone(),
    };

    let err = orchestrator::execute(
        &linux(),
        &ws.root,
        &fetcher,
        &GclientConditions,
        &ws.cache(),
        token,
    )
    .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(!fetcher.inner.calls().contains(&"R3".to_string()));
}

#[test]
fn test_sidecar_blobs_are_appended() {
    let ws = Workspace::new("deps = {}");
    fs::create_dir_all(ws.root.join("src/third_party/node")).unwrap();
    fs::write(
        ws.root.join("src/third_party/node/node_modules.tar.gz.sha1"),
        "0123456789abcdef0123456789abcdef01234567\n",
    )
    .unwrap();
    let config: VendorConfig = deps_vendor::config::parse(
        "target_os: [unix]\n\
         sidecar_blobs:\n  - path: src/third_party/node/node_modules\n    bucket: chromium-nodejs\n",
    )
    .unwrap();

    let resolution = ws.resolve(&config, &FakeFetcher::new()).unwrap();
    let nix = emit::emit(&resolution, &EmitOptions::default()).unwrap();
    assert!(nix.contains(
        "https://commondatastorage.googleapis.com/chromium-nodejs/0123456789abcdef0123456789abcdef01234567"
    ));
    assert!(Path::new(&ws.root)
        .join("src/third_party/node/node_modules.tar.gz.sha1")
        .is_file());
}
