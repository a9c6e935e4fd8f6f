//! Integration tests for Wheelhouse
//!
//! Drives the build decision engine end-to-end against real cache
//! directories, with a scripted stand-in for pip.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wheelhouse::builder::WheelBuilder;
use wheelhouse::error::{WheelhouseError, WheelhouseResult};
use wheelhouse::exec::{ExecOutcome, ExecSpec, ExternalExec};
use wheelhouse::package::{PackageInfo, PackageSettings};
use wheelhouse::python::{PythonDetails, PythonVersion};
use wheelhouse::wheel::{AbiContainer, AbiDetails, CacheLayer, LayeredWheelCache};

const INTERPRETER: &str = "/venv/bin/python";

/// Scripted pip stand-in.
///
/// Each invocation pops the next step from the script; a successful step
/// drops the configured wheel into the `--wheel-dir` argument. An empty
/// script means every invocation succeeds.
struct FakePip {
    wheel_name: String,
    script: Mutex<VecDeque<bool>>,
    invocations: Mutex<Vec<ExecSpec>>,
}

impl FakePip {
    fn new(wheel_name: &str, script: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            wheel_name: wheel_name.to_string(),
            script: Mutex::new(script.iter().copied().collect()),
            invocations: Mutex::new(Vec::new()),
        })
    }

    fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    fn environments(&self) -> Vec<HashMap<String, String>> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|spec| spec.environment.clone())
            .collect()
    }
}

#[async_trait]
impl ExternalExec for FakePip {
    async fn exec(&self, spec: &ExecSpec) -> WheelhouseResult<ExecOutcome> {
        self.invocations.lock().unwrap().push(spec.clone());

        let succeed = self.script.lock().unwrap().pop_front().unwrap_or(true);
        if !succeed {
            return Ok(ExecOutcome {
                exit_code: 1,
                output: "error: wheel build exploded".to_string(),
            });
        }

        let wheel_dir = spec
            .command_line
            .iter()
            .position(|arg| arg == "--wheel-dir")
            .map(|i| PathBuf::from(&spec.command_line[i + 1]))
            .expect("--wheel-dir argument present");
        std::fs::write(wheel_dir.join(&self.wheel_name), b"wheel").unwrap();

        Ok(ExecOutcome {
            exit_code: 0,
            output: "built 1 wheel".to_string(),
        })
    }
}

/// Static per-package settings for tests
#[derive(Default)]
struct StaticSettings {
    requires_source_build: bool,
    customized: bool,
    environment: HashMap<String, String>,
    supported_versions: Vec<String>,
}

impl PackageSettings for StaticSettings {
    fn environment(&self, _package: &PackageInfo) -> HashMap<String, String> {
        self.environment.clone()
    }

    fn supported_language_versions(&self, _package: &PackageInfo) -> Vec<String> {
        self.supported_versions.clone()
    }

    fn requires_source_build(&self, _package: &PackageInfo) -> bool {
        self.requires_source_build
    }

    fn is_customized(&self, _package: &PackageInfo) -> bool {
        self.customized
    }
}

struct Harness {
    project_layer: TempDir,
    host_layer: TempDir,
    cache: Arc<LayeredWheelCache>,
}

impl Harness {
    fn new() -> Self {
        // First caller wins; later attempts are no-ops
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let project_layer = TempDir::new().unwrap();
        let host_layer = TempDir::new().unwrap();

        let container = AbiContainer::new();
        container.add_supported_abi(AbiDetails::new(INTERPRETER, "py3", "none", "any"));

        let cache = Arc::new(LayeredWheelCache::new(
            vec![
                (CacheLayer::Project, project_layer.path().to_path_buf()),
                (CacheLayer::Host, host_layer.path().to_path_buf()),
            ],
            Arc::new(container),
        ));

        Self {
            project_layer,
            host_layer,
            cache,
        }
    }

    fn builder(
        &self,
        settings: StaticSettings,
        exec: Arc<dyn ExternalExec>,
        base_environment: HashMap<String, String>,
    ) -> WheelBuilder {
        WheelBuilder::new(
            Arc::new(settings),
            exec,
            base_environment,
            python(),
            self.cache.clone(),
            "/workspace/project",
            "0.1.0",
        )
    }
}

fn python() -> PythonDetails {
    PythonDetails::new(INTERPRETER, "/venv/bin/pip", PythonVersion::new(3, 8))
}

fn package(name: &str, version: &str) -> PackageInfo {
    PackageInfo {
        package_file: PathBuf::from(format!("/dist/{}-{}.tar.gz", name, version)),
        name: name.to_string(),
        version: Some(version.to_string()),
    }
}

fn wheel_in(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"wheel").unwrap();
    path
}

mod decision_engine {
    use super::*;

    #[tokio::test]
    async fn write_layer_hit_is_reused_without_building() {
        let harness = Harness::new();
        let cached = wheel_in(harness.project_layer.path(), "foo-1.0-py3-none-any.whl");
        let pip = FakePip::new("foo-1.0-py3-none-any.whl", &[]);
        let builder = harness.builder(StaticSettings::default(), pip.clone(), HashMap::new());

        let result = builder
            .resolve_or_build(&package("foo", "1.0"), &[])
            .await
            .unwrap();

        assert_eq!(result, cached);
        assert_eq!(pip.invocation_count(), 0);
        // Already in the write layer, so nothing was promoted to the host
        assert!(!harness
            .host_layer
            .path()
            .join("foo-1.0-py3-none-any.whl")
            .exists());
    }

    #[tokio::test]
    async fn host_layer_hit_is_promoted_to_write_layer() {
        let harness = Harness::new();
        let cached = wheel_in(harness.host_layer.path(), "foo-1.0-py3-none-any.whl");
        let pip = FakePip::new("foo-1.0-py3-none-any.whl", &[]);
        let builder = harness.builder(StaticSettings::default(), pip.clone(), HashMap::new());

        let result = builder
            .resolve_or_build(&package("foo", "1.0"), &[])
            .await
            .unwrap();

        assert_eq!(result, cached);
        assert_eq!(pip.invocation_count(), 0);

        // Promotion: the wheel was copied into the write layer and a
        // fresh lookup now resolves there.
        let promoted = harness.project_layer.path().join("foo-1.0-py3-none-any.whl");
        assert!(promoted.exists());
        assert_eq!(
            harness.cache.find_wheel("foo", "1.0", &python()),
            Some(promoted)
        );
    }

    #[tokio::test]
    async fn missing_wheel_is_built_and_shared() {
        let harness = Harness::new();
        let pip = FakePip::new("foo-1.0-py3-none-any.whl", &[]);
        let builder = harness.builder(StaticSettings::default(), pip.clone(), HashMap::new());

        let result = builder
            .resolve_or_build(&package("foo", "1.0"), &[])
            .await
            .unwrap();

        assert_eq!(
            result,
            harness.project_layer.path().join("foo-1.0-py3-none-any.whl")
        );
        assert_eq!(pip.invocation_count(), 1);
        // Plain builds are promoted to the host layer for other projects
        assert!(harness
            .host_layer
            .path()
            .join("foo-1.0-py3-none-any.whl")
            .exists());
    }

    #[tokio::test]
    async fn source_build_ignores_cached_wheels() {
        let harness = Harness::new();
        wheel_in(harness.project_layer.path(), "foo-1.0-py3-none-any.whl");
        wheel_in(harness.host_layer.path(), "foo-1.0-py3-none-any.whl");

        let pip = FakePip::new("foo-1.0-py3-none-any.whl", &[]);
        let settings = StaticSettings {
            requires_source_build: true,
            ..Default::default()
        };
        let builder = harness.builder(settings, pip.clone(), HashMap::new());

        builder
            .resolve_or_build(&package("foo", "1.0"), &[])
            .await
            .unwrap();

        // Even with wheels in every layer, the build still ran
        assert_eq!(pip.invocation_count(), 1);
    }

    #[tokio::test]
    async fn failed_build_retries_customized_and_keeps_wheel_private() {
        let harness = Harness::new();
        // First (plain) attempt fails, customized retry succeeds
        let pip = FakePip::new("bar-2.0-py3-none-any.whl", &[false, true]);

        let mut base_environment = HashMap::new();
        base_environment.insert("CFLAGS".to_string(), "-O2".to_string());

        let builder = harness.builder(StaticSettings::default(), pip.clone(), base_environment);

        let result = builder
            .resolve_or_build(&package("bar", "2.0"), &[])
            .await
            .unwrap();

        assert_eq!(pip.invocation_count(), 2);
        assert_eq!(
            result,
            harness.project_layer.path().join("bar-2.0-py3-none-any.whl")
        );

        // The retry merged the base environment in
        let environments = pip.environments();
        assert!(environments[0].is_empty());
        assert_eq!(environments[1].get("CFLAGS").map(String::as_str), Some("-O2"));

        // Customized wheels are never promoted to the host layer
        assert!(!harness
            .host_layer
            .path()
            .join("bar-2.0-py3-none-any.whl")
            .exists());
        assert!(harness.cache.is_ready());
    }

    #[tokio::test]
    async fn double_failure_clears_readiness_and_surfaces_output() {
        let harness = Harness::new();
        let pip = FakePip::new("baz-3.0-py3-none-any.whl", &[false, false]);
        let builder = harness.builder(StaticSettings::default(), pip.clone(), HashMap::new());

        let err = builder
            .resolve_or_build(&package("baz", "3.0"), &[])
            .await
            .unwrap_err();

        assert_eq!(pip.invocation_count(), 2);
        assert!(!harness.cache.is_ready());
        assert!(err
            .captured_output()
            .is_some_and(|output| output.contains("exploded")));
    }

    #[tokio::test]
    async fn customized_build_fails_without_plain_retry() {
        let harness = Harness::new();
        let pip = FakePip::new("qux-1.0-py3-none-any.whl", &[false]);
        let settings = StaticSettings {
            customized: true,
            ..Default::default()
        };
        let builder = harness.builder(settings, pip.clone(), HashMap::new());

        let result = builder.resolve_or_build(&package("qux", "1.0"), &[]).await;

        // One attempt only: customized builds never retry
        assert_eq!(pip.invocation_count(), 1);
        assert!(result.is_err());
        assert!(!harness.cache.is_ready());
    }

    #[tokio::test]
    async fn custom_environment_package_is_not_promoted() {
        let harness = Harness::new();
        let pip = FakePip::new("numpy-1.24.0-py3-none-any.whl", &[]);

        // BLAS in the base environment marks numpy as a customized build
        let mut base_environment = HashMap::new();
        base_environment.insert("BLAS".to_string(), "/opt/blas".to_string());

        let builder = harness.builder(StaticSettings::default(), pip.clone(), base_environment);

        builder
            .resolve_or_build(&package("numpy", "1.24.0"), &[])
            .await
            .unwrap();

        assert_eq!(pip.invocation_count(), 1);
        assert!(!harness
            .host_layer
            .path()
            .join("numpy-1.24.0-py3-none-any.whl")
            .exists());
    }

    #[tokio::test]
    async fn unsupported_python_version_fails_fast() {
        let harness = Harness::new();
        let pip = FakePip::new("legacy-1.0-py3-none-any.whl", &[]);
        let settings = StaticSettings {
            supported_versions: vec!["2.7".to_string(), "3.5".to_string()],
            ..Default::default()
        };
        let builder = harness.builder(settings, pip.clone(), HashMap::new());

        let err = builder
            .resolve_or_build(&package("legacy", "1.0"), &[])
            .await
            .unwrap_err();

        assert!(matches!(err, WheelhouseError::UnsupportedPython { .. }));
        assert_eq!(pip.invocation_count(), 0);
    }

    #[tokio::test]
    async fn unconfigured_cache_returns_source_unchanged() {
        let container = AbiContainer::new();
        let cache = Arc::new(LayeredWheelCache::new(Vec::new(), Arc::new(container)));
        let pip = FakePip::new("foo-1.0-py3-none-any.whl", &[]);
        let builder = WheelBuilder::new(
            Arc::new(StaticSettings::default()),
            pip.clone(),
            HashMap::new(),
            python(),
            cache,
            "/workspace/project",
            "0.1.0",
        );

        let request = package("foo", "1.0");
        let result = builder.resolve_or_build(&request, &[]).await.unwrap();

        assert_eq!(result, request.package_file);
        assert_eq!(pip.invocation_count(), 0);
    }

    #[tokio::test]
    async fn project_directory_is_returned_unchanged() {
        let harness = Harness::new();
        let pip = FakePip::new("proj-0.1.0-py3-none-any.whl", &[]);
        let project_dir = TempDir::new().unwrap();

        let builder = WheelBuilder::new(
            Arc::new(StaticSettings::default()),
            pip.clone(),
            HashMap::new(),
            python(),
            harness.cache.clone(),
            project_dir.path(),
            "0.1.0",
        );

        let request = PackageInfo::from_path(project_dir.path()).unwrap();
        let result = builder.resolve_or_build(&request, &[]).await.unwrap();

        assert_eq!(result, request.package_file);
        assert_eq!(pip.invocation_count(), 0);
    }

    #[tokio::test]
    async fn install_only_flags_are_stripped_from_build_args() {
        let harness = Harness::new();
        let pip = FakePip::new("foo-1.0-py3-none-any.whl", &[]);
        let builder = harness.builder(StaticSettings::default(), pip.clone(), HashMap::new());

        let extra_args = vec![
            "--upgrade".to_string(),
            "--pre".to_string(),
            "--ignore-installed".to_string(),
        ];
        builder
            .resolve_or_build(&package("foo", "1.0"), &extra_args)
            .await
            .unwrap();

        let invocations = pip.invocations.lock().unwrap();
        let invocation = &invocations[0];
        assert!(invocation.command_line.contains(&"--pre".to_string()));
        assert!(!invocation.command_line.contains(&"--upgrade".to_string()));
        assert!(!invocation
            .command_line
            .contains(&"--ignore-installed".to_string()));
    }
}

mod readiness {
    use super::*;

    #[tokio::test]
    async fn tampered_cache_is_detected_between_passes() {
        let harness = Harness::new();
        let pip = FakePip::new("foo-1.0-py3-none-any.whl", &[]);
        let builder = harness.builder(StaticSettings::default(), pip.clone(), HashMap::new());

        let request = package("foo", "1.0");
        let wheel = builder.resolve_or_build(&request, &[]).await.unwrap();

        builder.update_wheel_readiness(&request);
        assert!(harness.cache.is_ready());

        // Someone deletes the cached wheel by hand
        std::fs::remove_file(&wheel).unwrap();

        builder.update_wheel_readiness(&request);
        assert!(!harness.cache.is_ready());
    }

    #[tokio::test]
    async fn readiness_survives_successful_pass() {
        let harness = Harness::new();
        let pip = FakePip::new("foo-1.0-py3-none-any.whl", &[]);
        let builder = harness.builder(StaticSettings::default(), pip.clone(), HashMap::new());

        builder
            .resolve_or_build(&package("foo", "1.0"), &[])
            .await
            .unwrap();

        assert!(harness.cache.is_ready());
    }
}
