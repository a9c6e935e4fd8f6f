//! Wheel build decision engine
//!
//! For each package request, decides whether a cached wheel can be reused,
//! a wheel from a lower-priority layer can be promoted, or a fresh build
//! is required; drives the external build with the right environment and
//! options; retries once as a customized build when a plain build fails;
//! and keeps the cache readiness signal honest throughout.

pub mod materializer;

pub use materializer::{ParallelWheelGenerator, TimingReport};

use crate::error::{WheelhouseError, WheelhouseResult};
use crate::exec::{ExecSpec, ExternalExec};
use crate::package::{merge_environments, PackageInfo, PackageSettings};
use crate::python::PythonDetails;
use crate::wheel::cache::LayeredWheelCache;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// "pip install" options that do not work with "pip wheel".
const NOT_WHEEL_OPTIONS: &[&str] = &["--upgrade", "--ignore-installed"];

/// Environment variables that customize the build of one specific package.
/// A package on this list whose variables are present in the base
/// environment is treated as a customized build even when its settings say
/// otherwise.
fn custom_environment_variables(name: &str) -> &'static [&'static str] {
    match name {
        "numpy" => &["ATLAS", "BLAS", "LAPACK", "OPENBLAS"],
        "pycurl" => &["PYCURL_SSL_LIBRARY"],
        _ => &[],
    }
}

/// Decides between reusing, promoting, and building wheels.
///
/// One builder serves a whole session; it may be called concurrently from
/// independent workers. The cache directories it shares with other
/// processes tolerate races by design, so no locking happens here.
pub struct WheelBuilder {
    package_settings: Arc<dyn PackageSettings>,
    exec: Arc<dyn ExternalExec>,
    base_environment: HashMap<String, String>,
    python_details: PythonDetails,
    wheel_cache: Arc<LayeredWheelCache>,
    project_dir: PathBuf,
    project_version: String,
}

impl WheelBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        package_settings: Arc<dyn PackageSettings>,
        exec: Arc<dyn ExternalExec>,
        base_environment: HashMap<String, String>,
        python_details: PythonDetails,
        wheel_cache: Arc<LayeredWheelCache>,
        project_dir: impl Into<PathBuf>,
        project_version: impl Into<String>,
    ) -> Self {
        Self {
            package_settings,
            exec,
            base_environment,
            python_details,
            wheel_cache,
            project_dir: project_dir.into(),
            project_version: project_version.into(),
        }
    }

    /// Resolve a package request to a usable artifact path.
    ///
    /// Returns a cached wheel when one is compatible, otherwise builds one
    /// into the write layer and returns it. Falls back to the original
    /// source path when caching is not possible for this request. A build
    /// that fails twice clears the readiness latch and surfaces the
    /// failure with its captured output; callers treat that as terminal
    /// for this package only.
    pub async fn resolve_or_build(
        &self,
        package: &PackageInfo,
        extra_args: &[String],
    ) -> WheelhouseResult<PathBuf> {
        self.ensure_python_supported(package)?;

        let package_file = package.package_file.clone();

        // No write layer configured: caching is off for this session.
        if self.wheel_cache.target_dir().is_none() {
            return Ok(package_file);
        }

        // The project itself is installed editable for development; never
        // cache a moving target.
        if package.is_directory() && package.package_file == self.project_dir {
            return Ok(package_file);
        }

        let name = package.name.clone();
        // Generated directory sources have no version of their own; they
        // build under the project's current version.
        let version = if package.is_directory() {
            Some(self.project_version.clone())
        } else {
            package.version.clone()
        };

        // Safety belt: identity should always be resolvable by now.
        let Some(version) = version else {
            return Ok(package_file);
        };

        let requires_source_build = self.package_settings.requires_source_build(package);
        let mut custom_build = requires_source_build
            || self.package_settings.is_customized(package)
            || self.is_custom_environment(&name);

        if !requires_source_build {
            if let Some(wheel) = self.find_in_write_layer(&name, &version) {
                info!("{} from wheel: {}", package.to_short_hand(), wheel.display());
                return Ok(wheel);
            }
            if !custom_build {
                if let Some(wheel) = self.find_in_other_layers(&name, &version) {
                    if let Some(write_layer) = self.wheel_cache.write_layer() {
                        self.wheel_cache.store_wheel(&wheel, write_layer)?;
                    }
                    info!("{} from wheel: {}", package.to_short_hand(), wheel.display());
                    return Ok(wheel);
                }
            }
        }

        // Build into the write layer.
        match self.build_wheel(package, extra_args, custom_build).await {
            Ok(()) => {}
            Err(err) if !custom_build => {
                // The package may need the session environment after all.
                // Treat it as a customized build and retry exactly once.
                debug!(
                    "Retrying {} as a customized build: {}",
                    package.to_short_hand(),
                    err
                );
                custom_build = true;
                if let Err(retry_err) = self.build_wheel(package, extra_args, true).await {
                    self.wheel_cache.set_ready(false);
                    return Err(retry_err);
                }
            }
            Err(err) => {
                self.wheel_cache.set_ready(false);
                return Err(err);
            }
        }

        match self.find_in_write_layer(&name, &version) {
            Some(wheel) => {
                // Customized wheels are environment-specific; never share
                // them with other layers.
                if !custom_build {
                    for layer in self.wheel_cache.layer_ids().into_iter().skip(1) {
                        self.wheel_cache.store_wheel(&wheel, layer)?;
                    }
                }
                Ok(wheel)
            }
            None => {
                warn!(
                    "Build of {} finished but left no wheel in the write layer",
                    package.to_short_hand()
                );
                self.wheel_cache.set_ready(false);
                Ok(package_file)
            }
        }
    }

    /// Re-check that the write layer still holds this package's wheel.
    ///
    /// Called between build passes to detect external tampering, such as a
    /// user deleting the wheel cache by hand while the installed virtualenv
    /// still satisfies the package. Clears the readiness latch when the
    /// wheel is missing; skipped entirely once the latch is already down.
    pub fn update_wheel_readiness(&self, package: &PackageInfo) {
        if !self.wheel_cache.is_ready() {
            return;
        }

        let version = if package.is_directory() {
            Some(self.project_version.clone())
        } else {
            package.version.clone()
        };

        let wheel = version.and_then(|version| self.find_in_write_layer(&package.name, &version));

        if wheel.is_none() {
            self.wheel_cache.set_ready(false);
        }
    }

    /// Fail fast when the package does not support the target interpreter.
    ///
    /// An empty supported-versions list means no restriction.
    pub fn ensure_python_supported(&self, package: &PackageInfo) -> WheelhouseResult<()> {
        let supported = self.package_settings.supported_language_versions(package);
        if !supported.is_empty()
            && !supported.contains(&self.python_details.version.major_minor())
        {
            return Err(WheelhouseError::UnsupportedPython {
                package: package.name.clone(),
                supported,
            });
        }
        Ok(())
    }

    async fn build_wheel(
        &self,
        package: &PackageInfo,
        extra_args: &[String],
        custom_build: bool,
    ) -> WheelhouseResult<()> {
        let command_line = self.make_command_line(package, extra_args);
        if command_line.is_empty() {
            return Ok(());
        }

        info!("Building wheel for {}", package.to_short_hand());

        let package_environment = self.package_settings.environment(package);
        let environment = if custom_build {
            merge_environments(&[&self.base_environment, &package_environment])
        } else {
            // Customized environments explicitly marked non-customized
            // still apply on their own.
            package_environment
        };

        let spec = ExecSpec::new(command_line, environment);
        let outcome = self.exec.exec(&spec).await?;

        if outcome.success() {
            info!("{}", outcome.output.trim());
            Ok(())
        } else {
            error!(
                "Error building wheel for {} using `{}`",
                package.to_short_hand(),
                spec.rendered()
            );
            error!("{}", outcome.output.trim());
            Err(WheelhouseError::build_failed(
                package.to_short_hand(),
                outcome.output.trim(),
            ))
        }
    }

    fn make_command_line(&self, package: &PackageInfo, extra_args: &[String]) -> Vec<String> {
        let Some(target_dir) = self.wheel_cache.target_dir() else {
            return Vec::new();
        };

        let mut command_line = vec![
            self.python_details.interpreter.display().to_string(),
            self.python_details.pip.display().to_string(),
            "wheel".to_string(),
            "--disable-pip-version-check".to_string(),
            "--wheel-dir".to_string(),
            target_dir.display().to_string(),
            "--no-deps".to_string(),
        ];
        command_line.extend(self.package_settings.global_options(package));
        command_line.extend(self.package_settings.build_options(package));
        command_line.extend(cleanup_args(extra_args));
        command_line.push(package.package_file.display().to_string());
        command_line
    }

    fn find_in_write_layer(&self, name: &str, version: &str) -> Option<PathBuf> {
        let write_layer = self.wheel_cache.write_layer()?;
        self.wheel_cache
            .find_wheel_in_layer(name, version, &self.python_details, write_layer)
    }

    fn find_in_other_layers(&self, name: &str, version: &str) -> Option<PathBuf> {
        self.wheel_cache
            .layer_ids()
            .into_iter()
            .skip(1)
            .find_map(|layer| {
                self.wheel_cache
                    .find_wheel_in_layer(name, version, &self.python_details, layer)
            })
    }

    // Use of the session environment may hide really customized packages.
    fn is_custom_environment(&self, name: &str) -> bool {
        custom_environment_variables(name)
            .iter()
            .any(|variable| self.base_environment.contains_key(*variable))
    }
}

/// Strip install-only flags before handing args to a wheel-only build
fn cleanup_args(args: &[String]) -> Vec<String> {
    args.iter()
        .filter(|arg| !NOT_WHEEL_OPTIONS.contains(&arg.as_str()))
        .cloned()
        .collect()
}
