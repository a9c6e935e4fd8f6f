//! Parallel wheel materialization
//!
//! Pre-warms the wheel cache from a set of source distributions: every
//! sdist not already satisfiable from a cache layer is built concurrently,
//! best-effort. Individual build failures are logged and recorded, never
//! fatal - a later pass installs from source if a wheel is still missing.

use crate::exec::{ExecSpec, ExternalExec};
use crate::package::PackageInfo;
use crate::python::PythonDetails;
use crate::wheel::cache::LayeredWheelCache;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Wall-clock build durations keyed by package shorthand
#[derive(Debug, Serialize)]
pub struct TimingReport {
    /// When the materialization pass finished
    pub generated_at: DateTime<Utc>,
    /// Milliseconds spent per package
    pub entries: BTreeMap<String, u64>,
}

impl TimingReport {
    /// Render the report in the `name:\tmillis` line format
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, millis) in &self.entries {
            out.push_str(key);
            out.push_str(":\t");
            out.push_str(&millis.to_string());
            out.push('\n');
        }
        out
    }

    /// Serialize the report as JSON for tooling
    pub fn to_json(&self) -> crate::error::WheelhouseResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the rendered report to a file.
    ///
    /// The report is advisory; write failures are logged and swallowed so
    /// they never fail a build pass.
    pub async fn write_report(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        if let Err(err) = tokio::fs::write(path, self.render()).await {
            warn!("Unable to write timing report {}: {}", path.display(), err);
        }
    }
}

/// Builds missing wheels for a set of sdists with bounded concurrency
pub struct ParallelWheelGenerator {
    wheel_cache: Arc<LayeredWheelCache>,
    python_details: PythonDetails,
    exec: Arc<dyn ExternalExec>,
    report_dir: PathBuf,
    parallelism: usize,
    counter: AtomicUsize,
}

impl ParallelWheelGenerator {
    pub fn new(
        wheel_cache: Arc<LayeredWheelCache>,
        python_details: PythonDetails,
        exec: Arc<dyn ExternalExec>,
        report_dir: impl Into<PathBuf>,
        parallelism: usize,
    ) -> Self {
        Self {
            wheel_cache,
            python_details,
            exec,
            report_dir: report_dir.into(),
            parallelism: parallelism.max(1),
            counter: AtomicUsize::new(0),
        }
    }

    /// Build a wheel for every source file that needs one.
    ///
    /// Iteration order is unspecified; files are processed with bounded
    /// concurrency and the only shared state is the cache itself (stores
    /// are copy-if-absent) and the progress counter.
    pub async fn materialize(&self, files: &[PathBuf]) -> TimingReport {
        let total = files.len();

        let timings: Vec<Option<(String, u64)>> = stream::iter(files.iter())
            .map(|file| async move {
                let package = match PackageInfo::from_path(file) {
                    Some(package) => package,
                    None => {
                        warn!("Skipping unrecognized source {}", file.display());
                        return None;
                    }
                };

                let started = Instant::now();
                self.make_wheel_from_sdist(&package, file, total).await;
                Some((
                    package.to_short_hand(),
                    started.elapsed().as_millis() as u64,
                ))
            })
            .buffer_unordered(self.parallelism)
            .collect()
            .await;

        TimingReport {
            generated_at: Utc::now(),
            entries: timings.into_iter().flatten().collect(),
        }
    }

    async fn make_wheel_from_sdist(&self, package: &PackageInfo, file: &Path, total: usize) {
        if file
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "whl")
        {
            return;
        }

        let sequence = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Building wheel {} ({} of {})",
            package.name, sequence, total
        );

        if let Some(version) = package.version.as_deref() {
            if self
                .wheel_cache
                .find_wheel(&package.name, version, &self.python_details)
                .is_some()
            {
                debug!("{} already cached, skipping", package.to_short_hand());
                return;
            }
        }

        let Some(target_dir) = self.wheel_cache.target_dir() else {
            return;
        };

        let command_line = vec![
            self.python_details.interpreter.display().to_string(),
            self.python_details.pip.display().to_string(),
            "wheel".to_string(),
            "--disable-pip-version-check".to_string(),
            "--wheel-dir".to_string(),
            target_dir.display().to_string(),
            "--no-deps".to_string(),
            file.display().to_string(),
        ];

        let spec = ExecSpec::new(command_line, HashMap::new());
        match self.exec.exec(&spec).await {
            Ok(outcome) if outcome.success() => {}
            Ok(outcome) => {
                info!("Unable to build wheel for {}", package.to_short_hand());
                self.write_failure_output(package, &outcome.output).await;
            }
            Err(err) => {
                // Best-effort pre-warming: a wheel that cannot be built now
                // gets another chance in the install pass.
                warn!(
                    "Unable to run wheel build for {}: {}",
                    package.to_short_hand(),
                    err
                );
            }
        }
    }

    async fn write_failure_output(&self, package: &PackageInfo, output: &str) {
        let path = self
            .report_dir
            .join(format!("wheel-build-{}.txt", package.to_short_hand()));
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        if let Err(err) = tokio::fs::write(&path, output).await {
            warn!(
                "Unable to write build output for {}: {}",
                package.to_short_hand(),
                err
            );
        }
    }
}
