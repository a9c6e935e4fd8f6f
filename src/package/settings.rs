//! Per-package build settings
//!
//! The orchestration layer supplies these to customize builds per package:
//! extra environment variables, option lists for the package manager, and
//! flags that force a source build. The trait's defaults are the no-op
//! answers, so simple callers only override what they need.

use crate::package::PackageInfo;
use std::collections::HashMap;
use std::path::PathBuf;

const PIP_EDITABLE: &str = "--editable";
const PIP_IGNORE_INSTALLED: &str = "--ignore-installed";

/// Per-package knobs consulted by the build decision engine.
///
/// Implementations must be shareable across worker tasks. Every accessor
/// returns an owned value; empty means "no requirement", never an error.
pub trait PackageSettings: Send + Sync {
    /// Extra build environment required for this package
    fn environment(&self, _package: &PackageInfo) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Global options for the package-manager invocation
    fn global_options(&self, _package: &PackageInfo) -> Vec<String> {
        Vec::new()
    }

    /// Options for the install step
    fn install_options(&self, _package: &PackageInfo) -> Vec<String> {
        Vec::new()
    }

    /// Options for the wheel build step
    fn build_options(&self, _package: &PackageInfo) -> Vec<String> {
        Vec::new()
    }

    /// Python versions (`major.minor`) the package supports; empty means
    /// no restriction
    fn supported_language_versions(&self, _package: &PackageInfo) -> Vec<String> {
        Vec::new()
    }

    /// Whether the package must always be rebuilt from source, even when a
    /// binary artifact is available
    fn requires_source_build(&self, _package: &PackageInfo) -> bool {
        false
    }

    /// Whether the package carries custom build configuration
    fn is_customized(&self, _package: &PackageInfo) -> bool {
        false
    }
}

/// Default settings: snapshots and the project itself rebuild from source,
/// everything else reuses binaries freely.
#[derive(Debug, Clone)]
pub struct DefaultPackageSettings {
    project_dir: PathBuf,
}

impl DefaultPackageSettings {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }

    fn is_project_directory(&self, package: &PackageInfo) -> bool {
        package.is_directory() && package.package_file == self.project_dir
    }

    fn is_snapshot(package: &PackageInfo) -> bool {
        package
            .version
            .as_deref()
            .is_some_and(|version| version.contains('-'))
    }
}

impl PackageSettings for DefaultPackageSettings {
    fn install_options(&self, package: &PackageInfo) -> Vec<String> {
        let mut options = Vec::new();

        // always reinstall snapshots
        if Self::is_snapshot(package) || self.requires_source_build(package) {
            options.push(PIP_IGNORE_INSTALLED.to_string());
        }

        // The current project is installed editable. This option must stay
        // last: pip expects the directory name right after it.
        if self.is_project_directory(package) {
            options.push(PIP_EDITABLE.to_string());
        }

        options
    }

    fn requires_source_build(&self, package: &PackageInfo) -> bool {
        // always rebuild the project package itself
        if self.is_project_directory(package) {
            return true;
        }
        // pre-release versions carry a '-'; always rebuild those
        Self::is_snapshot(package)
    }
}

/// Merge environments in order; later sources win on key collisions
pub fn merge_environments(sources: &[&HashMap<String, String>]) -> HashMap<String, String> {
    let mut merged = HashMap::new();
    for source in sources {
        merged.extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}
