//! Package identity and per-package build settings
//!
//! A package request is a source artifact on disk: a versioned sdist
//! archive, or a directory for an in-progress local project. Identity
//! (name, version) is derived from the file name.

pub mod settings;

pub use settings::{merge_environments, DefaultPackageSettings, PackageSettings};

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

// Archive suffixes a source distribution can carry.
const SDIST_SUFFIXES: &[&str] = &[".tar.gz", ".tgz", ".tar.bz2", ".zip"];

// Splits `name-1.2.3[-SUFFIX]` at the last hyphen that starts the version.
static NAME_VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<name>.+)-(?P<version>\d.*)$").expect("pattern is valid"));

/// Identity of one requested package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    /// The source artifact: an sdist archive or a project directory
    pub package_file: PathBuf,
    /// Distribution name
    pub name: String,
    /// Version, `None` exactly when the source is an unversioned directory
    pub version: Option<String>,
}

impl PackageInfo {
    /// Derive package identity from a source path.
    ///
    /// Versioned archives (`foo-1.2.3.tar.gz`) yield name and version;
    /// directories and unversioned sources yield a name only. Paths
    /// without a usable file name yield `None`.
    pub fn from_path(path: &Path) -> Option<PackageInfo> {
        let file_name = path.file_name()?.to_str()?;

        let stem = SDIST_SUFFIXES
            .iter()
            .find_map(|suffix| file_name.strip_suffix(suffix))
            .unwrap_or(file_name);

        let (name, version) = match NAME_VERSION_PATTERN.captures(stem) {
            Some(captures) => (
                captures["name"].to_string(),
                Some(captures["version"].to_string()),
            ),
            None => (stem.to_string(), None),
        };

        Some(PackageInfo {
            package_file: path.to_path_buf(),
            name,
            version,
        })
    }

    /// Whether the source is an unversioned directory (an in-progress
    /// project rather than a released archive)
    pub fn is_directory(&self) -> bool {
        self.version.is_none() && self.package_file.is_dir()
    }

    /// `name-version` for diagnostics, or just the name when unversioned
    pub fn to_short_hand(&self) -> String {
        match &self.version {
            Some(version) => format!("{}-{}", self.name, version),
            None => self.name.clone(),
        }
    }
}
