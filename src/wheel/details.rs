//! Wheel file name parsing
//!
//! Wheel names follow the PEP 427 shape
//! `dist-version(-build)?-pythontag-abitag-platformtag.whl`, with the dist
//! and version segments using underscores in place of hyphens. Parsing is
//! purely structural: tag vocabulary is not validated here.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

// PEP-0427. The optional build tag must start with a digit.
static WHEEL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<dist>.+?)-(?P<version>\d.*?)(-\d.*?)?-(?P<python_tag>.+?)-(?P<abi_tag>.+?)-(?P<platform_tag>.+?)\.whl$",
    )
    .expect("wheel pattern is valid")
});

// Versions published from snapshot builds end in `_SUFFIX`; the cache keys
// them with a hyphen instead.
static SNAPSHOT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_(?P<snapshot>[A-Z]+)$").expect("snapshot pattern is valid"));

/// The fields encoded in one wheel file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelDetails {
    /// The file the details were parsed from
    pub file: PathBuf,
    /// Distribution name segment
    pub dist: String,
    /// Version segment, snapshot suffix normalized to `-SUFFIX`
    pub version: String,
    /// Python tag, possibly a dot-separated list (`cp38.cp39`)
    pub python_tag: String,
    /// ABI tag, possibly a dot-separated list
    pub abi_tag: String,
    /// Platform tag, possibly a dot-separated list
    pub platform_tag: String,
}

impl WheelDetails {
    /// Parse a wheel file name into its tagged fields.
    ///
    /// Total: a name that does not match the grammar yields `None`, never
    /// an error.
    pub fn from_path(file: &Path) -> Option<WheelDetails> {
        let name = file.file_name()?.to_str()?;
        let captures = WHEEL_PATTERN.captures(name)?;

        let matched_version = &captures["version"];
        let version = SNAPSHOT_PATTERN
            .replace(matched_version, "-$snapshot")
            .into_owned();

        Some(WheelDetails {
            file: file.to_path_buf(),
            dist: captures["dist"].to_string(),
            version,
            python_tag: captures["python_tag"].to_string(),
            abi_tag: captures["abi_tag"].to_string(),
            platform_tag: captures["platform_tag"].to_string(),
        })
    }

    /// Format the details back into a wheel file name.
    ///
    /// Hyphens in dist and version become underscores, per the grammar.
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}-{}-{}.whl",
            self.dist.replace('-', "_"),
            self.version.replace('-', "_"),
            self.python_tag,
            self.abi_tag,
            self.platform_tag
        )
    }
}
