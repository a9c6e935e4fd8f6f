//! Interpreter ABI compatibility registry
//!
//! Each target interpreter is probed once per session to enumerate every
//! (python tag, abi tag, platform tag) triple it can consume. The registry
//! answers whether a candidate wheel's tags are acceptable for a given
//! interpreter. Triples recorded for one interpreter never satisfy queries
//! for another.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// One ABI triple a given interpreter accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiDetails {
    pub python_executable: PathBuf,
    pub python_tag: String,
    pub abi_tag: String,
    pub platform_tag: String,
}

impl AbiDetails {
    pub fn new(
        python_executable: impl Into<PathBuf>,
        python_tag: impl Into<String>,
        abi_tag: impl Into<String>,
        platform_tag: impl Into<String>,
    ) -> Self {
        Self {
            python_executable: python_executable.into(),
            python_tag: python_tag.into(),
            abi_tag: abi_tag.into(),
            platform_tag: platform_tag.into(),
        }
    }
}

/// Registry of every ABI triple the session's interpreters support.
///
/// Starts empty and is populated by the interpreter probe before first use.
/// Queries against an unpopulated registry return `false`, never an error.
/// Shared across worker tasks: writes happen once up front, reads many
/// times after.
#[derive(Debug, Default)]
pub struct AbiContainer {
    supported_abis: RwLock<Vec<AbiDetails>>,
}

impl AbiContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one supported triple for an interpreter
    pub fn add_supported_abi(&self, triple: AbiDetails) {
        let mut abis = self
            .supported_abis
            .write()
            .expect("abi registry lock poisoned");
        abis.push(triple);
        debug!("Available ABIs: {:?}", *abis);
    }

    /// Check whether a candidate wheel's tags are acceptable for the
    /// interpreter at `python_executable`.
    ///
    /// Each candidate tag may be a dot-separated list of alternatives
    /// (`cp38.cp39`). A recorded triple matches when its python tag, abi
    /// tag, and platform tag are each members of the respective candidate
    /// set - three independent membership tests, all required.
    pub fn matches_supported_version(
        &self,
        python_executable: &Path,
        python_tag: &str,
        abi_tag: &str,
        platform_tag: &str,
    ) -> bool {
        let python_tags: Vec<&str> = python_tag.split('.').collect();
        let abi_tags: Vec<&str> = abi_tag.split('.').collect();
        let platform_tags: Vec<&str> = platform_tag.split('.').collect();

        self.supported_abis
            .read()
            .expect("abi registry lock poisoned")
            .iter()
            .filter(|triple| triple.python_executable == python_executable)
            .any(|triple| {
                python_tags.contains(&triple.python_tag.as_str())
                    && abi_tags.contains(&triple.abi_tag.as_str())
                    && platform_tags.contains(&triple.platform_tag.as_str())
            })
    }
}
