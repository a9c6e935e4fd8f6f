//! Target interpreter description
//!
//! A build session targets one virtualenv interpreter. Cache lookups key
//! their compatibility checks on the interpreter executable path, so two
//! interpreters never share ABI answers.

use std::path::{Path, PathBuf};

/// Parsed interpreter version, `major.minor[.micro]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
}

impl PythonVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse a dotted version string such as `3.8` or `3.8.10`
    pub fn parse(version: &str) -> Option<Self> {
        let mut parts = version.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        Some(Self { major, minor })
    }

    /// The `major.minor` form used for supported-version checks
    pub fn major_minor(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

/// The virtualenv interpreter a build session targets
#[derive(Debug, Clone)]
pub struct PythonDetails {
    /// Interpreter executable inside the virtualenv
    pub interpreter: PathBuf,
    /// pip entry point inside the virtualenv
    pub pip: PathBuf,
    /// Interpreter version
    pub version: PythonVersion,
}

impl PythonDetails {
    pub fn new(
        interpreter: impl Into<PathBuf>,
        pip: impl Into<PathBuf>,
        version: PythonVersion,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            pip: pip.into(),
            version,
        }
    }

    /// The executable path used as the compatibility-registry key
    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }
}
