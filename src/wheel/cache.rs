//! Layered wheel cache
//!
//! An ordered list of cache directories searched most-specific first. The
//! first layer is the only write target for freshly built wheels; the
//! remaining layers receive promoted copies of wheels known good. The
//! search order lets a project-local wheel win over a stale host-wide one,
//! while promotion lets other builds benefit from a finished wheel.
//!
//! Cache directories are shared across processes. Stores are idempotent
//! (destination-already-exists is success) and staged through a temp file
//! so concurrent builders racing on the same wheel cannot corrupt it.

use crate::error::{WheelhouseError, WheelhouseResult};
use crate::python::PythonDetails;
use crate::wheel::abi::AbiContainer;
use crate::wheel::details::WheelDetails;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identifier for one cache layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheLayer {
    /// Project-local layer, the write target for fresh builds
    Project,
    /// Host-wide layer shared between projects
    Host,
}

impl fmt::Display for CacheLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project => write!(f, "project"),
            Self::Host => write!(f, "host"),
        }
    }
}

/// Session-scoped readiness signal.
///
/// Starts set. Cleared when any required wheel could not be produced or
/// located; once cleared it stays cleared for the life of the session, so
/// concurrent clearers cannot race incorrectly. The final state tells the
/// orchestration layer whether a full rebuild pass is needed.
#[derive(Debug, Clone)]
pub struct ReadinessLatch {
    ready: Arc<AtomicBool>,
}

impl Default for ReadinessLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessLatch {
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// One-way: the latch never goes back to ready within a session
    pub fn clear(&self) {
        self.ready.store(false, Ordering::Release);
    }
}

/// Outcome of a store attempt that did not hard-fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Copied into the layer
    Stored,
    /// Another writer got there first; contents are identical by
    /// construction, so this is success
    AlreadyPresent,
    /// The layer directory is missing and could not be created
    LayerUnavailable,
    /// The source file disappeared before it could be copied
    SourceVanished,
}

/// Wheel cache spanning an ordered list of layers.
///
/// Layer order is priority order: lookups scan front to back and the first
/// layer is the write target. Compatibility of candidate wheels is decided
/// by the shared [`AbiContainer`].
#[derive(Debug)]
pub struct LayeredWheelCache {
    layers: Vec<(CacheLayer, PathBuf)>,
    abi_container: Arc<AbiContainer>,
    ready: ReadinessLatch,
}

impl LayeredWheelCache {
    pub fn new(layers: Vec<(CacheLayer, PathBuf)>, abi_container: Arc<AbiContainer>) -> Self {
        Self {
            layers,
            abi_container,
            ready: ReadinessLatch::new(),
        }
    }

    /// Layer identifiers in priority order
    pub fn layer_ids(&self) -> Vec<CacheLayer> {
        self.layers.iter().map(|(layer, _)| *layer).collect()
    }

    /// The write layer, if any layer is configured
    pub fn write_layer(&self) -> Option<CacheLayer> {
        self.layers.first().map(|(layer, _)| *layer)
    }

    /// Directory of the write layer. Callers use absence to decide that
    /// building is not possible this session.
    pub fn target_dir(&self) -> Option<&Path> {
        self.layers.first().map(|(_, dir)| dir.as_path())
    }

    fn layer_dir(&self, layer: CacheLayer) -> Option<&Path> {
        self.layers
            .iter()
            .find(|(id, _)| *id == layer)
            .map(|(_, dir)| dir.as_path())
    }

    /// Find a wheel for (name, version) across all layers in priority order
    pub fn find_wheel(
        &self,
        name: &str,
        version: &str,
        python: &PythonDetails,
    ) -> Option<PathBuf> {
        self.layers
            .iter()
            .find_map(|(layer, _)| self.find_wheel_in_layer(name, version, python, *layer))
    }

    /// Find a wheel for (name, version) in one layer.
    ///
    /// Absence is `None`, never an error: an unconfigured or unlistable
    /// layer simply yields no wheel.
    pub fn find_wheel_in_layer(
        &self,
        name: &str,
        version: &str,
        python: &PythonDetails,
        layer: CacheLayer,
    ) -> Option<PathBuf> {
        let cache_dir = self.layer_dir(layer)?;

        // The prefix must end with a hyphen, otherwise version 0.0.2 would
        // match 0.0.20. Both name and version use underscores in wheel file
        // names, per PEP 427.
        let prefix = format!(
            "{}-{}-",
            name.replace('-', "_"),
            version.replace('-', "_")
        );
        debug!(
            "Searching {} layer for {} {} with prefix {}",
            layer, name, version, prefix
        );

        let entries = fs::read_dir(cache_dir).ok()?;
        let found = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".whl"))
            })
            .filter_map(|path| WheelDetails::from_path(&path))
            .find(|details| self.wheel_matches(python, details));

        if let Some(details) = &found {
            debug!("Found wheel: {}", details.file.display());
        }

        found.map(|details| details.file)
    }

    /// Store a wheel into one layer.
    ///
    /// Idempotent: a destination that already exists is a benign no-op. A
    /// missing layer directory is created and the store retried once; if
    /// creation fails the store is skipped and logged. A source file that
    /// vanished underneath us (race with another process) is logged and,
    /// when the affected layer is the write layer, clears the readiness
    /// latch. Any other I/O failure propagates.
    pub fn store_wheel(
        &self,
        wheel: &Path,
        layer: CacheLayer,
    ) -> WheelhouseResult<StoreOutcome> {
        let Some(cache_dir) = self.layer_dir(layer) else {
            debug!("No {} layer configured, skipping store", layer);
            return Ok(StoreOutcome::LayerUnavailable);
        };

        let file_name = wheel
            .file_name()
            .ok_or_else(|| WheelhouseError::PathInvalid {
                path: wheel.to_path_buf(),
                reason: "wheel path has no file name".to_string(),
            })?;
        let destination = cache_dir.join(file_name);

        if destination.exists() {
            debug!(
                "{} already present in {} layer",
                destination.display(),
                layer
            );
            return Ok(StoreOutcome::AlreadyPresent);
        }

        let mut attempt = copy_into_place(wheel, &destination, cache_dir);
        if let Err(err) = &attempt {
            if err.kind() == io::ErrorKind::NotFound && !cache_dir.exists() {
                if let Err(create_err) = fs::create_dir_all(cache_dir) {
                    warn!(
                        "Unable to create {} layer directory {}: {}",
                        layer,
                        cache_dir.display(),
                        create_err
                    );
                    return Ok(StoreOutcome::LayerUnavailable);
                }
                attempt = copy_into_place(wheel, &destination, cache_dir);
            }
        }

        match attempt {
            Ok(()) => {
                info!("Stored {} in {} layer", destination.display(), layer);
                Ok(StoreOutcome::Stored)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound && !wheel.exists() => {
                warn!(
                    "{} vanished before it could be stored in the {} layer",
                    wheel.display(),
                    layer
                );
                if self.write_layer() == Some(layer) {
                    self.ready.clear();
                }
                Ok(StoreOutcome::SourceVanished)
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Ok(StoreOutcome::AlreadyPresent)
            }
            Err(err) => Err(WheelhouseError::io(
                format!(
                    "storing {} in the {} layer",
                    wheel.display(),
                    layer
                ),
                err,
            )),
        }
    }

    /// Store a wheel into every configured layer
    pub fn store_wheel_all(&self, wheel: &Path) -> WheelhouseResult<()> {
        for layer in self.layer_ids() {
            self.store_wheel(wheel, layer)?;
        }
        Ok(())
    }

    /// Whether every required wheel has been produced or located so far
    pub fn is_ready(&self) -> bool {
        self.ready.is_ready()
    }

    /// Update the readiness signal.
    ///
    /// The latch is monotonic: setting it back to `true` after a clear is
    /// ignored, so a late success cannot mask an earlier failure.
    pub fn set_ready(&self, ready: bool) {
        if ready {
            debug!("Ignoring attempt to re-set readiness within a session");
        } else {
            self.ready.clear();
        }
    }

    /// A handle on the readiness latch for collaborators that outlive the
    /// cache borrow
    pub fn readiness(&self) -> ReadinessLatch {
        self.ready.clone()
    }

    fn wheel_matches(&self, python: &PythonDetails, details: &WheelDetails) -> bool {
        self.abi_container.matches_supported_version(
            python.interpreter(),
            &details.python_tag,
            &details.abi_tag,
            &details.platform_tag,
        )
    }
}

/// Stage next to the destination so the final rename is atomic on the same
/// filesystem. `fs::copy` preserves permission bits.
fn copy_into_place(source: &Path, destination: &Path, cache_dir: &Path) -> io::Result<()> {
    let staging = tempfile::Builder::new()
        .prefix(".wheelhouse-")
        .tempfile_in(cache_dir)?;
    fs::copy(source, staging.path())?;
    staging.persist(destination).map_err(|err| err.error)?;
    Ok(())
}
