//! On/off signals consulted before every dispatcher operation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// External signal that turns all publish/subscribe activity off.
pub trait EnableSwitch: Send + Sync {
    /// Check if the dispatcher may run.
    fn is_enabled(&self) -> bool;
}

/// Disabled while a marker file exists.
///
/// The file is checked on every call, so creating or removing it takes
/// effect without restarting the host.
#[derive(Debug, Clone)]
pub struct MarkerFileSwitch {
    marker: PathBuf,
}

impl MarkerFileSwitch {
    /// Create a switch watching `marker`.
    pub fn new(marker: impl Into<PathBuf>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// Watched marker location.
    pub fn marker(&self) -> &Path {
        &self.marker
    }
}

impl EnableSwitch for MarkerFileSwitch {
    fn is_enabled(&self) -> bool {
        !self.marker.exists()
    }
}

/// In-memory switch.
#[derive(Debug)]
pub struct FlagSwitch {
    enabled: AtomicBool,
}

impl FlagSwitch {
    /// Create a switch in the given state.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Turn dispatching on.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Turn dispatching off.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }
}

impl Default for FlagSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}

impl EnableSwitch for FlagSwitch {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}
