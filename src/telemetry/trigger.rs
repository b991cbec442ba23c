//! External trigger signals that push the simulated host into its attack profile.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Externally toggled boolean. The scoring core never sees where it comes from.
pub trait TriggerSource: Send + Sync {
    fn is_active(&self) -> bool;
}

/// Active while a marker file exists (`touch trigger.txt` to start an attack,
/// delete it to stop).
#[derive(Debug, Clone)]
pub struct FileTrigger {
    path: PathBuf,
}

impl FileTrigger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TriggerSource for FileTrigger {
    fn is_active(&self) -> bool {
        self.path.exists()
    }
}

/// In-process trigger backed by a shared flag. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct ManualTrigger {
    flag: Arc<AtomicBool>,
}

impl ManualTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, active: bool) {
        self.flag.store(active, Ordering::Relaxed);
    }
}

impl TriggerSource for ManualTrigger {
    fn is_active(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
