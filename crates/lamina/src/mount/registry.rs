//! In-process registry of live mounts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lamina_common::{LayerError, LayerId, LayerResult};
use parking_lot::Mutex;
use serde::Serialize;

/// A mounted layer stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountHandle {
    scratch: PathBuf,
    disk: PathBuf,
    mount_path: String,
    layers: Vec<LayerId>,
    mounted_at: DateTime<Utc>,
}

impl MountHandle {
    pub(crate) fn new(
        scratch: PathBuf,
        disk: PathBuf,
        mount_path: String,
        layers: Vec<LayerId>,
    ) -> Self {
        Self {
            scratch,
            disk,
            mount_path,
            layers,
            mounted_at: Utc::now(),
        }
    }

    /// The scratch layer, which is also the filter mount root.
    #[must_use]
    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    /// The attached sandbox disk.
    #[must_use]
    pub fn disk(&self) -> &Path {
        &self.disk
    }

    /// Volume path of the composed stack.
    #[must_use]
    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }

    /// IDs of the read-only parents, most specific first.
    #[must_use]
    pub fn layers(&self) -> &[LayerId] {
        &self.layers
    }

    /// When the stack was mounted.
    #[must_use]
    pub const fn mounted_at(&self) -> DateTime<Utc> {
        self.mounted_at
    }
}

#[derive(Debug)]
enum Slot {
    Mounting,
    Mounted(MountHandle),
}

/// Tracks scratch layers that are mounted or being mounted by this process.
///
/// Cloning shares the underlying table.
#[derive(Debug, Clone, Default)]
pub struct MountRegistry {
    slots: Arc<Mutex<HashMap<PathBuf, Slot>>>,
}

impl MountRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `scratch` for a mount in progress.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::AlreadyMounted`] if it is mounted or mounting.
    pub fn claim(&self, scratch: &Path) -> LayerResult<()> {
        let mut slots = self.slots.lock();
        if slots.contains_key(scratch) {
            return Err(LayerError::AlreadyMounted {
                path: scratch.to_path_buf(),
            });
        }
        slots.insert(scratch.to_path_buf(), Slot::Mounting);
        Ok(())
    }

    /// Drop a reservation made by [`Self::claim`] after a failed mount.
    pub fn release(&self, scratch: &Path) {
        let mut slots = self.slots.lock();
        if matches!(slots.get(scratch), Some(Slot::Mounting)) {
            slots.remove(scratch);
        }
    }

    /// Record a completed mount.
    pub fn complete(&self, handle: MountHandle) {
        self.slots
            .lock()
            .insert(handle.scratch.clone(), Slot::Mounted(handle));
    }

    /// Forget a mount, returning its handle if it was complete.
    pub fn remove(&self, scratch: &Path) -> Option<MountHandle> {
        match self.slots.lock().remove(scratch) {
            Some(Slot::Mounted(handle)) => Some(handle),
            _ => None,
        }
    }

    /// Handle of a completed mount.
    #[must_use]
    pub fn get(&self, scratch: &Path) -> Option<MountHandle> {
        match self.slots.lock().get(scratch) {
            Some(Slot::Mounted(handle)) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Check if `path` is mounted or being mounted.
    #[must_use]
    pub fn is_live(&self, path: &Path) -> bool {
        self.slots.lock().contains_key(path)
    }

    /// All completed mounts.
    #[must_use]
    pub fn live(&self) -> Vec<MountHandle> {
        self.slots
            .lock()
            .values()
            .filter_map(|slot| match slot {
                Slot::Mounted(handle) => Some(handle.clone()),
                Slot::Mounting => None,
            })
            .collect()
    }
}
