//! Unmounting layer stacks.

use std::sync::Arc;

use chrono::Utc;
use lamina_common::{DiskLayout, LayerError, LayerResult};

use super::MountRegistry;
use crate::layer::LayerStack;
use crate::services::{StorageFilterService, VirtualDiskService};

/// Which parts of a mount to tear down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmountOperation {
    /// Detach the storage filter only.
    Filter,
    /// Detach the sandbox disk only.
    Disk,
    /// Detach the filter, then the disk.
    #[default]
    All,
}

impl UnmountOperation {
    const fn detaches_filter(self) -> bool {
        matches!(self, Self::Filter | Self::All)
    }

    const fn detaches_disk(self) -> bool {
        matches!(self, Self::Disk | Self::All)
    }
}

impl std::fmt::Display for UnmountOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Filter => write!(f, "filter"),
            Self::Disk => write!(f, "disk"),
            Self::All => write!(f, "all"),
        }
    }
}

/// Reverses mounts made by [`MountOrchestrator`](super::MountOrchestrator).
///
/// Steps are not rolled back; after a failure the caller may retry what is
/// left, e.g. with [`UnmountOperation::Disk`] once the filter is gone.
#[derive(Clone)]
pub struct UnmountOrchestrator {
    disks: Arc<dyn VirtualDiskService>,
    filters: Arc<dyn StorageFilterService>,
    registry: MountRegistry,
}

impl UnmountOrchestrator {
    /// Create an orchestrator sharing `registry` with the mount side.
    pub fn new(
        disks: Arc<dyn VirtualDiskService>,
        filters: Arc<dyn StorageFilterService>,
        registry: MountRegistry,
    ) -> Self {
        Self {
            disks,
            filters,
            registry,
        }
    }

    /// Unmount the stack whose top layer is the mounted scratch layer.
    ///
    /// # Errors
    ///
    /// - [`LayerError::InvalidArgument`] if the stack is empty.
    /// - [`LayerError::FilterDetachFailed`]; the disk is then left attached.
    /// - [`LayerError::DetachFailed`].
    pub async fn unmount(
        &self,
        stack: &LayerStack,
        operation: UnmountOperation,
    ) -> LayerResult<()> {
        let top = stack
            .top()
            .ok_or_else(|| LayerError::invalid("cannot unmount an empty layer stack"))?;
        let root = top.path();

        if operation.detaches_filter() {
            self.filters
                .detach_filter(root)
                .await
                .map_err(|source| LayerError::FilterDetachFailed {
                    path: root.to_path_buf(),
                    source,
                })?;
            let mounted_secs = self
                .registry
                .remove(root)
                .map(|handle| (Utc::now() - handle.mounted_at()).num_seconds());
            tracing::debug!(scratch = %root.display(), ?mounted_secs, "Storage filter detached");
        }

        if operation.detaches_disk() {
            let disk = DiskLayout::CONTAINER.sandbox_path(root);
            self.disks
                .detach(&disk)
                .await
                .map_err(|source| LayerError::DetachFailed { path: disk, source })?;
            tracing::debug!(scratch = %root.display(), "Sandbox disk detached");
        }

        tracing::info!(scratch = %root.display(), %operation, "Layer stack unmounted");
        Ok(())
    }
}

impl std::fmt::Debug for UnmountOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnmountOrchestrator")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
