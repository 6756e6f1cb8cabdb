//! Mount sequencing with rollback.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use lamina_common::{DiskLayout, LayerError, LayerResult};

use super::{MountHandle, MountRegistry, MountState};
use crate::layer::{Layer, LayerStack};
use crate::rollback::Rollback;
use crate::services::{DiskAccess, OpenFlags, StorageFilterService, VirtualDiskService};

/// Mounts layer stacks.
#[derive(Clone)]
pub struct MountOrchestrator {
    disks: Arc<dyn VirtualDiskService>,
    filters: Arc<dyn StorageFilterService>,
    registry: MountRegistry,
}

impl MountOrchestrator {
    /// Create an orchestrator recording live mounts in `registry`.
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

    /// Mount `stack`, whose top layer must be its scratch layer.
    ///
    /// # Errors
    ///
    /// - [`LayerError::InvalidArgument`] if the stack has no scratch layer.
    /// - [`LayerError::AlreadyMounted`] if this process already mounts it.
    /// - [`LayerError::NotFound`] if the sandbox disk is missing.
    /// - [`LayerError::AttachFailed`], [`LayerError::FilterAttachFailed`] or
    ///   [`LayerError::ResolveFailed`] for the failing step, after everything
    ///   acquired before it has been released.
    pub async fn mount(&self, stack: &LayerStack) -> LayerResult<MountHandle> {
        let scratch = stack.scratch().ok_or_else(|| {
            LayerError::invalid("the top layer of a mount stack must be a scratch layer")
        })?;
        let root = scratch.path();

        self.registry.claim(root)?;
        match self.mount_claimed(root, stack).await {
            Ok(handle) => {
                tracing::info!(
                    scratch = %root.display(),
                    mount_path = %handle.mount_path(),
                    layers = handle.layers().len(),
                    "Layer stack mounted"
                );
                self.registry.complete(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                self.registry.release(root);
                Err(e)
            }
        }
    }

    async fn mount_claimed(&self, root: &Path, stack: &LayerStack) -> LayerResult<MountHandle> {
        let disk = DiskLayout::CONTAINER.sandbox_path(root);
        match tokio::fs::metadata(&disk).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return Err(LayerError::NotFound { path: disk }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LayerError::NotFound { path: disk });
            }
            Err(source) => return Err(LayerError::StatFailed { path: disk, source }),
        }

        let mut state = MountState::Unmounted;
        let mut rollback = Rollback::new("mount");

        self.disks
            .attach(&disk)
            .await
            .map_err(|source| LayerError::AttachFailed {
                path: disk.clone(),
                source,
            })?;
        transition(root, &mut state, MountState::VhdAttached);
        {
            let disks = self.disks.clone();
            let disk = disk.clone();
            rollback.push("detach sandbox disk", move || async move {
                disks
                    .detach(&disk)
                    .await
                    .map_err(|source| LayerError::DetachFailed { path: disk, source })
            });
        }

        let layers = stack.descriptor();
        if let Err(source) = self.filters.attach_filter(root, &layers).await {
            let error = LayerError::FilterAttachFailed {
                path: root.to_path_buf(),
                source,
            };
            return Err(abort(root, state, rollback, error).await);
        }
        transition(root, &mut state, MountState::FilterAttached);
        {
            let filters = self.filters.clone();
            let root = root.to_path_buf();
            rollback.push("detach storage filter", move || async move {
                filters
                    .detach_filter(&root)
                    .await
                    .map_err(|source| LayerError::FilterDetachFailed { path: root, source })
            });
        }

        let mount_path = match self.resolve(&disk).await {
            Ok(mount_path) => mount_path,
            Err(error) => return Err(abort(root, state, rollback, error).await),
        };
        transition(root, &mut state, MountState::Mounted);
        rollback.disarm();

        Ok(MountHandle::new(
            root.to_path_buf(),
            disk,
            mount_path,
            stack.parents().iter().map(Layer::id).collect(),
        ))
    }

    /// Open the attached disk just long enough to query its volume path.
    async fn resolve(&self, disk: &Path) -> LayerResult<String> {
        let failed = |source| LayerError::ResolveFailed {
            path: disk.to_path_buf(),
            source,
        };

        let handle = self
            .disks
            .open(disk, DiskAccess::None, OpenFlags::QUERY)
            .await
            .map_err(failed)?;
        let resolved = self.filters.resolve_mount_path(&handle).await;
        self.disks.close(handle).await;

        resolved.map_err(failed)
    }
}

impl std::fmt::Debug for MountOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountOrchestrator")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn transition(root: &Path, state: &mut MountState, next: MountState) {
    tracing::debug!(
        scratch = %root.display(),
        from = %state,
        to = %next,
        "Mount state changed"
    );
    *state = next;
}

/// Release everything acquired so far and hand back the error that caused it.
async fn abort(
    root: &Path,
    state: MountState,
    rollback: Rollback,
    error: LayerError,
) -> LayerError {
    tracing::debug!(
        scratch = %root.display(),
        from = %state,
        to = %MountState::Failed,
        error = %error,
        "Mount state changed"
    );
    let failures = rollback.unwind(&error).await;
    if !failures.is_empty() {
        tracing::warn!(
            scratch = %root.display(),
            failed = failures.len(),
            "Mount rollback left resources behind"
        );
    }
    error
}
