//! Collaborator services.
//!
//! The layer core never touches virtual disks, storage filters or process
//! privileges directly. It goes through the traits in this module, so the
//! orchestration logic can run against the local host backend, a platform
//! backend, or a test double.

mod local;
mod naming;
mod privileges;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use lamina_common::{LaminaPaths, LayerId, ServiceResult};

use crate::layer::LayerData;

pub use local::LocalHost;
pub use naming::PathNamer;
pub use privileges::{CapabilityPrivileges, Privilege};

/// Access requested when opening a virtual disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiskAccess {
    /// No read or write access; enough to query the attached volume.
    #[default]
    None,
    /// Read-only access.
    ReadOnly,
    /// Read-write access.
    ReadWrite,
}

/// Flags for opening a virtual disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    /// Use cached I/O.
    pub cached_io: bool,
    /// Ignore the relative parent locator of differencing disks.
    pub ignore_relative_parent_locator: bool,
}

impl OpenFlags {
    /// Flags used when querying the mount path of an attached scratch disk.
    pub const QUERY: Self = Self {
        cached_io: true,
        ignore_relative_parent_locator: true,
    };
}

/// An open virtual disk.
///
/// Handles are not `Clone`; they must be returned to
/// [`VirtualDiskService::close`].
#[derive(Debug, PartialEq, Eq)]
pub struct DiskHandle {
    raw: u64,
    path: PathBuf,
}

impl DiskHandle {
    /// Create a handle for an opened disk.
    #[must_use]
    pub fn new(raw: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            raw,
            path: path.into(),
        }
    }

    /// The service-specific raw handle value.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.raw
    }

    /// The virtual disk this handle refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Virtual-disk attach/detach primitives.
#[async_trait]
pub trait VirtualDiskService: Send + Sync {
    /// Attach the disk at `path` to the host.
    async fn attach(&self, path: &Path) -> ServiceResult<()>;

    /// Detach a previously attached disk.
    async fn detach(&self, path: &Path) -> ServiceResult<()>;

    /// Open a handle to the disk at `path`.
    async fn open(
        &self,
        path: &Path,
        access: DiskAccess,
        flags: OpenFlags,
    ) -> ServiceResult<DiskHandle>;

    /// Close a handle returned by [`VirtualDiskService::open`].
    async fn close(&self, handle: DiskHandle);

    /// Whether the disk at `path` is currently attached.
    async fn is_attached(&self, path: &Path) -> ServiceResult<bool>;
}

/// Storage filter that composes a layer stack into one volume.
#[async_trait]
pub trait StorageFilterService: Send + Sync {
    /// Bind the read-only `layers` beneath the writable layer at `mount_root`.
    async fn attach_filter(&self, mount_root: &Path, layers: &LayerData) -> ServiceResult<()>;

    /// Remove the binding at `mount_root`.
    async fn detach_filter(&self, mount_root: &Path) -> ServiceResult<()>;

    /// Resolve the volume path of the composed stack behind `disk`.
    async fn resolve_mount_path(&self, disk: &DiskHandle) -> ServiceResult<String>;
}

/// Maps layer paths to stable IDs.
#[async_trait]
pub trait NamingService: Send + Sync {
    /// Stable ID for an absolute, normalized layer path.
    async fn path_to_stable_id(&self, path: &Path) -> ServiceResult<LayerId>;
}

/// Full recursive destruction of a layer.
#[async_trait]
pub trait DestroyService: Send + Sync {
    /// Destroy the layer at `path` and its backing resources.
    async fn destroy_layer(&self, path: &Path) -> ServiceResult<()>;
}

/// Process privilege elevation.
#[async_trait]
pub trait PrivilegeService: Send + Sync {
    /// Enable `privileges` for the current process.
    async fn enable_process_privileges(&self, privileges: &[Privilege]) -> ServiceResult<()>;

    /// Give up privileges enabled by [`PrivilegeService::enable_process_privileges`].
    async fn release_process_privileges(&self, privileges: &[Privilege]) -> ServiceResult<()>;
}

/// Creation of base-layer template disks.
#[async_trait]
pub trait BaseLayerService: Send + Sync {
    /// Create the base and template container disks of a base layer.
    async fn setup_base_layer(
        &self,
        layer: &Path,
        base_vhdx: &Path,
        template_vhdx: &Path,
        size_gb: u64,
    ) -> ServiceResult<()>;

    /// Create the base and template disks of a base layer's utility VM.
    async fn setup_utility_vm_base_layer(
        &self,
        uvm_path: &Path,
        base_vhdx: &Path,
        template_vhdx: &Path,
        size_gb: u64,
    ) -> ServiceResult<()>;
}

/// The full set of collaborators used by the layer core.
#[derive(Clone)]
pub struct LayerServices {
    /// Virtual-disk service.
    pub disks: Arc<dyn VirtualDiskService>,
    /// Storage-filter service.
    pub filters: Arc<dyn StorageFilterService>,
    /// Naming service.
    pub naming: Arc<dyn NamingService>,
    /// Destroy service.
    pub destroyer: Arc<dyn DestroyService>,
    /// Privilege service.
    pub privileges: Arc<dyn PrivilegeService>,
    /// Base-layer setup service.
    pub base_layers: Arc<dyn BaseLayerService>,
}

impl LayerServices {
    /// Services backed by the local host, keeping state under `paths`.
    #[must_use]
    pub fn local(paths: &LaminaPaths) -> Self {
        let host = Arc::new(LocalHost::new(paths.clone()));
        Self {
            disks: host.clone(),
            filters: host.clone(),
            naming: Arc::new(PathNamer),
            destroyer: host.clone(),
            privileges: Arc::new(CapabilityPrivileges),
            base_layers: host,
        }
    }
}

impl std::fmt::Debug for LayerServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerServices").finish_non_exhaustive()
    }
}
