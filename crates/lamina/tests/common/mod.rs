//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use lamina::layer::LayerData;
use lamina::services::{
    BaseLayerService, DestroyService, DiskAccess, DiskHandle, OpenFlags, PathNamer, Privilege,
    PrivilegeService, StorageFilterService, VirtualDiskService,
};
use lamina::{LayerConfig, LayerManager, LayerServices};
use lamina_common::{CONTENT_DIR, ServiceError, ServiceResult};
use parking_lot::Mutex;

/// A collaborator call observed by [`FakeHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Attach(PathBuf),
    Detach(PathBuf),
    AttachFilter { root: PathBuf, layers: usize },
    DetachFilter(PathBuf),
    Open(PathBuf),
    Resolve(PathBuf),
    Close(PathBuf),
    Destroy(PathBuf),
    Enable,
    Release,
}

/// A call that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Attach,
    Detach,
    AttachFilter,
    DetachFilter,
    Open,
    Resolve,
    Destroy,
    Privileges,
}

/// In-memory disk, filter, destroy and privilege services that record
/// every call.
#[derive(Debug, Default)]
pub struct FakeHost {
    calls: Mutex<Vec<Call>>,
    attached: Mutex<HashSet<PathBuf>>,
    bound: Mutex<HashMap<PathBuf, LayerData>>,
    failing: Mutex<HashSet<Step>>,
    next_handle: AtomicU64,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, step: Step) {
        self.failing.lock().insert(step);
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn attached(&self, disk: &Path) -> bool {
        self.attached.lock().contains(disk)
    }

    pub fn bound(&self, root: &Path) -> Option<LayerData> {
        self.bound.lock().get(root).cloned()
    }

    pub fn is_idle(&self) -> bool {
        self.attached.lock().is_empty() && self.bound.lock().is_empty()
    }

    pub fn services(self: &Arc<Self>) -> LayerServices {
        LayerServices {
            disks: self.clone(),
            filters: self.clone(),
            naming: Arc::new(PathNamer),
            destroyer: self.clone(),
            privileges: self.clone(),
            base_layers: self.clone(),
        }
    }

    pub fn manager(self: &Arc<Self>) -> LayerManager {
        LayerManager::new(self.services(), &LayerConfig::default())
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn check(&self, step: Step) -> ServiceResult<()> {
        if self.failing.lock().contains(&step) {
            Err(ServiceError::rejected(format!("injected {step:?} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VirtualDiskService for FakeHost {
    async fn attach(&self, path: &Path) -> ServiceResult<()> {
        self.record(Call::Attach(path.to_path_buf()));
        self.check(Step::Attach)?;
        if !self.attached.lock().insert(path.to_path_buf()) {
            return Err(ServiceError::Busy {
                resource: path.display().to_string(),
            });
        }
        Ok(())
    }

    async fn detach(&self, path: &Path) -> ServiceResult<()> {
        self.record(Call::Detach(path.to_path_buf()));
        self.check(Step::Detach)?;
        if !self.attached.lock().remove(path) {
            return Err(ServiceError::NotAttached {
                resource: path.display().to_string(),
            });
        }
        Ok(())
    }

    async fn open(
        &self,
        path: &Path,
        _access: DiskAccess,
        _flags: OpenFlags,
    ) -> ServiceResult<DiskHandle> {
        self.record(Call::Open(path.to_path_buf()));
        self.check(Step::Open)?;
        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        Ok(DiskHandle::new(raw, path))
    }

    async fn close(&self, handle: DiskHandle) {
        self.record(Call::Close(handle.path().to_path_buf()));
    }

    async fn is_attached(&self, path: &Path) -> ServiceResult<bool> {
        Ok(self.attached(path))
    }
}

#[async_trait]
impl StorageFilterService for FakeHost {
    async fn attach_filter(&self, mount_root: &Path, layers: &LayerData) -> ServiceResult<()> {
        self.record(Call::AttachFilter {
            root: mount_root.to_path_buf(),
            layers: layers.layers.len(),
        });
        self.check(Step::AttachFilter)?;
        self.bound
            .lock()
            .insert(mount_root.to_path_buf(), layers.clone());
        Ok(())
    }

    async fn detach_filter(&self, mount_root: &Path) -> ServiceResult<()> {
        self.record(Call::DetachFilter(mount_root.to_path_buf()));
        self.check(Step::DetachFilter)?;
        if self.bound.lock().remove(mount_root).is_none() {
            return Err(ServiceError::NotAttached {
                resource: mount_root.display().to_string(),
            });
        }
        Ok(())
    }

    async fn resolve_mount_path(&self, disk: &DiskHandle) -> ServiceResult<String> {
        self.record(Call::Resolve(disk.path().to_path_buf()));
        self.check(Step::Resolve)?;
        Ok(format!("\\\\?\\Volume{{fake-{}}}\\", disk.raw()))
    }
}

#[async_trait]
impl DestroyService for FakeHost {
    async fn destroy_layer(&self, path: &Path) -> ServiceResult<()> {
        self.record(Call::Destroy(path.to_path_buf()));
        self.check(Step::Destroy)?;
        tokio::fs::remove_dir_all(path).await?;
        Ok(())
    }
}

#[async_trait]
impl PrivilegeService for FakeHost {
    async fn enable_process_privileges(&self, _privileges: &[Privilege]) -> ServiceResult<()> {
        self.record(Call::Enable);
        self.check(Step::Privileges)
    }

    async fn release_process_privileges(&self, _privileges: &[Privilege]) -> ServiceResult<()> {
        self.record(Call::Release);
        Ok(())
    }
}

#[async_trait]
impl BaseLayerService for FakeHost {
    async fn setup_base_layer(
        &self,
        _layer: &Path,
        base_vhdx: &Path,
        template_vhdx: &Path,
        _size_gb: u64,
    ) -> ServiceResult<()> {
        tokio::fs::write(base_vhdx, b"vhdxfile").await?;
        tokio::fs::write(template_vhdx, b"vhdxfile").await?;
        Ok(())
    }

    async fn setup_utility_vm_base_layer(
        &self,
        uvm_path: &Path,
        base_vhdx: &Path,
        template_vhdx: &Path,
        size_gb: u64,
    ) -> ServiceResult<()> {
        self.setup_base_layer(uvm_path, base_vhdx, template_vhdx, size_gb)
            .await
    }
}

/// Create a base layer with content and template disks.
pub fn base_layer(root: &Path, name: &str, template: &[u8]) -> PathBuf {
    let path = root.join(name);
    std::fs::create_dir_all(path.join(CONTENT_DIR)).unwrap();
    std::fs::write(path.join("blank-base.vhdx"), b"vhdxfile").unwrap();
    std::fs::write(path.join("blank.vhdx"), template).unwrap();
    path
}

/// Create a read-only layer with content only.
pub fn content_layer(root: &Path, name: &str) -> PathBuf {
    let path = root.join(name);
    std::fs::create_dir_all(path.join(CONTENT_DIR)).unwrap();
    path
}

/// Create a scratch layer directory holding a sandbox disk.
pub fn scratch_layer(root: &Path, name: &str) -> PathBuf {
    let path = root.join(name);
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(path.join("sandbox.vhdx"), b"vhdxfile").unwrap();
    path
}
