//! Local host backend.
//!
//! Keeps attach and filter bindings as JSON records under the state root and
//! writes placeholder virtual disks. Record files are created with
//! `create_new`, so two processes racing to attach the same disk cannot both
//! succeed.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lamina_common::{DiskLayout, LaminaPaths, LayerId, ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::{
    BaseLayerService, DestroyService, DiskAccess, DiskHandle, OpenFlags, StorageFilterService,
    VirtualDiskService,
};
use crate::layer::LayerData;

/// File-type signature at the start of every VHDX file.
const VHDX_SIGNATURE: &[u8; 8] = b"vhdxfile";

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Attach record for a virtual disk.
#[derive(Debug, Serialize, Deserialize)]
struct DiskRecord {
    path: PathBuf,
    attached_at: DateTime<Utc>,
}

/// Binding record for a storage filter.
#[derive(Debug, Serialize, Deserialize)]
struct FilterRecord {
    mount_root: PathBuf,
    layers: LayerData,
    attached_at: DateTime<Utc>,
}

/// Collaborator services backed by the local filesystem.
#[derive(Debug)]
pub struct LocalHost {
    paths: LaminaPaths,
    next_handle: AtomicU64,
}

impl LocalHost {
    /// Create a backend keeping its records under `paths`.
    #[must_use]
    pub fn new(paths: LaminaPaths) -> Self {
        Self {
            paths,
            next_handle: AtomicU64::new(1),
        }
    }

    fn disk_record(&self, disk: &Path) -> PathBuf {
        self.paths.disk_record(&LayerId::derive(disk).to_string())
    }

    fn filter_record(&self, mount_root: &Path) -> PathBuf {
        self.paths
            .filter_record(&LayerId::derive(mount_root).to_string())
    }

    async fn is_bound(&self, mount_root: &Path) -> ServiceResult<bool> {
        Ok(tokio::fs::try_exists(self.filter_record(mount_root)).await?)
    }
}

/// Write `contents` to `record`, failing with [`ServiceError::Busy`] if it
/// already exists.
async fn create_record(record: &Path, resource: &Path, contents: &[u8]) -> ServiceResult<()> {
    if let Some(parent) = record.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(record)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(ServiceError::Busy {
                resource: resource.display().to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };
    file.write_all(contents).await?;
    file.flush().await?;
    Ok(())
}

/// Remove `record`, failing with [`ServiceError::NotAttached`] if it is
/// missing.
async fn remove_record(record: &Path, resource: &Path) -> ServiceResult<()> {
    match tokio::fs::remove_file(record).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(ServiceError::NotAttached {
            resource: resource.display().to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

async fn require_file(path: &Path) -> ServiceResult<()> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.is_file() {
        Ok(())
    } else {
        Err(ServiceError::rejected(format!(
            "{} is not a virtual disk file",
            path.display()
        )))
    }
}

async fn require_dir(path: &Path) -> ServiceResult<()> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.is_dir() {
        Ok(())
    } else {
        Err(ServiceError::rejected(format!(
            "{} is not a directory",
            path.display()
        )))
    }
}

/// Write a placeholder disk: the VHDX signature followed by the virtual size.
async fn write_placeholder_disk(path: &Path, size_gb: u64) -> ServiceResult<()> {
    let size = size_gb.checked_mul(BYTES_PER_GB).ok_or_else(|| {
        ServiceError::rejected(format!("virtual disk size of {size_gb} GB is too large"))
    })?;

    let mut contents = Vec::with_capacity(16);
    contents.extend_from_slice(VHDX_SIGNATURE);
    contents.extend_from_slice(&size.to_le_bytes());
    tokio::fs::write(path, contents).await?;

    tracing::debug!(path = %path.display(), size_gb, "Virtual disk created");
    Ok(())
}

#[async_trait]
impl VirtualDiskService for LocalHost {
    async fn attach(&self, path: &Path) -> ServiceResult<()> {
        require_file(path).await?;

        let record = DiskRecord {
            path: path.to_path_buf(),
            attached_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record)?;
        create_record(&self.disk_record(path), path, &json).await?;

        tracing::debug!(path = %path.display(), "Virtual disk attached");
        Ok(())
    }

    async fn detach(&self, path: &Path) -> ServiceResult<()> {
        remove_record(&self.disk_record(path), path).await?;

        tracing::debug!(path = %path.display(), "Virtual disk detached");
        Ok(())
    }

    async fn open(
        &self,
        path: &Path,
        access: DiskAccess,
        flags: OpenFlags,
    ) -> ServiceResult<DiskHandle> {
        require_file(path).await?;

        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(path = %path.display(), raw, ?access, ?flags, "Virtual disk opened");
        Ok(DiskHandle::new(raw, path))
    }

    async fn close(&self, handle: DiskHandle) {
        tracing::trace!(path = %handle.path().display(), raw = handle.raw(), "Virtual disk closed");
    }

    async fn is_attached(&self, path: &Path) -> ServiceResult<bool> {
        Ok(tokio::fs::try_exists(self.disk_record(path)).await?)
    }
}

#[async_trait]
impl StorageFilterService for LocalHost {
    async fn attach_filter(&self, mount_root: &Path, layers: &LayerData) -> ServiceResult<()> {
        require_dir(mount_root).await?;
        for layer in &layers.layers {
            require_dir(&layer.path).await?;
        }

        let record = FilterRecord {
            mount_root: mount_root.to_path_buf(),
            layers: layers.clone(),
            attached_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record)?;
        create_record(&self.filter_record(mount_root), mount_root, &json).await?;

        tracing::debug!(
            mount_root = %mount_root.display(),
            layers = layers.layers.len(),
            "Storage filter attached"
        );
        Ok(())
    }

    async fn detach_filter(&self, mount_root: &Path) -> ServiceResult<()> {
        remove_record(&self.filter_record(mount_root), mount_root).await?;

        tracing::debug!(mount_root = %mount_root.display(), "Storage filter detached");
        Ok(())
    }

    async fn resolve_mount_path(&self, disk: &DiskHandle) -> ServiceResult<String> {
        if !self.is_attached(disk.path()).await? {
            return Err(ServiceError::NotAttached {
                resource: disk.path().display().to_string(),
            });
        }

        let mount_root = disk.path().parent().ok_or_else(|| {
            ServiceError::rejected(format!("{} has no parent layer", disk.path().display()))
        })?;

        let json = match tokio::fs::read(self.filter_record(mount_root)).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ServiceError::NotAttached {
                    resource: format!("storage filter at {}", mount_root.display()),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let record: FilterRecord = serde_json::from_slice(&json)?;

        Ok(format!(
            "\\\\?\\Volume{{{}}}\\",
            LayerId::derive(&record.mount_root)
        ))
    }
}

#[async_trait]
impl DestroyService for LocalHost {
    async fn destroy_layer(&self, path: &Path) -> ServiceResult<()> {
        require_dir(path).await?;

        if self.is_bound(path).await? {
            return Err(ServiceError::Busy {
                resource: format!("storage filter at {}", path.display()),
            });
        }
        let sandbox = DiskLayout::CONTAINER.sandbox_path(path);
        if self.is_attached(&sandbox).await? {
            return Err(ServiceError::Busy {
                resource: sandbox.display().to_string(),
            });
        }

        tokio::fs::remove_dir_all(path).await?;

        tracing::debug!(path = %path.display(), "Layer destroyed");
        Ok(())
    }
}

#[async_trait]
impl BaseLayerService for LocalHost {
    async fn setup_base_layer(
        &self,
        layer: &Path,
        base_vhdx: &Path,
        template_vhdx: &Path,
        size_gb: u64,
    ) -> ServiceResult<()> {
        require_dir(layer).await?;
        write_placeholder_disk(base_vhdx, size_gb).await?;
        write_placeholder_disk(template_vhdx, size_gb).await?;
        Ok(())
    }

    async fn setup_utility_vm_base_layer(
        &self,
        uvm_path: &Path,
        base_vhdx: &Path,
        template_vhdx: &Path,
        size_gb: u64,
    ) -> ServiceResult<()> {
        require_dir(uvm_path).await?;
        write_placeholder_disk(base_vhdx, size_gb).await?;
        write_placeholder_disk(template_vhdx, size_gb).await?;
        Ok(())
    }
}
