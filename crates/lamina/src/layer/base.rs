//! Base layer template setup.

use std::path::Path;
use std::sync::Arc;

use lamina_common::{DiskLayout, LayerError, LayerResult, absolutize};

use super::validate::check_content;
use super::{Layer, LayerIdentity};
use crate::services::BaseLayerService;

/// Turns an unpacked layer into a base layer by creating its template disks.
#[derive(Clone)]
pub struct BaseLayerFactory {
    base_layers: Arc<dyn BaseLayerService>,
    identity: LayerIdentity,
    container_size_gb: u64,
    uvm_size_gb: u64,
}

impl BaseLayerFactory {
    /// Create a factory using the default disk sizes.
    pub fn new(base_layers: Arc<dyn BaseLayerService>, identity: LayerIdentity) -> Self {
        Self {
            base_layers,
            identity,
            container_size_gb: DiskLayout::CONTAINER.default_size_gb,
            uvm_size_gb: DiskLayout::UTILITY_VM.default_size_gb,
        }
    }

    /// Override the virtual sizes of the container and utility VM disks.
    #[must_use]
    pub const fn with_sizes(mut self, container_size_gb: u64, uvm_size_gb: u64) -> Self {
        self.container_size_gb = container_size_gb;
        self.uvm_size_gb = uvm_size_gb;
        self
    }

    /// Create `blank-base.vhdx` and `blank.vhdx` in the layer at `path`, and
    /// the utility VM templates when it has a `UtilityVM` directory.
    ///
    /// # Errors
    ///
    /// - [`LayerError::MissingContent`] if the layer has no `Files` directory.
    /// - [`LayerError::BaseLayerSetupFailed`] if a template cannot be created.
    pub async fn make_base_layer(&self, path: impl AsRef<Path>) -> LayerResult<Layer> {
        let path = absolutize(path)?;
        check_content(&path).await?;
        let id = self.identity.identity(&path).await?;

        let container = DiskLayout::CONTAINER;
        self.base_layers
            .setup_base_layer(
                &path,
                &container.base_path(&path),
                &container.template_path(&path),
                self.container_size_gb,
            )
            .await
            .map_err(|source| LayerError::BaseLayerSetupFailed {
                path: path.clone(),
                source,
            })?;

        let uvm = DiskLayout::UTILITY_VM;
        let uvm_root = uvm.root(&path);
        if tokio::fs::metadata(&uvm_root)
            .await
            .is_ok_and(|metadata| metadata.is_dir())
        {
            self.base_layers
                .setup_utility_vm_base_layer(
                    &uvm_root,
                    &uvm.base_path(&path),
                    &uvm.template_path(&path),
                    self.uvm_size_gb,
                )
                .await
                .map_err(|source| LayerError::BaseLayerSetupFailed {
                    path: uvm_root.clone(),
                    source,
                })?;
            tracing::debug!(path = %uvm_root.display(), "Utility VM templates created");
        }

        tracing::info!(path = %path.display(), %id, "Base layer prepared");
        Ok(Layer::read_only(path, id))
    }
}

impl std::fmt::Debug for BaseLayerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseLayerFactory")
            .field("container_size_gb", &self.container_size_gb)
            .field("uvm_size_gb", &self.uvm_size_gb)
            .finish_non_exhaustive()
    }
}
