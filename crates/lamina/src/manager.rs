//! High-level layer management.

use std::path::Path;

use lamina_common::{LayerId, LayerResult};

use crate::config::LayerConfig;
use crate::layer::{
    BaseLayerFactory, Layer, LayerIdentity, LayerRemover, LayerStack, LayerStackValidator,
    ScratchLayer, ScratchLayerFactory,
};
use crate::mount::{
    MountHandle, MountOrchestrator, MountRegistry, UnmountOperation, UnmountOrchestrator,
};
use crate::services::LayerServices;

/// Entry point tying the layer components to one set of services.
///
/// The manager is `Send + Sync`; share it through an `Arc` to run
/// operations on different stacks concurrently.
#[derive(Debug, Clone)]
pub struct LayerManager {
    identity: LayerIdentity,
    validator: LayerStackValidator,
    scratch: ScratchLayerFactory,
    base: BaseLayerFactory,
    mounter: MountOrchestrator,
    unmounter: UnmountOrchestrator,
    remover: LayerRemover,
    registry: MountRegistry,
}

impl LayerManager {
    /// Create a manager over `services`.
    pub fn new(services: LayerServices, config: &LayerConfig) -> Self {
        let identity = LayerIdentity::new(services.naming);
        let registry = MountRegistry::new();

        Self {
            validator: LayerStackValidator::new(identity.clone(), config.template_check),
            scratch: ScratchLayerFactory::new(identity.clone()),
            base: BaseLayerFactory::new(services.base_layers, identity.clone()).with_sizes(
                config.container_sandbox_size_gb,
                config.uvm_sandbox_size_gb,
            ),
            mounter: MountOrchestrator::new(
                services.disks.clone(),
                services.filters.clone(),
                registry.clone(),
            ),
            unmounter: UnmountOrchestrator::new(services.disks, services.filters, registry.clone()),
            remover: LayerRemover::new(services.destroyer, services.privileges, registry.clone()),
            identity,
            registry,
        }
    }

    /// Create a manager backed by the local host.
    #[must_use]
    pub fn local(config: &LayerConfig) -> Self {
        Self::new(LayerServices::local(&config.paths), config)
    }

    /// Stable ID of the layer at `path`.
    ///
    /// # Errors
    ///
    /// See [`LayerIdentity::identity`].
    pub async fn identity(&self, path: impl AsRef<Path>) -> LayerResult<LayerId> {
        self.identity.identity(path).await
    }

    /// Validate read-only parent layers, most specific first.
    ///
    /// # Errors
    ///
    /// See [`LayerStackValidator::validate`].
    pub async fn validate<P>(
        &self,
        paths: &[P],
        require_at_least_one: bool,
    ) -> LayerResult<LayerStack>
    where
        P: AsRef<Path> + Sync,
    {
        self.validator.validate(paths, require_at_least_one).await
    }

    /// Create a scratch layer at `path` over the given parents.
    ///
    /// # Errors
    ///
    /// Validation errors for `parents`, then those of
    /// [`ScratchLayerFactory::create_scratch`].
    pub async fn create_scratch<P>(
        &self,
        path: impl AsRef<Path>,
        parents: &[P],
    ) -> LayerResult<ScratchLayer>
    where
        P: AsRef<Path> + Sync,
    {
        let parents = self.validator.validate(parents, true).await?;
        self.scratch.create_scratch(path, &parents).await
    }

    /// Create the template disks of the base layer at `path`.
    ///
    /// # Errors
    ///
    /// See [`BaseLayerFactory::make_base_layer`].
    pub async fn make_base_layer(&self, path: impl AsRef<Path>) -> LayerResult<Layer> {
        self.base.make_base_layer(path).await
    }

    /// Validate and mount the scratch layer at `scratch` over `parents`.
    ///
    /// # Errors
    ///
    /// Validation errors, then those of [`MountOrchestrator::mount`].
    pub async fn mount<P>(
        &self,
        scratch: impl AsRef<Path>,
        parents: &[P],
    ) -> LayerResult<MountHandle>
    where
        P: AsRef<Path> + Sync,
    {
        let stack = self.validator.validate_for_mount(scratch, parents).await?;
        self.mounter.mount(&stack).await
    }

    /// Mount an already validated stack.
    ///
    /// # Errors
    ///
    /// See [`MountOrchestrator::mount`].
    pub async fn mount_stack(&self, stack: &LayerStack) -> LayerResult<MountHandle> {
        self.mounter.mount(stack).await
    }

    /// Unmount the scratch layer at `scratch`.
    ///
    /// # Errors
    ///
    /// [`LayerError::NotFound`](lamina_common::LayerError::NotFound) if the
    /// scratch layer does not exist, then those of
    /// [`UnmountOrchestrator::unmount`].
    pub async fn unmount(
        &self,
        scratch: impl AsRef<Path>,
        operation: UnmountOperation,
    ) -> LayerResult<()> {
        let stack = self
            .validator
            .validate_scratch(scratch, LayerStack::empty())
            .await?;
        self.unmounter.unmount(&stack, operation).await
    }

    /// Unmount a stack previously passed to [`Self::mount_stack`].
    ///
    /// # Errors
    ///
    /// See [`UnmountOrchestrator::unmount`].
    pub async fn unmount_stack(
        &self,
        stack: &LayerStack,
        operation: UnmountOperation,
    ) -> LayerResult<()> {
        self.unmounter.unmount(stack, operation).await
    }

    /// Remove the layer at `path`.
    ///
    /// # Errors
    ///
    /// See [`LayerRemover::remove`].
    pub async fn remove(&self, path: impl AsRef<Path>) -> LayerResult<()> {
        self.remover.remove(path).await
    }

    /// Mounts made by this manager that have not been unmounted.
    #[must_use]
    pub fn live_mounts(&self) -> Vec<MountHandle> {
        self.registry.live()
    }
}
