//! Layer manager configuration.

use std::path::PathBuf;

use lamina_common::{DiskLayout, LaminaPaths};

use crate::layer::TemplateCheck;

/// Layer manager configuration options.
#[derive(Debug, Clone)]
pub struct LayerConfig {
    /// State paths of the local host backend.
    pub paths: LaminaPaths,
    /// How base layer template disks are checked during validation.
    pub template_check: TemplateCheck,
    /// Virtual size of new container template disks (GB).
    pub container_sandbox_size_gb: u64,
    /// Virtual size of new utility VM template disks (GB).
    pub uvm_sandbox_size_gb: u64,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            paths: LaminaPaths::new(),
            template_check: TemplateCheck::default(),
            container_sandbox_size_gb: DiskLayout::CONTAINER.default_size_gb,
            uvm_sandbox_size_gb: DiskLayout::UTILITY_VM.default_size_gb,
        }
    }
}

impl LayerConfig {
    /// Create a configuration keeping state in the user's data directory.
    #[must_use]
    pub fn user() -> Self {
        let data = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        Self::default().with_root(data.join("lamina"))
    }

    /// Set the state root directory.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.paths = LaminaPaths::with_root(root);
        self
    }

    /// Set the template check policy.
    #[must_use]
    pub const fn with_template_check(mut self, template_check: TemplateCheck) -> Self {
        self.template_check = template_check;
        self
    }

    /// Set the virtual sizes of new template disks.
    #[must_use]
    pub const fn with_sandbox_sizes(mut self, container_gb: u64, uvm_gb: u64) -> Self {
        self.container_sandbox_size_gb = container_gb;
        self.uvm_sandbox_size_gb = uvm_gb;
        self
    }
}
