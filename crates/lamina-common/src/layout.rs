//! On-disk layer layout.
//!
//! These names are shared with other tools operating on the same layers and
//! must not change.

use std::path::{Path, PathBuf};

/// Name of the content subtree present in every layer.
pub const CONTENT_DIR: &str = "Files";

/// Name of the optional utility VM subdirectory.
pub const UTILITY_VM_DIR: &str = "UtilityVM";

/// Fixed virtual-disk file names and default sizes for one disk family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskLayout {
    /// Subdirectory of the layer holding the disks, if any.
    pub subdirectory: Option<&'static str>,
    /// Base virtual disk of a base layer.
    pub base_vhdx: &'static str,
    /// Template virtual disk that scratch disks are copied from.
    pub template_vhdx: &'static str,
    /// Working virtual disk of a scratch layer.
    pub sandbox_vhdx: &'static str,
    /// Default sandbox size in GB.
    pub default_size_gb: u64,
}

impl DiskLayout {
    /// Container disks, at the root of the layer.
    pub const CONTAINER: Self = Self {
        subdirectory: None,
        base_vhdx: "blank-base.vhdx",
        template_vhdx: "blank.vhdx",
        sandbox_vhdx: "sandbox.vhdx",
        default_size_gb: 20,
    };

    /// Utility VM disks, under `UtilityVM/`.
    pub const UTILITY_VM: Self = Self {
        subdirectory: Some(UTILITY_VM_DIR),
        base_vhdx: "SystemTemplateBase.vhdx",
        template_vhdx: "SystemTemplate.vhdx",
        sandbox_vhdx: "sandbox.vhdx",
        default_size_gb: 10,
    };

    /// Directory holding this family's disks within `layer`.
    #[must_use]
    pub fn root(&self, layer: &Path) -> PathBuf {
        match self.subdirectory {
            Some(dir) => layer.join(dir),
            None => layer.to_path_buf(),
        }
    }

    /// Path of the base virtual disk.
    #[must_use]
    pub fn base_path(&self, layer: &Path) -> PathBuf {
        self.root(layer).join(self.base_vhdx)
    }

    /// Path of the template virtual disk.
    #[must_use]
    pub fn template_path(&self, layer: &Path) -> PathBuf {
        self.root(layer).join(self.template_vhdx)
    }

    /// Path of the sandbox virtual disk.
    #[must_use]
    pub fn sandbox_path(&self, layer: &Path) -> PathBuf {
        self.root(layer).join(self.sandbox_vhdx)
    }
}

/// Role of a layer with respect to the virtual disks it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiskRole {
    /// Base-most layer: base and template container disks.
    Base,
    /// Writable layer: container sandbox disk.
    Scratch,
    /// Base-most layer's utility VM: base and template disks.
    UvmBase,
    /// Writable layer's utility VM: sandbox disk.
    UvmScratch,
}

impl DiskRole {
    /// All roles, in table order.
    pub const ALL: [Self; 4] = [Self::Base, Self::Scratch, Self::UvmBase, Self::UvmScratch];

    /// The disk family this role belongs to.
    #[must_use]
    pub const fn layout(self) -> DiskLayout {
        match self {
            Self::Base | Self::Scratch => DiskLayout::CONTAINER,
            Self::UvmBase | Self::UvmScratch => DiskLayout::UTILITY_VM,
        }
    }

    /// File names carried by a layer in this role.
    #[must_use]
    pub const fn file_names(self) -> &'static [&'static str] {
        match self {
            Self::Base => &["blank-base.vhdx", "blank.vhdx"],
            Self::Scratch | Self::UvmScratch => &["sandbox.vhdx"],
            Self::UvmBase => &["SystemTemplateBase.vhdx", "SystemTemplate.vhdx"],
        }
    }

    /// Full paths of the disks a layer in this role carries.
    #[must_use]
    pub fn disk_paths(self, layer: &Path) -> Vec<PathBuf> {
        let root = self.layout().root(layer);
        self.file_names().iter().map(|name| root.join(name)).collect()
    }
}

impl std::fmt::Display for DiskRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Scratch => write!(f, "scratch"),
            Self::UvmBase => write!(f, "uvm-base"),
            Self::UvmScratch => write!(f, "uvm-scratch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_paths() {
        let layer = Path::new("/layers/base");
        assert_eq!(
            DiskLayout::CONTAINER.template_path(layer),
            PathBuf::from("/layers/base/blank.vhdx")
        );
        assert_eq!(
            DiskRole::Scratch.disk_paths(Path::new("/layers/scratch")),
            vec![PathBuf::from("/layers/scratch/sandbox.vhdx")]
        );
    }

    #[test]
    fn utility_vm_paths() {
        let layer = Path::new("/layers/base");
        assert_eq!(
            DiskRole::UvmBase.disk_paths(layer),
            vec![
                PathBuf::from("/layers/base/UtilityVM/SystemTemplateBase.vhdx"),
                PathBuf::from("/layers/base/UtilityVM/SystemTemplate.vhdx"),
            ]
        );
    }

    #[test]
    fn roles_agree_with_layouts() {
        for role in DiskRole::ALL {
            let layout = role.layout();
            for name in role.file_names() {
                assert!(
                    [layout.base_vhdx, layout.template_vhdx, layout.sandbox_vhdx].contains(name),
                    "{role}: {name}"
                );
            }
        }
    }
}
