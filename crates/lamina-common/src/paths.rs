//! Standard filesystem paths for lamina state.

use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;

use crate::error::{LayerError, LayerResult};

/// Default state directory for attach and filter records.
pub static LAMINA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("LAMINA_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/lamina"))
});

/// State paths used by the local host backend.
#[derive(Debug, Clone)]
pub struct LaminaPaths {
    /// Root state directory (default: /var/lib/lamina).
    pub root: PathBuf,
}

impl LaminaPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory of virtual-disk attach records.
    #[must_use]
    pub fn disks(&self) -> PathBuf {
        self.root.join("disks")
    }

    /// Attach record for a virtual disk.
    #[must_use]
    pub fn disk_record(&self, key: &str) -> PathBuf {
        self.disks().join(format!("{key}.json"))
    }

    /// Directory of storage-filter binding records.
    #[must_use]
    pub fn filters(&self) -> PathBuf {
        self.root.join("filters")
    }

    /// Binding record for a filter mount root.
    #[must_use]
    pub fn filter_record(&self, key: &str) -> PathBuf {
        self.filters().join(format!("{key}.json"))
    }

    /// Create all necessary directories.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.disks())?;
        std::fs::create_dir_all(self.filters())?;
        Ok(())
    }
}

impl Default for LaminaPaths {
    fn default() -> Self {
        Self {
            root: LAMINA_ROOT.clone(),
        }
    }
}

/// Make `path` absolute and lexically normalized.
///
/// `.` components are dropped and `..` pops the previous component, without
/// touching the filesystem or resolving symlinks.
///
/// # Errors
///
/// Returns [`LayerError::InvalidArgument`] for empty paths, paths containing a
/// NUL byte, or when the current directory cannot be determined.
pub fn absolutize(path: impl AsRef<Path>) -> LayerResult<PathBuf> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(LayerError::invalid("layer path must not be empty"));
    }
    if path.as_os_str().as_encoded_bytes().contains(&0) {
        return Err(LayerError::invalid(format!(
            "layer path {} contains a NUL byte",
            path.display()
        )));
    }

    let absolute = std::path::absolute(path).map_err(|e| {
        LayerError::invalid(format!("failed to absolutify {}: {e}", path.display()))
    })?;

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}
