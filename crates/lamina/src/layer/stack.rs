//! Layers, layer stacks and the storage-filter descriptor.

use std::path::{Path, PathBuf};

use lamina_common::{LayerError, LayerId, LayerResult};
use serde::{Deserialize, Serialize};

/// Role of a layer within a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerRole {
    /// Read-only parent layer.
    ReadOnly,
    /// Writable scratch layer.
    Scratch,
}

impl std::fmt::Display for LayerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::Scratch => write!(f, "scratch"),
        }
    }
}

/// A validated layer directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layer {
    path: PathBuf,
    id: LayerId,
    role: LayerRole,
}

impl Layer {
    /// A read-only parent layer.
    #[must_use]
    pub fn read_only(path: impl Into<PathBuf>, id: LayerId) -> Self {
        Self {
            path: path.into(),
            id,
            role: LayerRole::ReadOnly,
        }
    }

    /// A writable scratch layer.
    #[must_use]
    pub fn scratch(path: impl Into<PathBuf>, id: LayerId) -> Self {
        Self {
            path: path.into(),
            id,
            role: LayerRole::Scratch,
        }
    }

    /// Absolute path of the layer directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stable ID derived from the path.
    #[must_use]
    pub const fn id(&self) -> LayerId {
        self.id
    }

    /// Role of the layer.
    #[must_use]
    pub const fn role(&self) -> LayerRole {
        self.role
    }

    /// Check if this is a writable layer.
    #[must_use]
    pub fn is_scratch(&self) -> bool {
        self.role == LayerRole::Scratch
    }
}

/// An ordered stack of layers.
///
/// Index 0 is the most specific layer and the last entry is the base-most
/// layer. A stack returned by validation holds only read-only layers; a mount
/// stack additionally has the scratch layer at index 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LayerStack {
    layers: Vec<Layer>,
}

impl LayerStack {
    pub(crate) fn new(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    /// A stack with no layers.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Put a scratch layer on top of this stack.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::InvalidArgument`] if `scratch` is not a scratch
    /// layer, the stack already has one, or its path is one of the parents.
    pub fn with_scratch(mut self, scratch: Layer) -> LayerResult<Self> {
        if !scratch.is_scratch() {
            return Err(LayerError::invalid(format!(
                "{} is not a scratch layer",
                scratch.path.display()
            )));
        }
        if self.scratch().is_some() {
            return Err(LayerError::invalid("layer stack already has a scratch layer"));
        }
        if self.contains(&scratch.path) {
            return Err(LayerError::invalid(format!(
                "{} cannot be both the scratch layer and a parent layer",
                scratch.path.display()
            )));
        }

        self.layers.insert(0, scratch);
        Ok(self)
    }

    /// All layers, most specific first.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Check if the stack has no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The most specific layer.
    #[must_use]
    pub fn top(&self) -> Option<&Layer> {
        self.layers.first()
    }

    /// The base-most layer.
    #[must_use]
    pub fn base(&self) -> Option<&Layer> {
        self.layers.last()
    }

    /// The scratch layer, if the stack has one.
    #[must_use]
    pub fn scratch(&self) -> Option<&Layer> {
        self.top().filter(|layer| layer.is_scratch())
    }

    /// The read-only layers, most specific first.
    #[must_use]
    pub fn parents(&self) -> &[Layer] {
        match self.scratch() {
            Some(_) => &self.layers[1..],
            None => &self.layers,
        }
    }

    /// Check if a layer with this path is in the stack.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.layers.iter().any(|layer| layer.path == path)
    }

    /// Layer IDs, in stack order.
    #[must_use]
    pub fn ids(&self) -> Vec<LayerId> {
        self.layers.iter().map(Layer::id).collect()
    }

    /// Storage-filter descriptor for the read-only layers.
    #[must_use]
    pub fn descriptor(&self) -> LayerData {
        LayerData {
            schema_version: SchemaVersion::V2_1,
            layers: self
                .parents()
                .iter()
                .map(|layer| LayerDescriptor {
                    id: layer.id,
                    path: layer.path.clone(),
                    path_type: PathType::AbsolutePath,
                })
                .collect(),
        }
    }
}

/// Schema version of a [`LayerData`] document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SchemaVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl SchemaVersion {
    /// Schema 2.1, the first to carry layer data for the storage filter.
    pub const V2_1: Self = Self { major: 2, minor: 1 };
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::V2_1
    }
}

/// How a [`LayerDescriptor`] path is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PathType {
    /// An absolute host path.
    #[default]
    AbsolutePath,
}

/// One read-only layer in a [`LayerData`] document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LayerDescriptor {
    /// Stable layer ID.
    pub id: LayerId,
    /// Layer directory.
    pub path: PathBuf,
    /// Path interpretation.
    pub path_type: PathType,
}

/// Layer stack description handed to the storage filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LayerData {
    /// Document schema version.
    pub schema_version: SchemaVersion,
    /// Read-only layers, most specific first.
    pub layers: Vec<LayerDescriptor>,
}
