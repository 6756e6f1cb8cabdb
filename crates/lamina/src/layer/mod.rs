//! Layer identity, validation, creation and removal.
//!
//! A layer is a directory holding a `Files` content subtree. Read-only parent
//! layers are stacked beneath one writable scratch layer, whose
//! `sandbox.vhdx` is copied from the base-most layer's template disk.

mod base;
mod identity;
mod remove;
mod scratch;
mod stack;
mod validate;

pub use base::BaseLayerFactory;
pub use identity::LayerIdentity;
pub use remove::LayerRemover;
pub use scratch::{ScratchLayer, ScratchLayerFactory};
pub use stack::{Layer, LayerData, LayerDescriptor, LayerRole, LayerStack, PathType, SchemaVersion};
pub use validate::{LayerStackValidator, TemplateCheck};
