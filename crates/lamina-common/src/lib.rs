//! # lamina-common
//!
//! Shared types for the lamina layer tooling.
//!
//! This crate provides common functionality used across all lamina crates:
//! - Stable layer ID derivation
//! - The fixed on-disk layer layout (content directory, virtual-disk names)
//! - State paths and path normalization
//! - Common error types

#![warn(missing_docs)]

pub mod error;
pub mod id;
pub mod layout;
pub mod paths;

pub use error::{LayerError, LayerResult, MissingReason, ServiceError, ServiceResult};
pub use id::LayerId;
pub use layout::{CONTENT_DIR, DiskLayout, DiskRole, UTILITY_VM_DIR};
pub use paths::{LaminaPaths, absolutize};
