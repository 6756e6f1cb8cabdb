//! # Lamina
//!
//! Lamina manages stacks of container filesystem layers: read-only parent
//! layers composed beneath one writable scratch layer backed by a virtual
//! disk.
//!
//! ## Features
//!
//! - **Validation**: parent chains are checked for content and template disks
//! - **Scratch layers**: created from the base layer's template disk
//! - **Mounting**: disk attach, storage filter binding and mount path
//!   resolution, released in reverse order on failure
//! - **Removal**: privileged destruction of a whole layer
//!
//! ## Usage
//!
//! ```no_run
//! use lamina::{LayerConfig, LayerManager, UnmountOperation};
//!
//! # async fn example() -> lamina_common::LayerResult<()> {
//! let manager = LayerManager::local(&LayerConfig::default());
//!
//! manager.make_base_layer("/layers/base").await?;
//! manager.create_scratch("/layers/scratch", &["/layers/base"]).await?;
//!
//! let mount = manager.mount("/layers/scratch", &["/layers/base"]).await?;
//! println!("{}", mount.mount_path());
//!
//! manager.unmount("/layers/scratch", UnmountOperation::All).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod layer;
pub mod manager;
pub mod mount;
pub mod rollback;
pub mod services;

pub use config::LayerConfig;
pub use layer::{Layer, LayerStack, ScratchLayer, TemplateCheck};
pub use manager::LayerManager;
pub use mount::{MountHandle, UnmountOperation};
pub use services::LayerServices;
