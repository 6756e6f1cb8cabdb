//! Mounting and unmounting layer stacks.
//!
//! Mounting attaches the scratch layer's sandbox disk, binds the read-only
//! parents beneath it with the storage filter, and resolves the resulting
//! volume path. Each step that acquires something registers its release on a
//! [`Rollback`](crate::rollback::Rollback), so a failure part way through
//! leaves nothing attached.

mod orchestrator;
mod registry;
mod unmount;

pub use orchestrator::MountOrchestrator;
pub use registry::{MountHandle, MountRegistry};
pub use unmount::{UnmountOperation, UnmountOrchestrator};

/// Progress of a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    /// Nothing acquired.
    Unmounted,
    /// The sandbox disk is attached.
    VhdAttached,
    /// The storage filter is bound over the scratch layer.
    FilterAttached,
    /// The mount path has been resolved.
    Mounted,
    /// A step failed and acquired resources were released.
    Failed,
}

impl std::fmt::Display for MountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unmounted => write!(f, "unmounted"),
            Self::VhdAttached => write!(f, "vhd-attached"),
            Self::FilterAttached => write!(f, "filter-attached"),
            Self::Mounted => write!(f, "mounted"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
