//! Common error types for layer management.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`LayerError`].
pub type LayerResult<T> = Result<T, LayerError>;

/// Result type alias for collaborator services.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failure reported by an external collaborator (disk, filter, naming,
/// destroy or privilege service).
#[derive(Error, Diagnostic, Debug)]
pub enum ServiceError {
    /// The underlying I/O operation failed.
    #[error("{0}")]
    #[diagnostic(code(lamina::service::io))]
    Io(#[from] std::io::Error),

    /// The resource is not attached or bound.
    #[error("{resource} is not attached")]
    #[diagnostic(code(lamina::service::not_attached))]
    NotAttached {
        /// The resource that was expected to be attached.
        resource: String,
    },

    /// The resource is already attached or bound.
    #[error("{resource} is already attached")]
    #[diagnostic(code(lamina::service::busy))]
    Busy {
        /// The resource that is in use.
        resource: String,
    },

    /// The service refused the request.
    #[error("{message}")]
    #[diagnostic(code(lamina::service::rejected))]
    Rejected {
        /// Why the request was refused.
        message: String,
    },

    /// The service is not available on this platform.
    #[error("{feature} is not supported on this platform")]
    #[diagnostic(code(lamina::service::unsupported))]
    Unsupported {
        /// The unsupported feature.
        feature: String,
    },
}

impl ServiceError {
    /// Build a [`ServiceError::Rejected`] from a message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Rejected {
            message: format!("malformed record: {err}"),
        }
    }
}

/// Why a candidate parent layer has no usable content subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReason {
    /// The layer path itself does not exist.
    LayerAbsent,
    /// The layer path exists but is not a directory.
    LayerNotDirectory,
    /// The layer is a directory but has no content subtree.
    ContentAbsent,
    /// The content subtree exists but is not a directory.
    ContentNotDirectory,
}

impl std::fmt::Display for MissingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LayerAbsent => write!(f, "the layer does not exist"),
            Self::LayerNotDirectory => write!(f, "the layer is not a directory"),
            Self::ContentAbsent => write!(f, "it does not exist"),
            Self::ContentNotDirectory => write!(f, "it is not a directory"),
        }
    }
}

/// Errors raised while validating, creating, mounting or removing layers.
#[derive(Error, Diagnostic, Debug)]
pub enum LayerError {
    /// Bad, empty or malformed input.
    #[error("Invalid argument: {message}")]
    #[diagnostic(code(lamina::invalid_argument))]
    InvalidArgument {
        /// What was wrong with the input.
        message: String,
    },

    /// A required path does not exist or is not of the expected type.
    #[error("Not found: {path}")]
    #[diagnostic(code(lamina::not_found))]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// A parent layer has no usable `Files` content subtree.
    #[error("{content} is not a directory ({reason}), cannot use {layer} as a parent layer")]
    #[diagnostic(
        code(lamina::layer::missing_content),
        help("Every parent layer must contain a 'Files' directory")
    )]
    MissingContent {
        /// The candidate layer path.
        layer: PathBuf,
        /// The expected content directory.
        content: PathBuf,
        /// What exactly is missing.
        reason: MissingReason,
    },

    /// Something already exists where a new layer would be created.
    #[error("Cannot create layer {path}, something already exists")]
    #[diagnostic(code(lamina::layer::already_exists))]
    AlreadyExists {
        /// The occupied path.
        path: PathBuf,
    },

    /// The layer is already mounted by this process.
    #[error("Layer {path} is already mounted")]
    #[diagnostic(
        code(lamina::mount::already_mounted),
        help("Unmount the layer before mounting or removing it again")
    )]
    AlreadyMounted {
        /// The scratch layer path.
        path: PathBuf,
    },

    /// Existence of a path could not be determined.
    #[error("Failed to stat {path}: {source}")]
    #[diagnostic(code(lamina::fs::stat))]
    StatFailed {
        /// The path that could not be inspected.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Stable identity lookup failed.
    #[error("Failed to look up layer ID for {path}: {source}")]
    #[diagnostic(code(lamina::layer::lookup))]
    LookupFailed {
        /// The layer path.
        path: PathBuf,
        /// The naming service failure.
        #[source]
        source: ServiceError,
    },

    /// The base layer has no template virtual disk.
    #[error("Template virtual disk {path} is missing")]
    #[diagnostic(
        code(lamina::layer::template_missing),
        help("Run 'makebaselayer' on the base-most layer first")
    )]
    TemplateMissing {
        /// The expected template path.
        path: PathBuf,
    },

    /// Directory creation failed.
    #[error("Failed to create {path}: {source}")]
    #[diagnostic(code(lamina::fs::create))]
    CreateFailed {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Copying the template virtual disk failed.
    #[error("Failed to copy {from} to {to}: {source}")]
    #[diagnostic(code(lamina::fs::copy))]
    CopyFailed {
        /// Source template.
        from: PathBuf,
        /// Destination disk.
        to: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Attaching the virtual disk failed.
    #[error("Failed to attach {path}: {source}")]
    #[diagnostic(code(lamina::disk::attach))]
    AttachFailed {
        /// The virtual disk path.
        path: PathBuf,
        /// The disk service failure.
        #[source]
        source: ServiceError,
    },

    /// Detaching the virtual disk failed.
    #[error("Failed to detach {path}: {source}")]
    #[diagnostic(code(lamina::disk::detach))]
    DetachFailed {
        /// The virtual disk path.
        path: PathBuf,
        /// The disk service failure.
        #[source]
        source: ServiceError,
    },

    /// Attaching the storage filter failed.
    #[error("Failed to attach layer storage filter at {path}: {source}")]
    #[diagnostic(code(lamina::filter::attach))]
    FilterAttachFailed {
        /// The mount root (scratch layer path).
        path: PathBuf,
        /// The filter service failure.
        #[source]
        source: ServiceError,
    },

    /// Detaching the storage filter failed.
    #[error("Failed to detach layer storage filter at {path}: {source}")]
    #[diagnostic(code(lamina::filter::detach))]
    FilterDetachFailed {
        /// The mount root (scratch layer path).
        path: PathBuf,
        /// The filter service failure.
        #[source]
        source: ServiceError,
    },

    /// Resolving the mount path of the composed volume failed.
    #[error("Failed to resolve mount path for {path}: {source}")]
    #[diagnostic(code(lamina::mount::resolve))]
    ResolveFailed {
        /// The virtual disk path.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: ServiceError,
    },

    /// Process privileges could not be enabled.
    #[error("Failed to enable privileges {privileges}: {source}")]
    #[diagnostic(
        code(lamina::privilege),
        help("Removing a layer requires backup and restore privileges (run as root)")
    )]
    PrivilegeError {
        /// The requested privilege names.
        privileges: String,
        /// The privilege service failure.
        #[source]
        source: ServiceError,
    },

    /// Destroying the layer failed.
    #[error("Failed to destroy layer {path}: {source}")]
    #[diagnostic(code(lamina::layer::destroy))]
    DestroyFailed {
        /// The layer path.
        path: PathBuf,
        /// The destroy service failure.
        #[source]
        source: ServiceError,
    },

    /// Setting up base layer templates failed.
    #[error("Failed to set up base layer {path}: {source}")]
    #[diagnostic(code(lamina::layer::base_setup))]
    BaseLayerSetupFailed {
        /// The layer (or UtilityVM) path.
        path: PathBuf,
        /// The base layer service failure.
        #[source]
        source: ServiceError,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(lamina::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(lamina::serialization))]
    Serialization(String),
}

impl LayerError {
    /// Build a [`LayerError::InvalidArgument`] from a message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for LayerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
