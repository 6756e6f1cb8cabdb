//! Stable layer identity.

use std::path::Path;
use std::sync::Arc;

use lamina_common::{LayerError, LayerId, LayerResult, absolutize};

use crate::services::NamingService;

/// Derives stable IDs for layer directories.
#[derive(Clone)]
pub struct LayerIdentity {
    naming: Arc<dyn NamingService>,
}

impl LayerIdentity {
    /// Create an identity source backed by `naming`.
    pub fn new(naming: Arc<dyn NamingService>) -> Self {
        Self { naming }
    }

    /// Stable ID of the layer at `path`.
    ///
    /// The path is made absolute and normalized first, so relative and
    /// absolute spellings of the same directory share an ID.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::InvalidArgument`] for malformed paths and
    /// [`LayerError::LookupFailed`] if the naming service fails.
    pub async fn identity(&self, path: impl AsRef<Path>) -> LayerResult<LayerId> {
        let path = absolutize(path)?;
        self.naming
            .path_to_stable_id(&path)
            .await
            .map_err(|source| LayerError::LookupFailed { path, source })
    }
}

impl std::fmt::Debug for LayerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerIdentity").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::PathNamer;

    #[tokio::test]
    async fn relative_and_absolute_agree() {
        let identity = LayerIdentity::new(Arc::new(PathNamer));
        let cwd = std::env::current_dir().unwrap();

        let relative = identity.identity("layers/base").await.unwrap();
        let absolute = identity.identity(cwd.join("layers/base")).await.unwrap();
        let dotted = identity
            .identity(cwd.join("layers/./other/../base"))
            .await
            .unwrap();

        assert_eq!(relative, absolute);
        assert_eq!(relative, dotted);
    }

    #[tokio::test]
    async fn empty_path_is_invalid() {
        let identity = LayerIdentity::new(Arc::new(PathNamer));
        assert!(matches!(
            identity.identity("").await,
            Err(LayerError::InvalidArgument { .. })
        ));
    }
}
