//! Layer removal.

use std::path::Path;
use std::sync::Arc;

use lamina_common::{LayerError, LayerResult, absolutize};

use crate::mount::MountRegistry;
use crate::services::{DestroyService, Privilege, PrivilegeService};

/// Destroys layers with backup and restore privileges held for the call.
#[derive(Clone)]
pub struct LayerRemover {
    destroyer: Arc<dyn DestroyService>,
    privileges: Arc<dyn PrivilegeService>,
    registry: MountRegistry,
}

impl LayerRemover {
    /// Create a remover that refuses layers live in `registry`.
    pub fn new(
        destroyer: Arc<dyn DestroyService>,
        privileges: Arc<dyn PrivilegeService>,
        registry: MountRegistry,
    ) -> Self {
        Self {
            destroyer,
            privileges,
            registry,
        }
    }

    /// Remove the layer at `path` and everything under it.
    ///
    /// # Errors
    ///
    /// - [`LayerError::InvalidArgument`] for a malformed path.
    /// - [`LayerError::AlreadyMounted`] if this process has it mounted.
    /// - [`LayerError::PrivilegeError`] if privileges cannot be enabled.
    /// - [`LayerError::DestroyFailed`] if the destroy service fails.
    pub async fn remove(&self, path: impl AsRef<Path>) -> LayerResult<()> {
        let path = absolutize(path)?;

        if self.registry.is_live(&path) {
            return Err(LayerError::AlreadyMounted { path });
        }

        let privileges = &Privilege::LAYER_REMOVAL;
        self.privileges
            .enable_process_privileges(privileges)
            .await
            .map_err(|source| LayerError::PrivilegeError {
                privileges: Privilege::join(privileges),
                source,
            })?;

        let result = self.destroyer.destroy_layer(&path).await;

        if let Err(error) = self.privileges.release_process_privileges(privileges).await {
            tracing::warn!(
                privileges = %Privilege::join(privileges),
                error = %error,
                "Failed to release process privileges"
            );
        }

        result.map_err(|source| LayerError::DestroyFailed {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = %path.display(), "Layer removed");
        Ok(())
    }
}

impl std::fmt::Debug for LayerRemover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerRemover")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use async_trait::async_trait;
    use lamina_common::{ServiceError, ServiceResult};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        deny: bool,
    }

    #[async_trait]
    impl PrivilegeService for Recorder {
        async fn enable_process_privileges(&self, privileges: &[Privilege]) -> ServiceResult<()> {
            if self.deny {
                return Err(ServiceError::rejected("not held"));
            }
            self.calls
                .lock()
                .push(format!("enable {}", Privilege::join(privileges)));
            Ok(())
        }

        async fn release_process_privileges(&self, privileges: &[Privilege]) -> ServiceResult<()> {
            self.calls
                .lock()
                .push(format!("release {}", Privilege::join(privileges)));
            Ok(())
        }
    }

    #[async_trait]
    impl DestroyService for Recorder {
        async fn destroy_layer(&self, path: &Path) -> ServiceResult<()> {
            self.calls.lock().push(format!("destroy {}", path.display()));
            Ok(())
        }
    }

    fn remover(recorder: &Arc<Recorder>, registry: MountRegistry) -> LayerRemover {
        LayerRemover::new(recorder.clone(), recorder.clone(), registry)
    }

    #[tokio::test]
    async fn privileges_wrap_destroy() {
        let recorder = Arc::new(Recorder::default());
        remover(&recorder, MountRegistry::new())
            .remove("/layers/old")
            .await
            .unwrap();

        assert_eq!(
            *recorder.calls.lock(),
            vec![
                "enable SeBackupPrivilege, SeRestorePrivilege".to_string(),
                "destroy /layers/old".to_string(),
                "release SeBackupPrivilege, SeRestorePrivilege".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn denied_privileges_skip_destroy() {
        let recorder = Arc::new(Recorder {
            deny: true,
            ..Recorder::default()
        });

        assert!(matches!(
            remover(&recorder, MountRegistry::new())
                .remove("/layers/old")
                .await,
            Err(LayerError::PrivilegeError { .. })
        ));
        assert!(recorder.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn mounted_layer_is_refused() {
        let recorder = Arc::new(Recorder::default());
        let registry = MountRegistry::new();
        registry.claim(&PathBuf::from("/layers/live")).unwrap();

        assert!(matches!(
            remover(&recorder, registry).remove("/layers/live").await,
            Err(LayerError::AlreadyMounted { .. })
        ));
        assert!(recorder.calls.lock().is_empty());
    }
}
