//! Path-based naming service.

use std::path::Path;

use async_trait::async_trait;
use lamina_common::{LayerId, ServiceError, ServiceResult};

use super::NamingService;

/// Derives layer IDs from the path alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathNamer;

#[async_trait]
impl NamingService for PathNamer {
    async fn path_to_stable_id(&self, path: &Path) -> ServiceResult<LayerId> {
        if !path.is_absolute() {
            return Err(ServiceError::rejected(format!(
                "{} is not an absolute path",
                path.display()
            )));
        }
        Ok(LayerId::derive(path))
    }
}
