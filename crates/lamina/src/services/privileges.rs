//! Process privileges needed for layer removal.

use async_trait::async_trait;
use lamina_common::{ServiceError, ServiceResult};

use super::PrivilegeService;

/// A process privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    /// SeBackupPrivilege: read any file regardless of its ACL.
    Backup,
    /// SeRestorePrivilege: write and delete any file regardless of its ACL.
    Restore,
}

impl Privilege {
    /// Privileges required to destroy a layer.
    pub const LAYER_REMOVAL: [Self; 2] = [Self::Backup, Self::Restore];

    /// Get the privilege name as a string.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Backup => "SeBackupPrivilege",
            Self::Restore => "SeRestorePrivilege",
        }
    }

    /// Format a list of privileges for error messages.
    #[must_use]
    pub fn join(privileges: &[Self]) -> String {
        privileges
            .iter()
            .map(Self::name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Linux capabilities granting the same access.
    #[cfg(target_os = "linux")]
    fn to_caps_capabilities(self) -> &'static [caps::Capability] {
        match self {
            Self::Backup => &[caps::Capability::CAP_DAC_READ_SEARCH],
            Self::Restore => &[
                caps::Capability::CAP_DAC_OVERRIDE,
                caps::Capability::CAP_FOWNER,
            ],
        }
    }
}

impl std::fmt::Display for Privilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Privilege service that raises Linux capabilities into the effective set.
///
/// The capabilities must already be in the permitted set (root, or a binary
/// with file capabilities).
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityPrivileges;

/// Raise the capabilities behind `privileges` in order.
///
/// If any raise fails, the capabilities raised so far are lowered again in
/// reverse order before the error is returned.
#[cfg(target_os = "linux")]
fn raise_all(
    privileges: &[Privilege],
    mut raise: impl FnMut(caps::Capability) -> ServiceResult<()>,
    mut lower: impl FnMut(caps::Capability) -> ServiceResult<()>,
) -> ServiceResult<()> {
    let mut raised = Vec::new();
    for privilege in privileges {
        for cap in privilege.to_caps_capabilities() {
            if let Err(e) = raise(*cap) {
                for cap in raised.into_iter().rev() {
                    if let Err(err) = lower(cap) {
                        tracing::warn!(%cap, error = %err, "Failed to lower capability");
                    }
                }
                return Err(e);
            }
            raised.push(*cap);
        }
        tracing::debug!(privilege = privilege.name(), "Privilege enabled");
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn lower_capability(cap: caps::Capability) -> ServiceResult<()> {
    caps::drop(None, caps::CapSet::Effective, cap)
        .map_err(|e| ServiceError::rejected(format!("failed to drop {cap}: {e}")))
}

#[cfg(target_os = "linux")]
#[async_trait]
impl PrivilegeService for CapabilityPrivileges {
    async fn enable_process_privileges(&self, privileges: &[Privilege]) -> ServiceResult<()> {
        use caps::CapSet;

        raise_all(
            privileges,
            |cap| {
                let permitted = caps::has_cap(None, CapSet::Permitted, cap).map_err(|e| {
                    ServiceError::rejected(format!("failed to read capabilities: {e}"))
                })?;
                if !permitted {
                    return Err(ServiceError::rejected(format!(
                        "{cap} is not permitted for this process"
                    )));
                }
                caps::raise(None, CapSet::Effective, cap)
                    .map_err(|e| ServiceError::rejected(format!("failed to raise {cap}: {e}")))
            },
            lower_capability,
        )
    }

    async fn release_process_privileges(&self, privileges: &[Privilege]) -> ServiceResult<()> {
        for privilege in privileges {
            for cap in privilege.to_caps_capabilities() {
                lower_capability(*cap)?;
            }
            tracing::debug!(privilege = privilege.name(), "Privilege released");
        }
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
#[async_trait]
impl PrivilegeService for CapabilityPrivileges {
    async fn enable_process_privileges(&self, _privileges: &[Privilege]) -> ServiceResult<()> {
        Err(ServiceError::Unsupported {
            feature: "process privileges".to_string(),
        })
    }

    async fn release_process_privileges(&self, _privileges: &[Privilege]) -> ServiceResult<()> {
        Ok(())
    }
}
