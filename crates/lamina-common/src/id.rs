//! Stable layer identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::{LayerError, LayerResult};

/// Namespace for path-derived layer IDs.
///
/// Changing this value changes every derived ID, so layers referenced by
/// other tools would no longer match.
const LAYER_ID_NAMESPACE: Uuid = Uuid::from_u128(0x7c1e_9f3a_4b2d_5e60_8a91_c3d4_e5f6_0718);

/// A stable, GUID-equivalent identifier for a layer.
///
/// IDs are derived from the absolute layer path and are never persisted: the
/// path is the source of truth, and the same path always yields the same ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(Uuid);

impl LayerId {
    /// Derive the ID for an absolute, normalized path.
    #[must_use]
    pub fn derive(path: &Path) -> Self {
        Self(Uuid::new_v5(
            &LAYER_ID_NAMESPACE,
            path.as_os_str().as_encoded_bytes(),
        ))
    }

    /// Returns a short version of the ID (first 8 hex characters).
    #[must_use]
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for LayerId {
    type Err = LayerError;

    fn from_str(s: &str) -> LayerResult<Self> {
        let trimmed = s.trim_start_matches('{').trim_end_matches('}');
        Uuid::parse_str(trimmed)
            .map(Self)
            .map_err(|e| LayerError::invalid(format!("invalid layer ID {s:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn derive_is_stable() {
        let a = LayerId::derive(Path::new("/layers/base"));
        let b = LayerId::derive(Path::new("/layers/base"));
        assert_eq!(a, b);
        assert_ne!(a, LayerId::derive(Path::new("/layers/other")));
    }

    #[test]
    fn parse_braced_guid() {
        let id = LayerId::derive(Path::new("/layers/base"));
        let braced = format!("{{{id}}}");
        assert_eq!(braced.parse::<LayerId>().unwrap(), id);
        assert!("not-a-guid".parse::<LayerId>().is_err());
    }

    #[test]
    fn short_id() {
        let id = LayerId::derive(Path::new("/layers/base"));
        assert_eq!(id.short().len(), 8);
        assert!(id.to_string().replace('-', "").starts_with(&id.short()));
    }

    proptest! {
        #[test]
        fn display_round_trips(name in "[a-zA-Z0-9_-]{1,32}") {
            let id = LayerId::derive(&Path::new("/layers").join(name));
            prop_assert_eq!(id.to_string().parse::<LayerId>().unwrap(), id);
        }
    }
}
