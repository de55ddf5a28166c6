//! Tenant identities and API key authentication for the gateway.
//!
//! Every authenticated request resolves to an [`Identity`]: the organization the request acts on
//! behalf of and whether the caller holds admin privileges. Credentials are resolved through an
//! [`AuthBackend`]. The gateway ships [`StaticKeyAuth`], which resolves keys from a fixed table.
//!
//! ```
//! use tsgw_auth::{AuthBackend, Identity, StaticKeyAuth};
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let auth = StaticKeyAuth::new([("secret".to_owned(), Identity::new(42, false))]);
//! let identity = auth.authenticate("secret").await.unwrap();
//! assert_eq!(identity.org_id, 42);
//! # });
//! ```
#![warn(missing_docs)]

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The organization id denoting "no organization".
///
/// Metrics submitted by admins with this organization are public.
pub const NO_ORG: i64 = -1;

/// The tenant on whose behalf a request is executed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// The organization of the caller.
    pub org_id: i64,
    /// Admins may act on behalf of other organizations.
    pub is_admin: bool,
}

impl Identity {
    /// Creates a new identity.
    pub const fn new(org_id: i64, is_admin: bool) -> Self {
        Self { org_id, is_admin }
    }

    /// Returns a copy of this identity acting on behalf of another organization.
    ///
    /// Only admins may impersonate. For other identities, and for the organization `0`, this
    /// returns the identity unchanged.
    pub fn impersonate(self, org_id: i64) -> Self {
        if self.is_admin && org_id != 0 {
            Self { org_id, ..self }
        } else {
            self
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "org {}", self.org_id)?;
        if self.is_admin {
            write!(f, " (admin)")?;
        }
        Ok(())
    }
}

/// Failures of an [`AuthBackend`].
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The key is not known.
    #[error("invalid key")]
    InvalidKey,
    /// The key is known but not bound to a valid organization.
    #[error("invalid orgId")]
    InvalidOrgId,
    /// The backend itself failed.
    #[error("{0}")]
    Backend(String),
}

impl AuthError {
    /// Returns `true` if the error is a problem with the presented credential.
    ///
    /// All other errors are failures of the backend.
    pub fn is_credential_error(&self) -> bool {
        matches!(self, Self::InvalidKey | Self::InvalidOrgId)
    }
}

/// Resolves API keys into identities.
#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    /// Resolves a single non-empty key.
    async fn authenticate(&self, key: &str) -> Result<Identity, AuthError>;
}

/// Authenticates against a fixed table of keys.
#[derive(Clone, Default)]
pub struct StaticKeyAuth {
    keys: HashMap<String, Identity>,
}

impl StaticKeyAuth {
    /// Creates a backend from pairs of keys and their identities.
    pub fn new(keys: impl IntoIterator<Item = (String, Identity)>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Returns the number of configured keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if no keys are configured.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for StaticKeyAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keys are secrets.
        f.debug_struct("StaticKeyAuth")
            .field("keys", &self.keys.len())
            .finish()
    }
}

#[async_trait::async_trait]
impl AuthBackend for StaticKeyAuth {
    async fn authenticate(&self, key: &str) -> Result<Identity, AuthError> {
        match self.keys.get(key) {
            None => Err(AuthError::InvalidKey),
            Some(identity) if identity.org_id == 0 => Err(AuthError::InvalidOrgId),
            Some(identity) => Ok(*identity),
        }
    }
}
