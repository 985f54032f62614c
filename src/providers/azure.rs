//! Azure managed-identity token provider.
//!
//! Exchanges the workload's managed identity for a short-lived access token
//! accepted by Azure Database for PostgreSQL as the connection password.

use crate::config::ManagedIdentity;
use crate::{PgManagedError, Result, Token, TokenProvider};
use async_trait::async_trait;
use azure_core::auth::TokenCredential;
use azure_identity::DefaultAzureCredential;
use std::sync::Arc;

/// Identity provider backed by [`DefaultAzureCredential`].
///
/// The credential chain is built once and reused for the provider's
/// lifetime; each [`fetch`](TokenProvider::fetch) is one round-trip to the
/// token endpoint.
pub struct AzureProvider {
    credential: Arc<DefaultAzureCredential>,
    identity: ManagedIdentity,
}

impl AzureProvider {
    /// Builds the credential chain for the given managed identity.
    ///
    /// The default chain selects the user-assigned identity through
    /// `AZURE_CLIENT_ID` / `AZURE_TENANT_ID`; this SDK version has no
    /// per-instance client-id option. The environment is only ever read
    /// here, never written: providers are built lazily on a live runtime,
    /// and mutating process environment there is unsound. When the
    /// environment disagrees with the settings the constructor refuses to
    /// proceed rather than silently authenticating as the wrong identity.
    ///
    /// # Errors
    ///
    /// - [`PgManagedError::Config`]: `AZURE_CLIENT_ID` (or, when a tenant is
    ///   configured, `AZURE_TENANT_ID`) is unset or names a different
    ///   identity than the settings.
    /// - [`PgManagedError::Auth`]: the credential chain cannot be
    ///   constructed (no usable credential source on this host).
    pub fn new(identity: ManagedIdentity) -> Result<Self> {
        check_env_identity(
            "AZURE_CLIENT_ID",
            &identity.client_id,
            std::env::var("AZURE_CLIENT_ID").ok().as_deref(),
        )?;
        if let Some(tenant) = identity.tenant_id.as_deref() {
            check_env_identity(
                "AZURE_TENANT_ID",
                tenant,
                std::env::var("AZURE_TENANT_ID").ok().as_deref(),
            )?;
        }

        let credential = DefaultAzureCredential::create(Default::default()).map_err(|e| {
            PgManagedError::Auth(format!("failed to build Azure credential chain: {}", e))
        })?;

        Ok(Self {
            credential: Arc::new(credential),
            identity,
        })
    }

    /// The managed identity this provider authenticates as.
    pub fn identity(&self) -> &ManagedIdentity {
        &self.identity
    }
}

/// Compares a configured identity value against what the environment variable
/// the SDK reads actually holds.
fn check_env_identity(var: &str, configured: &str, current: Option<&str>) -> Result<()> {
    match current {
        Some(value) if value == configured => Ok(()),
        Some(value) => Err(PgManagedError::Config(format!(
            "{} is '{}' but the connection settings specify '{}'; \
             refusing to authenticate as a different identity",
            var, value, configured
        ))),
        None => Err(PgManagedError::Config(format!(
            "{} is unset; export {}={} so the credential chain selects the \
             configured identity",
            var, var, configured
        ))),
    }
}

#[async_trait]
impl TokenProvider for AzureProvider {
    fn name(&self) -> &str {
        "azure"
    }

    async fn fetch(&self, scope: &str, _tenant: Option<&str>) -> Result<Token> {
        // Tenant selection already happened when the chain was built.
        let access_token = self
            .credential
            .get_token(&[scope])
            .await
            .map_err(|e| PgManagedError::Auth(format!("failed to acquire access token: {}", e)))?;

        // The SDK reports expiry as time::OffsetDateTime.
        let expires_at =
            chrono::DateTime::from_timestamp(access_token.expires_on.unix_timestamp(), 0)
                .ok_or_else(|| {
                    PgManagedError::Auth("access token carries an unusable expiry".to_string())
                })?;

        Ok(Token::new(
            access_token.token.secret().to_string(),
            expires_at,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_identity_match_passes() {
        assert!(check_env_identity("AZURE_CLIENT_ID", "mi-1", Some("mi-1")).is_ok());
    }

    #[test]
    fn test_env_identity_mismatch_is_config_error() {
        let err = check_env_identity("AZURE_CLIENT_ID", "mi-1", Some("mi-2")).unwrap_err();
        match err {
            PgManagedError::Config(msg) => {
                assert!(msg.contains("mi-1"));
                assert!(msg.contains("mi-2"));
            }
            other => panic!("expected Config, got {:?}", other),
        }
    }

    #[test]
    fn test_env_identity_unset_is_config_error() {
        let err = check_env_identity("AZURE_TENANT_ID", "t-1", None).unwrap_err();
        match err {
            PgManagedError::Config(msg) => assert!(msg.contains("AZURE_TENANT_ID")),
            other => panic!("expected Config, got {:?}", other),
        }
    }
}
