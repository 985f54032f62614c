//! Identity-provider construction.
//!
//! The manager calls [`new_provider`] lazily, on the first connect attempt
//! that actually needs a token. Providers are feature-gated the same way the
//! drivers are: deployments that only ever use static passwords pay for
//! nothing.

use crate::config::ManagedIdentity;
use crate::{Result, TokenProvider};
use std::sync::Arc;

/// Creates the identity-provider client for the given managed identity.
///
/// # Errors
///
/// Returns [`PgManagedError::ProviderUnavailable`](crate::PgManagedError::ProviderUnavailable)
/// when no provider implementation is compiled in (missing feature flag), and
/// any error the provider itself raises while building its SDK client.
#[allow(unused_variables)]
pub fn new_provider(identity: &ManagedIdentity) -> Result<Arc<dyn TokenProvider>> {
    #[cfg(feature = "azure")]
    {
        let provider = crate::providers::azure::AzureProvider::new(identity.clone())?;
        return Ok(Arc::new(provider));
    }

    #[cfg(not(feature = "azure"))]
    Err(crate::PgManagedError::ProviderUnavailable(
        "managed identity is configured but no provider is compiled in \
         (did you enable the 'azure' feature flag?)"
            .to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(feature = "azure"))]
    fn test_missing_feature_is_reported() {
        let result = new_provider(&ManagedIdentity::new("mi-1"));
        assert!(result.is_err());
        if let Err(e) = result {
            let err_msg = e.to_string();
            assert!(err_msg.contains("feature flag"));
        }
    }
}
