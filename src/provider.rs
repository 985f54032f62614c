//! Identity-provider boundary.

use crate::{Result, Token};
use async_trait::async_trait;

/// A source of short-lived database access tokens.
///
/// Implementations perform one network round-trip per call and keep no
/// internal cache; caching and staleness tracking belong to the
/// [`TokenCache`](crate::token::TokenCache) layered above. Each call requests
/// a brand-new token, so calls are idempotent from the caller's perspective.
///
/// Implementations must be `Send + Sync`: the provider client is constructed
/// once per manager (it is expensive to build) and reused across reconnects,
/// potentially from concurrent callers.
///
/// # Errors
///
/// `fetch` fails with [`PgManagedError::Auth`](crate::PgManagedError::Auth)
/// when the provider is unreachable for auth reasons, denies the request, or
/// returns an empty secret; with
/// [`PgManagedError::Network`](crate::PgManagedError::Network) for transport
/// failures and timeouts.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns the provider name (e.g. "azure", "mock"), used in logs.
    fn name(&self) -> &str;

    /// Requests a brand-new token for the given scope.
    ///
    /// `tenant` narrows the request to one directory where the provider
    /// distinguishes tenants; providers without that concept ignore it.
    async fn fetch(&self, scope: &str, tenant: Option<&str>) -> Result<Token>;
}
