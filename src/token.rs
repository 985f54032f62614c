//! Access-token cache with a tri-state validity flag.
//!
//! The cache holds at most one credential. It never performs I/O; fetching
//! fresh tokens is the job of the [`TokenProvider`](crate::TokenProvider)
//! layered above it.

use chrono::{DateTime, Duration, Utc};

/// Default lead time before actual expiry at which a cached token is treated
/// as stale (3 minutes). Avoids racing an in-flight handshake against expiry.
pub const DEFAULT_SAFETY_MARGIN: std::time::Duration = std::time::Duration::from_secs(180);

/// A short-lived access token issued by an identity provider.
///
/// Immutable once issued; the cache replaces tokens wholesale, never mutates
/// them in place.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    secret: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    /// Creates a token from its secret and absolute expiry time.
    pub fn new(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    /// The token value, used as the connection password.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// When the token stops being accepted by the server.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

// The secret must never end up in logs or panic messages.
impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Validity state of the cached credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialState {
    /// No credential has ever been fetched.
    Unset,
    /// Credential refresh is permanently off for this logical connection
    /// because a static password was configured. Terminal and sticky.
    Disabled,
    /// A credential is present; may be fresh or stale depending on its
    /// expiry versus the safety margin.
    Cached(Token),
}

/// In-memory cache for one credential.
///
/// # Example
///
/// ```
/// use pgmanaged::token::{Token, TokenCache};
/// use chrono::{Duration, Utc};
///
/// let mut cache = TokenCache::default();
/// assert!(!cache.is_fresh(Utc::now()));
///
/// cache.store(Token::new("abc", Utc::now() + Duration::hours(1)));
/// assert!(cache.is_fresh(Utc::now()));
/// ```
#[derive(Debug, Clone)]
pub struct TokenCache {
    state: CredentialState,
    safety_margin: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(DEFAULT_SAFETY_MARGIN)
    }
}

impl TokenCache {
    /// Creates an empty cache with the given safety margin.
    pub fn new(safety_margin: std::time::Duration) -> Self {
        Self {
            state: CredentialState::Unset,
            safety_margin: Duration::from_std(safety_margin)
                .unwrap_or_else(|_| Duration::seconds(180)),
        }
    }

    /// Current validity state.
    pub fn state(&self) -> &CredentialState {
        &self.state
    }

    /// True iff a credential is cached and will outlive the safety margin.
    ///
    /// `Unset` and `Disabled` are never fresh: `Disabled` means the caller
    /// should use the static password instead of asking for a token at all.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match &self.state {
            CredentialState::Cached(token) => token.expires_at() - now > self.safety_margin,
            CredentialState::Unset | CredentialState::Disabled => false,
        }
    }

    /// The cached secret, if a credential is present (fresh or not).
    pub fn secret(&self) -> Option<&str> {
        match &self.state {
            CredentialState::Cached(token) => Some(token.secret()),
            _ => None,
        }
    }

    /// Permanently disables credential refresh for this cache.
    ///
    /// Idempotent and irreversible for the lifetime of the owning manager;
    /// signals "this deployment uses static auth, stop trying cloud
    /// credentials". Drops any previously cached token.
    pub fn mark_disabled(&mut self) {
        self.state = CredentialState::Disabled;
    }

    /// Stores a freshly fetched credential, replacing any previous one.
    ///
    /// Must not be called when the cache is `Disabled`; the disabled state
    /// is sticky and the call is ignored.
    pub fn store(&mut self, token: Token) {
        if matches!(self.state, CredentialState::Disabled) {
            tracing::debug!("ignoring store() on a disabled token cache");
            return;
        }
        self.state = CredentialState::Cached(token);
    }

    /// Drops a cached credential so the next build fetches a new one.
    ///
    /// Used by the manager to bypass the freshness check once after an
    /// auth-classified connect failure. No-op when `Unset` or `Disabled`.
    pub fn invalidate(&mut self) {
        if matches!(self.state, CredentialState::Cached(_)) {
            self.state = CredentialState::Unset;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token_expiring_in(seconds: i64) -> Token {
        Token::new("secret", Utc::now() + Duration::seconds(seconds))
    }

    #[test]
    fn test_empty_cache_is_not_fresh() {
        let cache = TokenCache::default();
        assert!(!cache.is_fresh(Utc::now()));
        assert_eq!(cache.secret(), None);
    }

    #[test]
    fn test_freshness_monotonicity() {
        // Anything beyond the margin is fresh, anything within it is stale.
        let mut cache = TokenCache::default();

        cache.store(token_expiring_in(3600));
        assert!(cache.is_fresh(Utc::now()));

        cache.store(token_expiring_in(181));
        assert!(cache.is_fresh(Utc::now()));

        cache.store(token_expiring_in(179));
        assert!(!cache.is_fresh(Utc::now()));

        cache.store(token_expiring_in(-10));
        assert!(!cache.is_fresh(Utc::now()));
    }

    #[test]
    fn test_custom_safety_margin() {
        let mut cache = TokenCache::new(std::time::Duration::from_secs(600));
        cache.store(token_expiring_in(300));
        assert!(!cache.is_fresh(Utc::now()));

        cache.store(token_expiring_in(700));
        assert!(cache.is_fresh(Utc::now()));
    }

    #[test]
    fn test_stale_token_secret_still_readable() {
        let mut cache = TokenCache::default();
        cache.store(token_expiring_in(-1));
        assert_eq!(cache.secret(), Some("secret"));
    }

    #[test]
    fn test_disabled_is_sticky() {
        let mut cache = TokenCache::default();
        cache.mark_disabled();
        cache.mark_disabled();

        cache.store(token_expiring_in(3600));
        assert_eq!(cache.state(), &CredentialState::Disabled);
        assert!(!cache.is_fresh(Utc::now()));

        cache.invalidate();
        assert_eq!(cache.state(), &CredentialState::Disabled);
    }

    #[test]
    fn test_disabled_survives_invalidate() {
        let mut cache = TokenCache::default();
        cache.mark_disabled();
        cache.invalidate();
        assert_eq!(cache.state(), &CredentialState::Disabled);
    }

    #[test]
    fn test_invalidate_drops_cached_token() {
        let mut cache = TokenCache::default();
        cache.store(token_expiring_in(3600));
        assert!(cache.is_fresh(Utc::now()));

        cache.invalidate();
        assert_eq!(cache.state(), &CredentialState::Unset);
        assert!(!cache.is_fresh(Utc::now()));
    }

    #[test]
    fn test_invalidate_on_empty_cache_is_noop() {
        let mut cache = TokenCache::default();
        cache.invalidate();
        assert_eq!(cache.state(), &CredentialState::Unset);
    }

    #[test]
    fn test_token_debug_redacts_secret() {
        let token = Token::new("hunter2", Utc::now() + Duration::hours(1));
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
