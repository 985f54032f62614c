//! Connection-parameter assembly.
//!
//! Parameters are rebuilt from scratch for every connect attempt: static
//! settings first, then the current credential injected into the `password`
//! key just before use. Nothing here is persisted; a parameter set lives for
//! exactly one attempt.

use crate::config::{ConnectSettings, IsolationLevel};
use crate::token::{Token, TokenCache};
use crate::{PgManagedError, Result, TokenProvider};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Driver options that are consumed by this crate (or by higher layers) and
/// must not leak into the low-level connect keys.
const NON_CONNECT_KEYS: &[&str] = &["assume_role", "isolation_level", "server_side_binding"];

/// Key/value parameters handed to [`Driver::connect`](crate::Driver::connect).
///
/// Keys follow libpq naming (`dbname`, `host`, `port`, `user`, `password`,
/// `sslmode`, `client_encoding`, ...). The transaction isolation hint rides
/// along as a typed field because it is applied after connecting, not during
/// the handshake.
#[derive(Clone, Default)]
pub struct ConnectionParams {
    map: BTreeMap<String, String>,
    isolation: Option<IsolationLevel>,
}

impl ConnectionParams {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Sets a parameter, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Removes a parameter, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.map.remove(key)
    }

    /// The post-connect transaction isolation hint, if configured.
    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation
    }

    /// Iterates over the parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Renders a libpq-style keyword/value connection string.
    ///
    /// Values are single-quoted when they contain spaces or quote
    /// characters, with backslash escaping inside.
    pub fn to_connection_string(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.iter() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(key);
            out.push('=');
            if value.is_empty() || value.contains([' ', '\'', '\\']) {
                out.push('\'');
                for c in value.chars() {
                    if c == '\'' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('\'');
            } else {
                out.push_str(value);
            }
        }
        out
    }
}

// The password key carries either a static secret or an access token;
// neither may appear in logs.
impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_map();
        for (key, value) in self.iter() {
            if key == "password" {
                s.entry(&key, &"<redacted>");
            } else {
                s.entry(&key, &value);
            }
        }
        s.finish()
    }
}

/// Builds connection parameters for one connect attempt.
///
/// Static settings are copied in first (non-connect keys stripped, TLS and
/// encoding defaults enforced), then the credential is resolved:
///
/// - A non-empty static password wins unconditionally and permanently
///   disables managed-identity lookups via [`TokenCache::mark_disabled`].
/// - Otherwise, a fresh cached token is reused as-is; a stale or missing one
///   is fetched from `provider`, stored, and injected.
///
/// Provider failures propagate unchanged; the builder never retries (the
/// bounded retry policy lives in the manager).
///
/// # Errors
///
/// - [`PgManagedError::Config`]: invalid settings (validation failures).
/// - [`PgManagedError::Auth`]: the provider denied the request or returned
///   an empty secret.
/// - [`PgManagedError::Network`]: the provider timed out or was unreachable.
pub async fn build_params(
    settings: &ConnectSettings,
    cache: &mut TokenCache,
    provider: Option<&dyn TokenProvider>,
) -> Result<ConnectionParams> {
    crate::validation::validate_settings(settings)?;

    let mut params = ConnectionParams::new();

    for (key, value) in &settings.options {
        if NON_CONNECT_KEYS.contains(&key.as_str()) {
            continue;
        }
        params.insert(key.as_str(), value.as_str());
    }

    if !settings.database.is_empty() {
        params.insert("dbname", settings.database.as_str());
    }
    params.insert("host", settings.host.as_str());
    if let Some(port) = settings.port {
        params.insert("port", port.to_string());
    }
    if let Some(user) = settings.user.as_deref().filter(|u| !u.is_empty()) {
        params.insert("user", user);
    }

    // TLS required unless the deployment explicitly opted out.
    if params.get("sslmode").is_none() {
        params.insert("sslmode", settings.sslmode.to_string());
    }
    // Always UTF-8; the rest of the stack assumes it.
    params.insert("client_encoding", "UTF8");

    params.isolation = match settings.isolation_level {
        Some(level) => Some(level),
        None => settings
            .options
            .get("isolation_level")
            .map(|v| IsolationLevel::parse(v))
            .transpose()?,
    };

    resolve_credential(settings, cache, provider, &mut params).await?;

    Ok(params)
}

async fn resolve_credential(
    settings: &ConnectSettings,
    cache: &mut TokenCache,
    provider: Option<&dyn TokenProvider>,
    params: &mut ConnectionParams,
) -> Result<()> {
    if settings.has_static_password() {
        // Static credentials always win and permanently suppress
        // managed-identity lookups for this manager.
        cache.mark_disabled();
        params.insert("password", settings.password.clone().unwrap_or_default());
        return Ok(());
    }

    let Some(identity) = settings.managed_identity.as_ref() else {
        return Ok(());
    };

    if cache.is_fresh(Utc::now()) {
        debug!("reusing cached access token");
        if let Some(secret) = cache.secret() {
            params.insert("password", secret);
        }
        return Ok(());
    }

    let provider = provider.ok_or_else(|| {
        PgManagedError::ProviderUnavailable(
            "managed identity is configured but no token provider was supplied".to_string(),
        )
    })?;

    info!(
        provider = provider.name(),
        client_id = %identity.client_id,
        "refreshing managed identity token"
    );

    let tenant = identity.tenant_id.as_deref();
    let token = fetch_with_timeout(provider, settings, tenant).await?;

    if token.secret().is_empty() {
        return Err(PgManagedError::Auth(
            "identity provider returned an empty token".to_string(),
        ));
    }

    params.insert("password", token.secret());
    cache.store(token);
    Ok(())
}

async fn fetch_with_timeout(
    provider: &dyn TokenProvider,
    settings: &ConnectSettings,
    tenant: Option<&str>,
) -> Result<Token> {
    match tokio::time::timeout(
        settings.token_timeout,
        provider.fetch(&settings.token_scope, tenant),
    )
    .await
    {
        Ok(result) => result,
        // A stuck provider must not wedge the manager; classified non-auth
        // so it does not trigger the credential retry.
        Err(_) => Err(PgManagedError::Network(format!(
            "identity provider did not answer within {:?}",
            settings.token_timeout
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ManagedIdentity, SslMode};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        secret: String,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn new(secret: &str) -> Self {
            Self {
                secret: secret.to_string(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch(&self, _scope: &str, _tenant: Option<&str>) -> Result<Token> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Token::new(
                self.secret.clone(),
                Utc::now() + Duration::hours(1),
            ))
        }
    }

    fn settings() -> ConnectSettings {
        ConnectSettings::new("orders", "db.example.com")
            .with_port(5432)
            .with_user("app")
    }

    #[tokio::test]
    async fn test_static_settings_copied() {
        let mut cache = TokenCache::default();
        let params = build_params(&settings(), &mut cache, None).await.unwrap();

        assert_eq!(params.get("dbname"), Some("orders"));
        assert_eq!(params.get("host"), Some("db.example.com"));
        assert_eq!(params.get("port"), Some("5432"));
        assert_eq!(params.get("user"), Some("app"));
        assert_eq!(params.get("password"), None);
    }

    #[tokio::test]
    async fn test_tls_and_encoding_defaults() {
        let mut cache = TokenCache::default();
        let params = build_params(&settings(), &mut cache, None).await.unwrap();

        assert_eq!(params.get("sslmode"), Some("require"));
        assert_eq!(params.get("client_encoding"), Some("UTF8"));
    }

    #[tokio::test]
    async fn test_explicit_sslmode_respected() {
        let mut cache = TokenCache::default();
        let cfg = settings().with_sslmode(SslMode::VerifyFull);
        let params = build_params(&cfg, &mut cache, None).await.unwrap();
        assert_eq!(params.get("sslmode"), Some("verify-full"));
    }

    #[tokio::test]
    async fn test_non_connect_keys_stripped() {
        let mut cache = TokenCache::default();
        let cfg = settings()
            .with_option("assume_role", "reader")
            .with_option("isolation_level", "serializable")
            .with_option("server_side_binding", "true")
            .with_option("application_name", "svc");
        let params = build_params(&cfg, &mut cache, None).await.unwrap();

        assert_eq!(params.get("assume_role"), None);
        assert_eq!(params.get("isolation_level"), None);
        assert_eq!(params.get("server_side_binding"), None);
        assert_eq!(params.get("application_name"), Some("svc"));
        assert_eq!(params.isolation_level(), Some(IsolationLevel::Serializable));
    }

    #[tokio::test]
    async fn test_static_password_disables_cache() {
        let mut cache = TokenCache::default();
        let provider = FixedProvider::new("token");
        let cfg = settings()
            .with_password("s3cret")
            .with_managed_identity(ManagedIdentity::new("mi-1"));

        let params = build_params(&cfg, &mut cache, Some(&provider)).await.unwrap();

        assert_eq!(params.get("password"), Some("s3cret"));
        assert_eq!(provider.calls(), 0);
        assert_eq!(cache.state(), &crate::token::CredentialState::Disabled);
    }

    #[tokio::test]
    async fn test_token_fetched_and_cached() {
        let mut cache = TokenCache::default();
        let provider = FixedProvider::new("abc");
        let cfg = settings().with_managed_identity(ManagedIdentity::new("mi-1"));

        let params = build_params(&cfg, &mut cache, Some(&provider)).await.unwrap();
        assert_eq!(params.get("password"), Some("abc"));
        assert_eq!(provider.calls(), 1);
        assert!(cache.is_fresh(Utc::now()));

        // Second build within the safety window reuses the cache.
        let params = build_params(&cfg, &mut cache, Some(&provider)).await.unwrap();
        assert_eq!(params.get("password"), Some("abc"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_token_is_auth_error() {
        let mut cache = TokenCache::default();
        let provider = FixedProvider::new("");
        let cfg = settings().with_managed_identity(ManagedIdentity::new("mi-1"));

        let err = build_params(&cfg, &mut cache, Some(&provider))
            .await
            .unwrap_err();
        assert!(err.is_auth());
        assert!(!cache.is_fresh(Utc::now()));
    }

    #[tokio::test]
    async fn test_missing_provider_is_reported() {
        let mut cache = TokenCache::default();
        let cfg = settings().with_managed_identity(ManagedIdentity::new("mi-1"));

        let err = build_params(&cfg, &mut cache, None).await.unwrap_err();
        assert!(matches!(err, PgManagedError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected() {
        let mut cache = TokenCache::default();
        let err = build_params(&ConnectSettings::new("", "db"), &mut cache, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PgManagedError::Config(_)));
    }

    #[test]
    fn test_connection_string_quoting() {
        let mut params = ConnectionParams::new();
        params.insert("dbname", "orders");
        params.insert("password", "has space");

        let s = params.to_connection_string();
        assert_eq!(s, "dbname=orders password='has space'");
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut params = ConnectionParams::new();
        params.insert("host", "db");
        params.insert("password", "hunter2");

        let rendered = format!("{:?}", params);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("db"));
    }
}
