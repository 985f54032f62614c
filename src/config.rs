//! Connection settings consumed by the manager.
//!
//! Settings arrive here already resolved (environment/file parsing is the
//! embedding application's job). The builder pattern keeps call sites
//! readable:
//!
//! ```
//! use pgmanaged::{ConnectSettings, ManagedIdentity};
//!
//! let settings = ConnectSettings::new("orders", "db.example.com")
//!     .with_user("app@example.com")
//!     .with_managed_identity(ManagedIdentity::new("mi-1").with_tenant("t-1"))
//!     .with_option("application_name", "orders-svc");
//! ```

use crate::{PgManagedError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default TCP connect timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default identity-provider fetch timeout (15 seconds).
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(15);

/// Default token scope for Azure Database for PostgreSQL (AAD authentication).
pub const DEFAULT_TOKEN_SCOPE: &str = "https://ossrdbms-aad.database.windows.net/.default";

/// TLS requirement passed to the driver as the `sslmode` parameter.
///
/// Defaults to [`SslMode::Require`]: managed database services hand out
/// tokens that must never travel in cleartext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// No TLS.
    Disable,
    /// TLS if the server offers it.
    Prefer,
    /// TLS required, no certificate verification.
    #[default]
    Require,
    /// TLS required, CA-verified.
    VerifyCa,
    /// TLS required, CA- and hostname-verified.
    VerifyFull,
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disable => write!(f, "disable"),
            Self::Prefer => write!(f, "prefer"),
            Self::Require => write!(f, "require"),
            Self::VerifyCa => write!(f, "verify-ca"),
            Self::VerifyFull => write!(f, "verify-full"),
        }
    }
}

/// Transaction isolation hint.
///
/// Consumed by the manager after connecting; deliberately *not* a low-level
/// connect parameter, so the builder strips it from driver options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Parses the value accepted in driver options.
    ///
    /// # Errors
    ///
    /// Returns [`PgManagedError::Config`] for unknown level names.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "read_uncommitted" => Ok(Self::ReadUncommitted),
            "read_committed" => Ok(Self::ReadCommitted),
            "repeatable_read" => Ok(Self::RepeatableRead),
            "serializable" => Ok(Self::Serializable),
            other => Err(PgManagedError::Config(format!(
                "invalid transaction isolation level '{}'",
                other
            ))),
        }
    }

    /// SQL spelling, e.g. for `SET SESSION CHARACTERISTICS`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// Managed-identity settings for token-based authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedIdentity {
    /// Client id of the user-assigned managed identity.
    pub client_id: String,
    /// Directory (tenant) id, if the provider needs one.
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl ManagedIdentity {
    /// Creates managed-identity settings for the given client id.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            tenant_id: None,
        }
    }

    /// Sets the tenant id.
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Resolved settings for one logical database alias.
///
/// A static non-empty `password` always wins over managed identity and
/// permanently disables token refresh for the owning manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectSettings {
    /// Database name. May be empty only when a `service` driver option
    /// supplies the target instead.
    pub database: String,

    /// Server host name or address.
    pub host: String,

    /// Server port (`None` = driver default, 5432).
    pub port: Option<u16>,

    /// Role to connect as.
    pub user: Option<String>,

    /// Static password. Non-empty ⇒ managed-identity lookup is suppressed.
    pub password: Option<String>,

    /// TLS requirement (default: require).
    pub sslmode: SslMode,

    /// Managed-identity settings, if token auth is wanted.
    pub managed_identity: Option<ManagedIdentity>,

    /// Token scope requested from the identity provider.
    pub token_scope: String,

    /// Transaction isolation hint, consumed separately from connect keys.
    pub isolation_level: Option<IsolationLevel>,

    /// Lead time before expiry at which a cached token counts as stale.
    pub safety_margin: Duration,

    /// Bound on one `connect()` attempt.
    pub connect_timeout: Duration,

    /// Bound on one identity-provider fetch.
    pub token_timeout: Duration,

    /// Extra driver options (`application_name`, `service`, ...). Keys that
    /// are not valid low-level connect keys are stripped by the builder.
    pub options: BTreeMap<String, String>,
}

impl ConnectSettings {
    /// Creates settings for the given database and host, with defaults for
    /// everything else.
    pub fn new(database: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            host: host.into(),
            port: None,
            user: None,
            password: None,
            sslmode: SslMode::default(),
            managed_identity: None,
            token_scope: DEFAULT_TOKEN_SCOPE.to_string(),
            isolation_level: None,
            safety_margin: crate::token::DEFAULT_SAFETY_MARGIN,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            token_timeout: DEFAULT_TOKEN_TIMEOUT,
            options: BTreeMap::new(),
        }
    }

    /// Sets the server port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the role to connect as.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets a static password.
    ///
    /// A non-empty value permanently suppresses managed-identity lookups
    /// for the manager built from these settings.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the TLS requirement.
    pub fn with_sslmode(mut self, sslmode: SslMode) -> Self {
        self.sslmode = sslmode;
        self
    }

    /// Enables managed-identity token authentication.
    pub fn with_managed_identity(mut self, identity: ManagedIdentity) -> Self {
        self.managed_identity = Some(identity);
        self
    }

    /// Overrides the token scope requested from the identity provider.
    pub fn with_token_scope(mut self, scope: impl Into<String>) -> Self {
        self.token_scope = scope.into();
        self
    }

    /// Sets the transaction isolation hint.
    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    /// Overrides the staleness safety margin (default: 3 minutes).
    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    /// Overrides the connect timeout (default: 10 seconds).
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Overrides the token fetch timeout (default: 15 seconds).
    pub fn with_token_timeout(mut self, timeout: Duration) -> Self {
        self.token_timeout = timeout;
        self
    }

    /// Adds an extra driver option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// True when a usable static password is configured.
    pub fn has_static_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_builder() {
        let settings = ConnectSettings::new("orders", "db.example.com")
            .with_port(5433)
            .with_user("app")
            .with_managed_identity(ManagedIdentity::new("mi-1").with_tenant("t-1"))
            .with_safety_margin(Duration::from_secs(60))
            .with_option("application_name", "orders-svc");

        assert_eq!(settings.database, "orders");
        assert_eq!(settings.port, Some(5433));
        assert_eq!(settings.safety_margin, Duration::from_secs(60));
        assert_eq!(
            settings
                .managed_identity
                .as_ref()
                .unwrap()
                .tenant_id
                .as_deref(),
            Some("t-1")
        );
        assert_eq!(
            settings.options.get("application_name").map(String::as_str),
            Some("orders-svc")
        );
    }

    #[test]
    fn test_defaults() {
        let settings = ConnectSettings::new("orders", "db");
        assert_eq!(settings.sslmode, SslMode::Require);
        assert_eq!(settings.safety_margin, Duration::from_secs(180));
        assert_eq!(settings.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(settings.token_scope, DEFAULT_TOKEN_SCOPE);
        assert!(!settings.has_static_password());
    }

    #[test]
    fn test_empty_password_is_not_static() {
        // An explicitly empty password means "no password", not static auth.
        let settings = ConnectSettings::new("orders", "db").with_password("");
        assert!(!settings.has_static_password());

        let settings = ConnectSettings::new("orders", "db").with_password("s3cret");
        assert!(settings.has_static_password());
    }

    #[test]
    fn test_sslmode_display() {
        assert_eq!(SslMode::Require.to_string(), "require");
        assert_eq!(SslMode::VerifyFull.to_string(), "verify-full");
        assert_eq!(SslMode::Disable.to_string(), "disable");
    }

    #[test]
    fn test_isolation_level_parse() {
        assert_eq!(
            IsolationLevel::parse("serializable").unwrap(),
            IsolationLevel::Serializable
        );
        assert_eq!(
            IsolationLevel::parse("repeatable_read").unwrap(),
            IsolationLevel::RepeatableRead
        );
        assert!(IsolationLevel::parse("chaotic").is_err());
    }

    #[test]
    fn test_isolation_level_sql() {
        assert_eq!(IsolationLevel::ReadCommitted.as_sql(), "READ COMMITTED");
    }
}
