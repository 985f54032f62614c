//! Connection lifecycle management.
//!
//! One [`ConnectionManager`] per logical database alias. The manager owns the
//! credential cache, the lazily-created identity-provider client, and the
//! live connection; everything mutable sits behind a single `tokio` mutex so
//! concurrent callers cannot race the check-then-act sequence (freshness
//! check, fetch, store, connect) against each other.

use crate::config::ConnectSettings;
use crate::driver::{Connection, Driver};
use crate::params::{build_params, ConnectionParams};
use crate::token::TokenCache;
use crate::{PgManagedError, Result, TokenProvider};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Lifecycle state of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// No live connection. Initial state, and the recovery point after any
    /// failure; re-enterable, never terminal.
    Disconnected,
    /// A connect attempt is in progress.
    Connecting,
    /// A live connection is held.
    Connected,
    /// The first attempt failed with an auth-classified error; a forced
    /// credential refresh and one more attempt are in progress.
    Reconnecting,
}

impl ManagerState {
    /// Check if a transition is valid.
    pub fn can_transition_to(&self, next: ManagerState) -> bool {
        use ManagerState::*;

        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Reconnecting)
                | (Reconnecting, Connected)
                | (_, Disconnected)
        )
    }
}

impl std::fmt::Display for ManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Mutable state guarded by the manager's mutex.
struct Inner {
    state: ManagerState,
    cache: TokenCache,
    /// Identity-provider client. Expensive to construct; created on first
    /// use and reused across reconnects for the manager's lifetime.
    provider: Option<Arc<dyn TokenProvider>>,
    /// The live connection, exclusively owned; replaced, never shared.
    conn: Option<Box<dyn Connection>>,
}

impl Inner {
    fn set_state(&mut self, next: ManagerState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid state transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "connection state transition");
        self.state = next;
    }
}

/// Keeps one logical database connection alive, refreshing short-lived
/// credentials as needed.
///
/// Construct one instance per configured database alias at startup (or
/// lazily on first use) and share it behind an `Arc`; it lives for the
/// process lifetime. There is deliberately no module-level singleton: the
/// mutual-exclusion requirement is visible at construction time.
///
/// # Example
///
/// ```no_run
/// use pgmanaged::{ConnectionManager, ConnectSettings, ManagedIdentity};
/// use pgmanaged::drivers::mock::MockDriver;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> pgmanaged::Result<()> {
///     let settings = ConnectSettings::new("orders", "db.example.com")
///         .with_user("app@example.com")
///         .with_managed_identity(ManagedIdentity::new("mi-1"));
///
///     let manager = ConnectionManager::new(settings, Arc::new(MockDriver::always_ok()))?;
///
///     // Call per inbound unit of work; the fast path is a no-op.
///     manager.ensure_connection().await?;
///     Ok(())
/// }
/// ```
pub struct ConnectionManager {
    settings: ConnectSettings,
    driver: Arc<dyn Driver>,
    inner: Mutex<Inner>,
}

impl ConnectionManager {
    /// Creates a manager for the given settings and driver.
    ///
    /// The identity-provider client is built lazily on the first connect
    /// attempt that needs a token, via [`factory::new_provider`](crate::factory::new_provider).
    ///
    /// # Errors
    ///
    /// Returns [`PgManagedError::Config`] if the settings fail validation;
    /// misconfiguration is surfaced at construction, not inside the
    /// reconnect path.
    pub fn new(settings: ConnectSettings, driver: Arc<dyn Driver>) -> Result<Self> {
        Self::build(settings, driver, None)
    }

    /// Creates a manager with an explicitly supplied identity provider.
    ///
    /// Useful for tests and for providers the factory does not know about.
    pub fn with_provider(
        settings: ConnectSettings,
        driver: Arc<dyn Driver>,
        provider: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        Self::build(settings, driver, Some(provider))
    }

    fn build(
        settings: ConnectSettings,
        driver: Arc<dyn Driver>,
        provider: Option<Arc<dyn TokenProvider>>,
    ) -> Result<Self> {
        crate::validation::validate_settings(&settings)?;
        let cache = TokenCache::new(settings.safety_margin);
        Ok(Self {
            settings,
            driver,
            inner: Mutex::new(Inner {
                state: ManagerState::Disconnected,
                cache,
                provider,
                conn: None,
            }),
        })
    }

    /// The settings this manager was built from.
    pub fn settings(&self) -> &ConnectSettings {
        &self.settings
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ManagerState {
        self.inner.lock().await.state
    }

    /// True when a live connection is currently held.
    pub async fn is_connected(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.state == ManagerState::Connected && inner.conn.is_some()
    }

    /// Guarantees a live connection, establishing or repairing one if
    /// needed.
    ///
    /// This is the health-check entry point, intended to be called once per
    /// inbound unit of work. The common case (connected, healthy) returns
    /// immediately.
    ///
    /// On a connect failure classified as auth, the cached credential is
    /// force-expired, parameters are rebuilt (fetching a brand-new token),
    /// and the connect is retried **exactly once**. A second failure, or any
    /// non-auth failure, is propagated immediately; the caller decides
    /// whether to call again later (surface an upstream 503 rather than
    /// retrying in a tight loop).
    ///
    /// # Errors
    ///
    /// - [`PgManagedError::Auth`]: credentials rejected even after a forced
    ///   refresh.
    /// - [`PgManagedError::Network`]: server or identity provider
    ///   unreachable, or a timeout.
    /// - [`PgManagedError::Config`]: unusable settings.
    pub async fn ensure_connection(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_locked(&mut inner).await
    }

    /// Like [`ensure_connection`](Self::ensure_connection), but returns a
    /// guard borrowing the live connection.
    ///
    /// The guard holds the manager's lock: keep it only for the duration of
    /// one operation.
    pub async fn lease(&self) -> Result<ConnectionGuard<'_>> {
        let mut inner = self.inner.lock().await;
        self.ensure_locked(&mut inner).await?;
        Ok(ConnectionGuard { inner })
    }

    /// Drops the live connection, if any.
    pub async fn disconnect(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(mut conn) = inner.conn.take() {
            conn.close().await?;
        }
        inner.set_state(ManagerState::Disconnected);
        Ok(())
    }

    async fn ensure_locked(&self, inner: &mut Inner) -> Result<()> {
        if inner.state == ManagerState::Connected {
            match &inner.conn {
                Some(conn) if conn.is_healthy() => return Ok(()),
                _ => {
                    warn!(
                        host = %self.settings.host,
                        dbname = %self.settings.database,
                        "held connection is no longer healthy, reconnecting"
                    );
                    inner.conn = None;
                }
            }
        }

        inner.set_state(ManagerState::Connecting);

        match self.attempt(inner).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_auth() => {
                warn!(
                    error = %err,
                    "connection attempt failed with an auth error, refreshing credentials and retrying once"
                );
                inner.set_state(ManagerState::Reconnecting);
                // Bypass the freshness check exactly once so the rebuild
                // fetches a brand-new token.
                inner.cache.invalidate();

                match self.attempt(inner).await {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        error!(error = %err, "reconnect after credential refresh failed");
                        inner.conn = None;
                        inner.set_state(ManagerState::Disconnected);
                        Err(err)
                    }
                }
            }
            Err(err) => {
                // Non-auth failures would not be helped by a fresh token.
                inner.conn = None;
                inner.set_state(ManagerState::Disconnected);
                Err(err)
            }
        }
    }

    /// One build-and-connect attempt; no retries at this level.
    async fn attempt(&self, inner: &mut Inner) -> Result<()> {
        let provider = self.provider_handle(inner)?;
        let params = self.build_params_for_attempt(inner, provider.as_deref()).await?;
        let conn = self.connect_with_timeout(&params).await?;

        inner.conn = Some(conn);
        inner.set_state(ManagerState::Connected);
        info!(
            host = %self.settings.host,
            dbname = %self.settings.database,
            driver = self.driver.name(),
            "connection established"
        );
        Ok(())
    }

    async fn build_params_for_attempt(
        &self,
        inner: &mut Inner,
        provider: Option<&dyn TokenProvider>,
    ) -> Result<ConnectionParams> {
        build_params(&self.settings, &mut inner.cache, provider).await
    }

    async fn connect_with_timeout(&self, params: &ConnectionParams) -> Result<Box<dyn Connection>> {
        match tokio::time::timeout(self.settings.connect_timeout, self.driver.connect(params))
            .await
        {
            Ok(result) => result,
            // Classified non-auth: a timed-out handshake is not evidence of
            // a stale credential.
            Err(_) => Err(PgManagedError::Network(format!(
                "connect did not complete within {:?}",
                self.settings.connect_timeout
            ))),
        }
    }

    /// Returns the identity-provider client, creating it on first use.
    ///
    /// Returns `None` when token auth is not in play (static password, or no
    /// managed identity configured).
    fn provider_handle(&self, inner: &mut Inner) -> Result<Option<Arc<dyn TokenProvider>>> {
        if self.settings.has_static_password() {
            return Ok(None);
        }
        let Some(identity) = self.settings.managed_identity.as_ref() else {
            return Ok(None);
        };

        if inner.provider.is_none() {
            let provider = crate::factory::new_provider(identity)?;
            info!(
                provider = provider.name(),
                client_id = %identity.client_id,
                "created identity provider client"
            );
            inner.provider = Some(provider);
        }

        Ok(inner.provider.clone())
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("host", &self.settings.host)
            .field("database", &self.settings.database)
            .field("driver", &self.driver.name())
            .finish_non_exhaustive()
    }
}

/// Borrowed access to the live connection for the duration of one operation.
///
/// Holds the manager's lock; dropping the guard releases it. Do not retain a
/// guard past the operation it was leased for.
pub struct ConnectionGuard<'a> {
    inner: MutexGuard<'a, Inner>,
}

impl std::ops::Deref for ConnectionGuard<'_> {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.inner
            .conn
            .as_deref()
            .expect("a guard is only handed out while a connection is held")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let state = ManagerState::Disconnected;
        assert!(state.can_transition_to(ManagerState::Connecting));
        assert!(ManagerState::Connecting.can_transition_to(ManagerState::Connected));
        assert!(ManagerState::Connecting.can_transition_to(ManagerState::Reconnecting));
        assert!(ManagerState::Reconnecting.can_transition_to(ManagerState::Connected));
        assert!(ManagerState::Connected.can_transition_to(ManagerState::Connecting));
    }

    #[test]
    fn test_disconnected_reachable_from_anywhere() {
        assert!(ManagerState::Connecting.can_transition_to(ManagerState::Disconnected));
        assert!(ManagerState::Reconnecting.can_transition_to(ManagerState::Disconnected));
        assert!(ManagerState::Connected.can_transition_to(ManagerState::Disconnected));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!ManagerState::Disconnected.can_transition_to(ManagerState::Connected));
        assert!(!ManagerState::Disconnected.can_transition_to(ManagerState::Reconnecting));
        assert!(!ManagerState::Connected.can_transition_to(ManagerState::Reconnecting));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ManagerState::Disconnected.to_string(), "disconnected");
        assert_eq!(ManagerState::Reconnecting.to_string(), "reconnecting");
    }
}
