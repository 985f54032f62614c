//! Wire-driver boundary.
//!
//! The SQL driver is a black box to this crate: all the manager needs is
//! "connect with these parameters" and "is the connection still usable".
//! Driver adapters classify their native errors into the closed
//! [`PgManagedError`](crate::PgManagedError) taxonomy right here at the
//! boundary, so the retry logic never inspects library-specific error types.

use crate::params::ConnectionParams;
use crate::Result;
use async_trait::async_trait;

/// A live physical connection to the server.
///
/// Owned exclusively by the [`ConnectionManager`](crate::ConnectionManager);
/// callers borrow it for the duration of one operation and must not retain
/// it past that.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Cheap health probe used by the manager's fast path.
    ///
    /// Should not perform a network round-trip; "the driver has not reported
    /// the connection broken" is the expected level of assurance.
    fn is_healthy(&self) -> bool;

    /// Closes the connection. Idempotent.
    async fn close(&mut self) -> Result<()>;
}

/// A driver capable of establishing connections.
///
/// # Error classification
///
/// - [`PgManagedError::Auth`](crate::PgManagedError::Auth): the server
///   rejected the credentials (invalid password, expired token). Triggers
///   the manager's single refresh-and-retry.
/// - [`PgManagedError::Network`](crate::PgManagedError::Network): the server
///   was unreachable or closed the connection for a non-credential reason.
///   Never retried.
/// - [`PgManagedError::Config`](crate::PgManagedError::Config): the
///   parameters themselves are unusable (unknown database, bad option).
///   Never retried.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Returns the driver name (e.g. "tokio-postgres", "mock"), used in logs.
    fn name(&self) -> &str;

    /// Attempts to establish one connection.
    async fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn Connection>>;
}
