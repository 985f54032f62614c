//! Error types for pgmanaged operations.

use thiserror::Error;

/// Result type alias using [`PgManagedError`].
pub type Result<T> = std::result::Result<T, PgManagedError>;

/// Errors that can occur while establishing or maintaining a connection.
///
/// The closed `Auth` / `Network` / `Config` taxonomy is what drives the
/// manager's retry decision: drivers and providers classify their failures
/// into these variants at the boundary, and everything downstream matches on
/// the tagged variant rather than on library-specific error hierarchies.
///
/// All errors implement `std::error::Error` and can be chained with `source()`.
#[derive(Debug, Error)]
pub enum PgManagedError {
    /// The server or identity provider rejected the credentials, or the
    /// provider returned an empty/invalid token.
    ///
    /// This is the only class of failure the manager recovers from locally
    /// (one forced token refresh followed by one reconnect attempt).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The server or identity provider could not be reached, or the attempt
    /// timed out. Never retried by this crate; the caller decides when to
    /// try again.
    #[error("network error: {0}")]
    Network(String),

    /// Static configuration is invalid (missing database name, invalid
    /// isolation level, ...). Fatal at build time, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// The identity provider for the configured credential source is not
    /// compiled in (missing feature flag).
    #[error("identity provider not available: {0}")]
    ProviderUnavailable(String),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PgManagedError {
    /// Returns true if this failure is credential-related.
    ///
    /// Auth-classified failures are the only ones that trigger the manager's
    /// single refresh-and-retry cycle.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Returns true if this failure may resolve on its own later, as opposed
    /// to a configuration problem that needs operator action.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Network(_))
    }
}
