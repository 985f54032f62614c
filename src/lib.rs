//! Pgmanaged - managed-identity aware PostgreSQL connection keeper.
//!
//! Pgmanaged keeps one logical database connection alive while transparently
//! refreshing short-lived authentication credentials (cloud managed-identity
//! access tokens) before they expire, and recovering - with exactly one
//! retry - when a connection attempt fails because a credential went stale.
//!
//! # Features
//!
//! - **Token caching**: tokens are reused until a configurable safety margin
//!   before expiry (default 3 minutes), so the identity provider is not
//!   hammered on every request
//! - **Bounded recovery**: an auth-classified connect failure triggers one
//!   forced token refresh and one reconnect; everything else surfaces
//!   immediately
//! - **Static-password escape hatch**: a configured password permanently
//!   suppresses managed-identity lookups for that connection
//! - **Closed error taxonomy**: driver and provider failures are classified
//!   into `Auth` / `Network` / `Config` at the boundary
//! - **Pluggable seams**: the wire driver and the identity provider are
//!   traits; mock doubles ship behind the default `mock` feature
//!
//! # Quick Start
//!
//! ```no_run
//! use pgmanaged::{ConnectionManager, ConnectSettings, ManagedIdentity};
//! use pgmanaged::drivers::mock::MockDriver;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> pgmanaged::Result<()> {
//!     let settings = ConnectSettings::new("orders", "db.example.com")
//!         .with_user("app@example.com")
//!         .with_managed_identity(ManagedIdentity::new("mi-1").with_tenant("t-1"));
//!
//!     let manager = ConnectionManager::new(settings, Arc::new(MockDriver::always_ok()))?;
//!
//!     // Call once per inbound unit of work (e.g. from request middleware).
//!     // Connected and healthy is a no-op; anything else reconnects.
//!     manager.ensure_connection().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! | Feature | Default | Provides |
//! |---------|---------|----------|
//! | `mock` | yes | in-memory driver and provider doubles |
//! | `azure` | no | [`providers::azure::AzureProvider`] (DefaultAzureCredential) |
//! | `postgres` | no | [`drivers::postgres::PostgresDriver`] (tokio-postgres) |
//!
//! ```toml
//! [dependencies]
//! pgmanaged = { version = "0.1", features = ["azure", "postgres"] }
//! ```
//!
//! # Concurrency
//!
//! A manager may be shared across tasks behind an `Arc`; one internal mutex
//! serializes the whole freshness-check / fetch / store / connect sequence,
//! so concurrent callers can never trigger duplicate token fetches or step
//! on each other's reconnect. Connection establishment is rare relative to
//! request volume, so the single lock is not a throughput concern.

pub mod config;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod factory;
pub mod manager;
pub mod params;
pub mod provider;
pub mod providers;
pub mod token;
pub mod validation;

pub use config::{ConnectSettings, IsolationLevel, ManagedIdentity, SslMode};
pub use driver::{Connection, Driver};
pub use error::{PgManagedError, Result};
pub use manager::{ConnectionGuard, ConnectionManager, ManagerState};
pub use params::ConnectionParams;
pub use provider::TokenProvider;
pub use token::{CredentialState, Token, TokenCache};
