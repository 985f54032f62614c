//! `tokio-postgres` driver adapter.
//!
//! Classifies the library's errors into the crate taxonomy at the boundary,
//! so the manager's retry logic never sees `tokio_postgres::Error` directly.

use crate::config::IsolationLevel;
use crate::driver::{Connection, Driver};
use crate::params::ConnectionParams;
use crate::{PgManagedError, Result};
use async_trait::async_trait;
use tokio_postgres::error::SqlState;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::{Client, NoTls, Socket};
use tracing::debug;

/// Driver backed by `tokio-postgres`.
///
/// Generic over the TLS connector; pass `NoTls` only for deployments that
/// genuinely run without TLS (the parameter builder defaults `sslmode` to
/// `require` for a reason).
#[derive(Clone)]
pub struct PostgresDriver<T> {
    tls: T,
}

impl<T> PostgresDriver<T> {
    /// Creates a driver with the given TLS connector.
    pub fn new(tls: T) -> Self {
        Self { tls }
    }
}

impl PostgresDriver<NoTls> {
    /// Driver without TLS, for local development against trusted networks.
    pub fn insecure() -> Self {
        Self::new(NoTls)
    }
}

#[async_trait]
impl<T> Driver for PostgresDriver<T>
where
    T: MakeTlsConnect<Socket> + Clone + Send + Sync + 'static,
    T::Stream: Send,
    T::TlsConnect: Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    fn name(&self) -> &str {
        "tokio-postgres"
    }

    async fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn Connection>> {
        let conn_str = params.to_connection_string();

        let (client, connection) = tokio_postgres::connect(&conn_str, self.tls.clone())
            .await
            .map_err(classify)?;

        // The connection future must be polled for the client to make
        // progress; it resolves when the connection closes.
        let task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "postgres connection task ended with error");
            }
        });

        if let Some(level) = params.isolation_level() {
            apply_isolation(&client, level).await?;
        }

        Ok(Box::new(PostgresConnection { client, task }))
    }
}

async fn apply_isolation(client: &Client, level: IsolationLevel) -> Result<()> {
    let stmt = format!(
        "SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL {}",
        level.as_sql()
    );
    client.batch_execute(&stmt).await.map_err(classify)
}

/// Maps `tokio_postgres` errors onto the closed taxonomy.
///
/// SQLSTATE class 28 (invalid authorization) is the credential signal the
/// manager retries on; everything else is either configuration (unknown
/// database) or network.
fn classify(err: tokio_postgres::Error) -> PgManagedError {
    if let Some(db_err) = err.as_db_error() {
        let code = db_err.code();
        if code == &SqlState::INVALID_PASSWORD
            || code == &SqlState::INVALID_AUTHORIZATION_SPECIFICATION
            || code == &SqlState::INSUFFICIENT_PRIVILEGE
        {
            return PgManagedError::Auth(db_err.message().to_string());
        }
        if code == &SqlState::INVALID_CATALOG_NAME {
            return PgManagedError::Config(db_err.message().to_string());
        }
        return PgManagedError::Network(db_err.message().to_string());
    }

    PgManagedError::Network(err.to_string())
}

/// Live `tokio-postgres` connection plus its I/O task.
pub struct PostgresConnection {
    client: Client,
    task: tokio::task::JoinHandle<()>,
}

impl PostgresConnection {
    /// The underlying client, for running queries.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn is_healthy(&self) -> bool {
        !self.client.is_closed()
    }

    async fn close(&mut self) -> Result<()> {
        self.task.abort();
        Ok(())
    }
}

impl Drop for PostgresConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}
