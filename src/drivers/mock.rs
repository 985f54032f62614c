//! Mock driver for testing.

use crate::driver::{Connection, Driver};
use crate::params::ConnectionParams;
use crate::{PgManagedError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Outcome of one scripted connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Hand out a connection.
    Ok,
    /// Fail with an auth-classified error (triggers the manager's retry).
    AuthError,
    /// Fail with a network-classified error (never retried).
    NetworkError,
    /// Fail with a config-classified error (never retried).
    ConfigError,
    /// Never resolve, so callers can exercise their connect timeout.
    Hang,
}

/// Scripted driver double.
///
/// Outcomes queued with [`push_outcome`](Self::push_outcome) are consumed
/// one per connect; once the queue is empty the default outcome applies.
/// Every attempt is counted and the password it carried recorded, so tests
/// can assert on both the retry bound and the credential actually used.
///
/// # Example
///
/// ```
/// use pgmanaged::drivers::mock::{ConnectOutcome, MockDriver};
///
/// let driver = MockDriver::always_ok();
/// driver.push_outcome(ConnectOutcome::AuthError); // first attempt fails
/// ```
pub struct MockDriver {
    queued: Mutex<VecDeque<ConnectOutcome>>,
    default_outcome: ConnectOutcome,
    connects: AtomicUsize,
    passwords: Mutex<Vec<Option<String>>>,
    healthy: Arc<AtomicBool>,
}

impl MockDriver {
    /// Creates a driver with the given default outcome.
    pub fn new(default_outcome: ConnectOutcome) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            default_outcome,
            connects: AtomicUsize::new(0),
            passwords: Mutex::new(Vec::new()),
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Driver whose connects always succeed.
    pub fn always_ok() -> Self {
        Self::new(ConnectOutcome::Ok)
    }

    /// Driver whose connects always fail with an auth error.
    pub fn always_auth_error() -> Self {
        Self::new(ConnectOutcome::AuthError)
    }

    /// Queues an outcome for the next connect attempt.
    pub fn push_outcome(&self, outcome: ConnectOutcome) {
        self.queued.lock().unwrap().push_back(outcome);
    }

    /// Number of connect attempts so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// The `password` parameter observed on each attempt, in order.
    pub fn password_history(&self) -> Vec<Option<String>> {
        self.passwords.lock().unwrap().clone()
    }

    /// Flips the health flag of every connection this driver handed out.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.passwords
            .lock()
            .unwrap()
            .push(params.get("password").map(str::to_string));

        let outcome = self
            .queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default_outcome);

        match outcome {
            ConnectOutcome::Ok => {
                self.healthy.store(true, Ordering::SeqCst);
                Ok(Box::new(MockConnection {
                    healthy: Arc::clone(&self.healthy),
                    closed: AtomicBool::new(false),
                }))
            }
            ConnectOutcome::AuthError => Err(PgManagedError::Auth(
                "password authentication failed".to_string(),
            )),
            ConnectOutcome::NetworkError => Err(PgManagedError::Network(
                "could not connect to server: connection refused".to_string(),
            )),
            ConnectOutcome::ConfigError => Err(PgManagedError::Config(
                "database does not exist".to_string(),
            )),
            // The attempt is already counted at this point.
            ConnectOutcome::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// Connection handed out by [`MockDriver`].
pub struct MockConnection {
    healthy: Arc<AtomicBool>,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for MockConnection {
    fn is_healthy(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.healthy.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
