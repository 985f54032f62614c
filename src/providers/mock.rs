//! Mock identity provider for testing.

use crate::{PgManagedError, Result, Token, TokenProvider};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-memory provider double with scripted responses and call counting.
///
/// By default every `fetch` succeeds with a distinct secret
/// (`mock-token-1`, `mock-token-2`, ...) expiring an hour out, so tests can
/// observe that a forced refresh really produced a new credential. Failures
/// can be queued with [`push_failure`](Self::push_failure); queued responses
/// are consumed before the default kicks in.
///
/// # Example
///
/// ```
/// use pgmanaged::providers::mock::MockProvider;
/// use pgmanaged::TokenProvider;
///
/// #[tokio::main]
/// async fn main() {
///     let provider = MockProvider::new();
///     let token = provider.fetch("scope", None).await.unwrap();
///     assert_eq!(token.secret(), "mock-token-1");
///     assert_eq!(provider.fetch_count(), 1);
/// }
/// ```
enum MockFetch {
    Respond(Result<Token>),
    Hang,
}

pub struct MockProvider {
    queued: Mutex<VecDeque<MockFetch>>,
    token_ttl: Duration,
    calls: AtomicUsize,
    last_scope: Mutex<Option<String>>,
    last_tenant: Mutex<Option<String>>,
}

impl MockProvider {
    /// Creates a provider that always succeeds with hour-long tokens.
    pub fn new() -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            token_ttl: Duration::hours(1),
            calls: AtomicUsize::new(0),
            last_scope: Mutex::new(None),
            last_tenant: Mutex::new(None),
        }
    }

    /// Creates a provider whose default tokens expire after `ttl`.
    pub fn with_ttl(ttl: std::time::Duration) -> Self {
        Self {
            token_ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::hours(1)),
            ..Self::new()
        }
    }

    /// Queues an explicit token for the next fetch.
    pub fn push_token(&self, token: Token) {
        self.queued
            .lock()
            .unwrap()
            .push_back(MockFetch::Respond(Ok(token)));
    }

    /// Queues a failure for the next fetch.
    pub fn push_failure(&self, err: PgManagedError) {
        self.queued
            .lock()
            .unwrap()
            .push_back(MockFetch::Respond(Err(err)));
    }

    /// Queues a fetch that never resolves, for exercising token timeouts.
    pub fn push_hang(&self) {
        self.queued.lock().unwrap().push_back(MockFetch::Hang);
    }

    /// Number of fetches performed so far.
    pub fn fetch_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Scope passed to the most recent fetch.
    pub fn last_scope(&self) -> Option<String> {
        self.last_scope.lock().unwrap().clone()
    }

    /// Tenant passed to the most recent fetch.
    pub fn last_tenant(&self) -> Option<String> {
        self.last_tenant.lock().unwrap().clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, scope: &str, tenant: Option<&str>) -> Result<Token> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_scope.lock().unwrap() = Some(scope.to_string());
        *self.last_tenant.lock().unwrap() = tenant.map(str::to_string);

        let scripted = self.queued.lock().unwrap().pop_front();
        match scripted {
            Some(MockFetch::Respond(response)) => return response,
            // The fetch is already counted at this point.
            Some(MockFetch::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => {}
        }

        Ok(Token::new(
            format!("mock-token-{}", call),
            Utc::now() + self.token_ttl,
        ))
    }
}
