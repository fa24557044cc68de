//! Fact Session State
//!
//! The observable contract a page-level consumer renders from: the guest
//! authentication state, the outcome of the latest fact lookup, and the
//! `request_fact` action. State is published on `tokio::sync::watch`
//! channels so a view can subscribe and redraw on every transition.
//!
//! Concurrent `request_fact` calls are neither queued nor coalesced. The
//! visible result is whichever call *resolved* last, not whichever was
//! issued last.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::credentials::{AuthError, CredentialProvider, GuestCredentials};
use crate::facts::{FactsClient, FetchError};

/// Guest authentication lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Uninitialized,
    Loading,
    Ready(GuestCredentials),
    Failed(AuthError),
}

impl AuthState {
    pub fn credentials(&self) -> Option<&GuestCredentials> {
        match self {
            AuthState::Ready(credentials) => Some(credentials),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, AuthState::Ready(_))
    }
}

/// Outcome of the most recently resolved fact lookup
#[derive(Debug, Clone, PartialEq)]
pub enum FactResult {
    Idle,
    Loading,
    Success(Value),
    Error(String),
}

pub struct FactsSession {
    provider: CredentialProvider,
    client: FactsClient,
    auth: watch::Sender<AuthState>,
    fact: watch::Sender<FactResult>,
    closed: AtomicBool,
}

impl FactsSession {
    pub fn new(provider: CredentialProvider, client: FactsClient) -> Self {
        let (auth, _) = watch::channel(AuthState::Uninitialized);
        let (fact, _) = watch::channel(FactResult::Idle);
        Self {
            provider,
            client,
            auth,
            fact,
            closed: AtomicBool::new(false),
        }
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth.borrow().clone()
    }

    pub fn fact_result(&self) -> FactResult {
        self.fact.borrow().clone()
    }

    pub fn subscribe_auth(&self) -> watch::Receiver<AuthState> {
        self.auth.subscribe()
    }

    pub fn subscribe_fact(&self) -> watch::Receiver<FactResult> {
        self.fact.subscribe()
    }

    /// Fact controls stay disabled until guest credentials are in hand
    pub fn fact_controls_enabled(&self) -> bool {
        self.auth.borrow().is_ready()
    }

    /// Run one authentication cycle
    ///
    /// Valid from any state; calling it again is the only way out of
    /// `Failed`. Expired credentials are never refreshed automatically.
    pub async fn initialize(&self) -> AuthState {
        self.publish_auth(AuthState::Loading);

        let next = match self.provider.acquire().await {
            Ok(credentials) => {
                info!("Session ready for identity {}", credentials.identity_id);
                AuthState::Ready(credentials)
            }
            Err(err) => {
                warn!("Guest authentication failed: {}", err);
                AuthState::Failed(err)
            }
        };

        self.publish_auth(next.clone());
        next
    }

    /// Fetch a fact and publish the outcome
    ///
    /// Without `Ready` credentials this fails locally with
    /// "Authentication required" and performs no network call.
    pub async fn request_fact(&self, id: Option<&str>) -> FactResult {
        let credentials = self.auth.borrow().credentials().cloned();

        let Some(credentials) = credentials else {
            let result = FactResult::Error(FetchError::AuthenticationRequired.to_string());
            self.publish_fact(result.clone());
            return result;
        };

        self.publish_fact(FactResult::Loading);

        let result = match self.client.get_fact(&credentials, id).await {
            Ok(fact) => FactResult::Success(fact),
            Err(err) => {
                warn!("Fact lookup failed: {}", err);
                FactResult::Error(format!("Error loading fun fact: {}", err))
            }
        };

        self.publish_fact(result.clone());
        result
    }

    /// Dispose the session; lookups still in flight are discarded on arrival
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn publish_auth(&self, state: AuthState) {
        if self.is_closed() {
            debug!("Session closed, discarding auth transition");
            return;
        }
        self.auth.send_replace(state);
    }

    fn publish_fact(&self, result: FactResult) {
        if self.is_closed() {
            debug!("Session closed, discarding fact result");
            return;
        }
        self.fact.send_replace(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FactsConfig;
    use crate::credentials::{GetCredentialsResponse, GetIdResponse, IdentityFederation};
    use crate::transport::{HttpResponse, HttpTransport, TransportError};
    use async_trait::async_trait;
    use reqwest::header::HeaderMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct NoIdentity;

    #[async_trait]
    impl IdentityFederation for NoIdentity {
        async fn get_id(&self, _: &str) -> Result<GetIdResponse, AuthError> {
            Ok(GetIdResponse::default())
        }

        async fn get_credentials_for_identity(
            &self,
            _: &str,
        ) -> Result<GetCredentialsResponse, AuthError> {
            Ok(GetCredentialsResponse::default())
        }
    }

    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HttpTransport for CountingTransport {
        async fn get(&self, _: &str, _: HeaderMap) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(HttpResponse::new(200, "{}"))
        }
    }

    fn session(transport: Arc<CountingTransport>) -> FactsSession {
        let config = FactsConfig::default();
        FactsSession::new(
            CredentialProvider::new(Arc::new(NoIdentity), config.identity_pool_id.clone()),
            FactsClient::new(&config, transport),
        )
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = session(Arc::default());
        assert_eq!(session.auth_state(), AuthState::Uninitialized);
        assert_eq!(session.fact_result(), FactResult::Idle);
        assert!(!session.fact_controls_enabled());
    }

    #[tokio::test]
    async fn test_failed_auth_keeps_controls_disabled() {
        let session = session(Arc::default());
        let mut auth = session.subscribe_auth();

        let state = session.initialize().await;

        assert_eq!(state, AuthState::Failed(AuthError::NoIdentity));
        assert!(auth.has_changed().unwrap());
        assert_eq!(*auth.borrow_and_update(), AuthState::Failed(AuthError::NoIdentity));
        assert!(!session.fact_controls_enabled());
    }

    #[tokio::test]
    async fn test_request_without_auth_makes_no_call() {
        let transport = Arc::new(CountingTransport::default());
        let session = session(transport.clone());

        let result = session.request_fact(Some("42")).await;

        assert_eq!(result, FactResult::Error("Authentication required".to_string()));
        assert_eq!(session.fact_result(), result);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }
}
