//! Guest Credential Provider
//!
//! Exchanges an identity pool id for a transient guest identity, then
//! exchanges that identity for short-lived AWS keys. Nothing is cached or
//! persisted: every `acquire()` performs both round trips.
//!
//! The federation service is behind the [`IdentityFederation`] trait so the
//! provider can run against Cognito Identity or a scripted stub.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::FactsConfig;

const AMZ_JSON: &str = "application/x-amz-json-1.1";
const TARGET_PREFIX: &str = "AWSCognitoIdentityService";

/// Errors raised while acquiring guest credentials
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Failed to get identity ID")]
    NoIdentity,

    #[error("Failed to get credentials")]
    NoCredentials,

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Identity service failed with {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Invalid identity service response: {0}")]
    InvalidResponse(String),
}

/// Temporary credentials for one guest identity
///
/// Held in memory only. Expiry is informational: a stale set is only
/// discovered when the facts API rejects a signed call.
#[derive(Clone, PartialEq, Eq)]
pub struct GuestCredentials {
    pub identity_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<DateTime<Utc>>,
}

impl fmt::Debug for GuestCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestCredentials")
            .field("identity_id", &self.identity_id)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// `GetId` response body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetIdResponse {
    #[serde(rename = "IdentityId")]
    pub identity_id: Option<String>,
}

/// Key material inside a `GetCredentialsForIdentity` response
#[derive(Clone, Default, Deserialize)]
pub struct FederatedCredentials {
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: Option<String>,
    #[serde(rename = "SecretKey")]
    pub secret_key: Option<String>,
    #[serde(rename = "SessionToken")]
    pub session_token: Option<String>,
    /// Epoch seconds
    #[serde(rename = "Expiration")]
    pub expiration: Option<f64>,
}

/// `GetCredentialsForIdentity` response body
#[derive(Clone, Default, Deserialize)]
pub struct GetCredentialsResponse {
    #[serde(rename = "IdentityId")]
    pub identity_id: Option<String>,
    #[serde(rename = "Credentials")]
    pub credentials: Option<FederatedCredentials>,
}

/// The two operations of the identity federation service
#[async_trait]
pub trait IdentityFederation: Send + Sync {
    /// Request a new guest identity handle for a pool
    async fn get_id(&self, identity_pool_id: &str) -> Result<GetIdResponse, AuthError>;

    /// Request temporary credentials for an identity handle
    async fn get_credentials_for_identity(
        &self,
        identity_id: &str,
    ) -> Result<GetCredentialsResponse, AuthError>;
}

#[derive(Serialize)]
struct GetIdRequest<'a> {
    #[serde(rename = "IdentityPoolId")]
    identity_pool_id: &'a str,
}

#[derive(Serialize)]
struct GetCredentialsRequest<'a> {
    #[serde(rename = "IdentityId")]
    identity_id: &'a str,
}

/// Cognito Identity over its JSON 1.1 wire protocol
///
/// Both operations are unsigned: guest identities need no prior credentials.
pub struct CognitoFederation {
    http_client: Client,
    endpoint: String,
}

impl CognitoFederation {
    /// Create a client for the federation endpoint derived from `config`
    pub fn new(config: &FactsConfig) -> Result<Self, AuthError> {
        let http_client = Client::builder()
            .user_agent(concat!("facts-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::NetworkFailure(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: config.federation_endpoint(),
        })
    }

    async fn call<B, R>(&self, operation: &str, body: &B) -> Result<R, AuthError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let payload =
            serde_json::to_vec(body).map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        debug!("Calling {}.{} at {}", TARGET_PREFIX, operation, self.endpoint);

        let response = self
            .http_client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, AMZ_JSON)
            .header("X-Amz-Target", format!("{}.{}", TARGET_PREFIX, operation))
            .body(payload)
            .send()
            .await
            .map_err(|e| AuthError::NetworkFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| AuthError::NetworkFailure(e.to_string()))?;

        serde_json::from_str(&text)
            .map_err(|e| AuthError::InvalidResponse(format!("{}: {}", operation, e)))
    }
}

#[async_trait]
impl IdentityFederation for CognitoFederation {
    async fn get_id(&self, identity_pool_id: &str) -> Result<GetIdResponse, AuthError> {
        self.call("GetId", &GetIdRequest { identity_pool_id }).await
    }

    async fn get_credentials_for_identity(
        &self,
        identity_id: &str,
    ) -> Result<GetCredentialsResponse, AuthError> {
        self.call(
            "GetCredentialsForIdentity",
            &GetCredentialsRequest { identity_id },
        )
        .await
    }
}

/// Produces [`GuestCredentials`] from a fixed identity pool
#[derive(Clone)]
pub struct CredentialProvider {
    federation: Arc<dyn IdentityFederation>,
    identity_pool_id: String,
}

impl CredentialProvider {
    pub fn new(federation: Arc<dyn IdentityFederation>, identity_pool_id: impl Into<String>) -> Self {
        Self {
            federation,
            identity_pool_id: identity_pool_id.into(),
        }
    }

    /// Provider backed by Cognito Identity, configured from `config`
    pub fn cognito(config: &FactsConfig) -> Result<Self, AuthError> {
        let federation = CognitoFederation::new(config)?;
        Ok(Self::new(Arc::new(federation), config.identity_pool_id.clone()))
    }

    /// Run one authentication cycle: identity, then credentials
    ///
    /// A failure at either step aborts the cycle. There is no retry and no
    /// deduplication of concurrent calls.
    pub async fn acquire(&self) -> Result<GuestCredentials, AuthError> {
        info!("Requesting guest identity from pool {}", self.identity_pool_id);

        let identity_id = self
            .federation
            .get_id(&self.identity_pool_id)
            .await?
            .identity_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                warn!("Federation service returned no identity id");
                AuthError::NoIdentity
            })?;

        debug!("Requesting credentials for identity {}", identity_id);

        let response = self
            .federation
            .get_credentials_for_identity(&identity_id)
            .await?;

        let creds = response.credentials.ok_or(AuthError::NoCredentials)?;
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());

        let session_token = non_empty(creds.session_token).ok_or(AuthError::NoCredentials)?;
        let access_key_id = non_empty(creds.access_key_id).ok_or(AuthError::NoCredentials)?;
        let secret_access_key = non_empty(creds.secret_key).ok_or(AuthError::NoCredentials)?;

        let expiration = creds
            .expiration
            .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single());

        info!(
            "Guest credentials obtained for identity {} (session token: {} bytes)",
            identity_id,
            session_token.len()
        );

        Ok(GuestCredentials {
            identity_id,
            access_key_id,
            secret_access_key,
            session_token,
            expiration,
        })
    }
}
