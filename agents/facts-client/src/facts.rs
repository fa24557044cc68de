//! Facts API Client
//!
//! One signed GET per call against `/facts` (random record) or
//! `/facts/{id}` (specific record). No retries, no caching: every call is
//! a fresh round trip.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::FactsConfig;
use crate::credentials::GuestCredentials;
use crate::signer::{RequestSigner, SignError, SigningRequest};
use crate::transport::{HttpTransport, ReqwestTransport, TransportError};

const FACTS_PATH: &str = "/facts";

/// Characters `urlencoding` escapes that a URI component leaves literal
const COMPONENT_LITERALS: [(&str, &str); 5] =
    [("%21", "!"), ("%27", "'"), ("%28", "("), ("%29", ")"), ("%2A", "*")];

/// Errors raised by a fact lookup
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP error! status: {status}, message: {body}")]
    Http { status: u16, body: String },

    #[error("Invalid JSON in response: {0}")]
    Parse(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Failed to sign request: {0}")]
    Signing(#[from] SignError),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Invalid fact id: {0}")]
    InvalidId(String),
}

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(message) => FetchError::NetworkFailure(message),
        }
    }
}

/// Which record to ask for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactQuery {
    id: Option<String>,
}

impl FactQuery {
    pub fn random() -> Self {
        Self::default()
    }

    /// A specific record; blank ids fall back to a random one
    pub fn by_id(id: &str) -> Self {
        let trimmed = id.trim();
        Self {
            id: (!trimmed.is_empty()).then(|| trimmed.to_string()),
        }
    }

    pub fn from_option(id: Option<&str>) -> Self {
        id.map(Self::by_id).unwrap_or_default()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Wire path with the id percent-encoded as one segment
    pub fn path(&self) -> String {
        match &self.id {
            Some(id) => format!("{}/{}", FACTS_PATH, encode_component(id)),
            None => FACTS_PATH.to_string(),
        }
    }

    /// `.` and `..` (even percent-encoded) are resolved away by URL parsing,
    /// so the path sent would differ from the one signed
    fn is_dot_segment(&self) -> bool {
        matches!(self.id.as_deref(), Some(".") | Some(".."))
    }
}

/// Percent-encode one path segment, leaving `!'()*` literal
fn encode_component(value: &str) -> String {
    // Every escape in the output is a full `%XX` triplet, so these
    // replacements cannot match across an escaped `%`.
    COMPONENT_LITERALS
        .iter()
        .fold(urlencoding::encode(value).into_owned(), |encoded, &(escaped, literal)| {
            encoded.replace(escaped, literal)
        })
}

/// Signs and issues fact lookups
#[derive(Clone)]
pub struct FactsClient {
    transport: Arc<dyn HttpTransport>,
    signer: RequestSigner,
    host: String,
    base_url: String,
}

impl FactsClient {
    pub fn new(config: &FactsConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            signer: RequestSigner::from_config(config),
            host: config.facts_host.clone(),
            base_url: config.facts_base_url(),
        }
    }

    /// Client over the default reqwest transport
    pub fn from_config(config: &FactsConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    /// Fetch a random fact, or the fact with `id` when given
    pub async fn get_fact(
        &self,
        credentials: &GuestCredentials,
        id: Option<&str>,
    ) -> Result<Value, FetchError> {
        self.fetch(credentials, &FactQuery::from_option(id)).await
    }

    pub async fn fetch(
        &self,
        credentials: &GuestCredentials,
        query: &FactQuery,
    ) -> Result<Value, FetchError> {
        if query.is_dot_segment() {
            return Err(FetchError::InvalidId(query.id().unwrap_or_default().to_string()));
        }

        let path = query.path();
        let signed = self
            .signer
            .sign(credentials, &SigningRequest::get(self.host.clone(), path.clone()))?;
        let headers = signed.header_map()?;
        let url = format!("{}{}", self.base_url, path);

        debug!("GET {}", url);

        let response = self.transport.get(&url, headers).await.map_err(|e| {
            warn!("Facts request failed: {}", e);
            FetchError::from(e)
        })?;

        if !response.is_success() {
            warn!("Facts API returned {}", response.status);
            return Err(FetchError::Http {
                status: response.status,
                body: response.body,
            });
        }

        let fact: Value =
            serde_json::from_str(&response.body).map_err(|e| FetchError::Parse(e.to_string()))?;

        info!("Fact received ({} bytes)", response.body.len());

        Ok(fact)
    }
}
