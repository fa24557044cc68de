//! AWS Signature Version 4 Request Signer
//!
//! Turns a request description plus guest credentials into the extra
//! headers the facts API accepts as proof of authorization:
//! `authorization`, `x-amz-date`, `x-amz-security-token` and
//! `x-amz-content-sha256`. Nothing else about the request is changed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::config::FactsConfig;
use crate::credentials::GuestCredentials;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const JSON_CONTENT_TYPE: &str = "application/json";

pub const AUTHORIZATION: &str = "authorization";
pub const X_AMZ_DATE: &str = "x-amz-date";
pub const X_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";
pub const X_AMZ_CONTENT_SHA256: &str = "x-amz-content-sha256";

/// Errors raised when a request cannot be signed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignError {
    #[error("Missing required signing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid request path: {0}")]
    InvalidPath(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),
}

/// A request to be signed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    pub method: String,
    pub host: String,
    /// Wire path, already percent-encoded, beginning with `/`
    pub path: String,
    pub headers: BTreeMap<String, String>,
}

impl SigningRequest {
    /// A GET carrying the fixed JSON content type
    pub fn get(host: impl Into<String>, path: impl Into<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), JSON_CONTENT_TYPE.to_string());
        Self {
            method: "GET".to_string(),
            host: host.into(),
            path: path.into(),
            headers,
        }
    }
}

/// The original request plus signing headers (names lowercased)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub method: String,
    pub host: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
}

impl SignedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn authorization(&self) -> Option<&str> {
        self.header(AUTHORIZATION)
    }

    /// Headers in the form the HTTP client sends them
    pub fn header_map(&self) -> Result<HeaderMap, SignError> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| SignError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| SignError::InvalidHeader(name.as_str().to_string()))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

/// SigV4 signer bound to one region and service
#[derive(Debug, Clone)]
pub struct RequestSigner {
    region: String,
    service: String,
}

impl RequestSigner {
    pub fn new(region: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            service: service.into(),
        }
    }

    pub fn from_config(config: &FactsConfig) -> Self {
        Self::new(config.region.clone(), config.service.clone())
    }

    /// Sign against the system clock
    pub fn sign(
        &self,
        credentials: &GuestCredentials,
        request: &SigningRequest,
    ) -> Result<SignedRequest, SignError> {
        self.sign_at(credentials, request, Utc::now())
    }

    /// Sign at a fixed instant; identical inputs give identical output
    pub fn sign_at(
        &self,
        credentials: &GuestCredentials,
        request: &SigningRequest,
        now: DateTime<Utc>,
    ) -> Result<SignedRequest, SignError> {
        validate(credentials, request)?;

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let payload_hash = hex_sha256(b"");

        let mut headers: BTreeMap<String, String> = request
            .headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
            .collect();
        headers.insert("host".to_string(), request.host.trim().to_string());
        headers.insert(X_AMZ_DATE.to_string(), amz_date.clone());
        headers.insert(
            X_AMZ_SECURITY_TOKEN.to_string(),
            credentials.session_token.clone(),
        );
        headers.insert(X_AMZ_CONTENT_SHA256.to_string(), payload_hash.clone());

        let method = request.method.to_ascii_uppercase();
        let (canonical, signed_headers) =
            canonical_request(&method, &canonical_uri(&request.path), &headers, &payload_hash);

        let scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let to_sign = string_to_sign(&amz_date, &scope, &canonical);
        let key = signing_key(
            &credentials.secret_access_key,
            &date_stamp,
            &self.region,
            &self.service,
        )?;
        let signature = hex::encode(hmac_sha256(&key, to_sign.as_bytes())?);

        debug!("Signed {} {} (scope {})", method, request.path, scope);

        headers.insert(
            AUTHORIZATION.to_string(),
            format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                ALGORITHM, credentials.access_key_id, scope, signed_headers, signature
            ),
        );

        Ok(SignedRequest {
            method: request.method.clone(),
            host: request.host.clone(),
            path: request.path.clone(),
            headers,
        })
    }
}

fn validate(credentials: &GuestCredentials, request: &SigningRequest) -> Result<(), SignError> {
    if credentials.access_key_id.is_empty() {
        return Err(SignError::MissingField("access key id"));
    }
    if credentials.secret_access_key.is_empty() {
        return Err(SignError::MissingField("secret access key"));
    }
    if credentials.session_token.is_empty() {
        return Err(SignError::MissingField("session token"));
    }
    if request.host.trim().is_empty() {
        return Err(SignError::MissingField("host"));
    }
    if !request.path.starts_with('/') || request.path.contains(['?', '#']) {
        return Err(SignError::InvalidPath(request.path.clone()));
    }
    Ok(())
}

/// Escape every path segment once more; `/` separators are kept
fn canonical_uri(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Returns the canonical request and its signed-headers list
fn canonical_request(
    method: &str,
    canonical_uri: &str,
    headers: &BTreeMap<String, String>,
    payload_hash: &str,
) -> (String, String) {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, normalize_value(value)))
        .collect();
    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

    // No query string: the canonical query line is empty.
    let canonical = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        method, canonical_uri, canonical_headers, signed_headers, payload_hash
    );
    (canonical, signed_headers)
}

fn normalize_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn string_to_sign(amz_date: &str, scope: &str, canonical_request: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex_sha256(canonical_request.as_bytes())
    )
}

fn signing_key(
    secret: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, SignError> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SignError> {
    let mut mac = <HmacSha256 as KeyInit>::new_from_slice(key)
        .map_err(|e| SignError::InvalidKey(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const EXAMPLE_SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    fn creds() -> GuestCredentials {
        GuestCredentials {
            identity_id: "us-east-1:guest".to_string(),
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: EXAMPLE_SECRET.to_string(),
            session_token: "session-token".to_string(),
            expiration: None,
        }
    }

    fn fixed_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap()
    }

    #[test]
    fn test_signing_key_matches_published_derivation() {
        let key = signing_key(EXAMPLE_SECRET, "20120215", "us-east-1", "iam").unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_get_vanilla_signature() {
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), "example.amazonaws.com".to_string());
        headers.insert(X_AMZ_DATE.to_string(), "20150830T123600Z".to_string());

        let (canonical, signed) = canonical_request("GET", "/", &headers, &hex_sha256(b""));
        assert_eq!(signed, "host;x-amz-date");

        let to_sign = string_to_sign(
            "20150830T123600Z",
            "20150830/us-east-1/service/aws4_request",
            &canonical,
        );
        let key = signing_key(EXAMPLE_SECRET, "20150830", "us-east-1", "service").unwrap();
        assert_eq!(
            hex::encode(hmac_sha256(&key, to_sign.as_bytes()).unwrap()),
            "5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
    }

    #[test]
    fn test_sign_is_deterministic_with_fixed_clock() {
        let signer = RequestSigner::new("us-east-1", "execute-api");
        let request = SigningRequest::get("api.dougsellers.dev", "/facts");

        let first = signer.sign_at(&creds(), &request, fixed_clock()).unwrap();
        let second = signer.sign_at(&creds(), &request, fixed_clock()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.header(X_AMZ_DATE), Some("20150830T123600Z"));
        assert_eq!(first.header(X_AMZ_SECURITY_TOKEN), Some("session-token"));
        assert_eq!(
            first.header(X_AMZ_CONTENT_SHA256),
            Some("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
        assert_eq!(first.header("content-type"), Some("application/json"));
        assert_eq!(first.path, "/facts");
    }

    #[test]
    fn test_path_changes_only_the_signature() {
        let signer = RequestSigner::new("us-east-1", "execute-api");
        let random = signer
            .sign_at(&creds(), &SigningRequest::get("api.dougsellers.dev", "/facts"), fixed_clock())
            .unwrap();
        let specific = signer
            .sign_at(&creds(), &SigningRequest::get("api.dougsellers.dev", "/facts/42"), fixed_clock())
            .unwrap();

        assert_ne!(random.authorization(), specific.authorization());
        for name in [X_AMZ_DATE, X_AMZ_SECURITY_TOKEN, X_AMZ_CONTENT_SHA256, "host"] {
            assert_eq!(random.header(name), specific.header(name));
        }

        let prefix = |auth: Option<&str>| auth.unwrap().split(", Signature=").next().unwrap().to_string();
        assert_eq!(prefix(random.authorization()), prefix(specific.authorization()));
        assert!(prefix(random.authorization()).starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/execute-api/aws4_request, SignedHeaders=content-type;host;x-amz-content-sha256;x-amz-date;x-amz-security-token"
        ));
    }

    #[test]
    fn test_request_fields_are_returned_as_given() {
        let signer = RequestSigner::new("us-east-1", "execute-api");
        let mut request = SigningRequest::get(" api.dougsellers.dev ", "/facts");
        request.method = "get".to_string();

        let signed = signer.sign_at(&creds(), &request, fixed_clock()).unwrap();
        assert_eq!(signed.method, "get");
        assert_eq!(signed.host, " api.dougsellers.dev ");
        assert_eq!(signed.path, "/facts");
        assert_eq!(signed.header("host"), Some("api.dougsellers.dev"));

        // Method case does not change what is signed.
        let upper = signer
            .sign_at(&creds(), &SigningRequest::get("api.dougsellers.dev", "/facts"), fixed_clock())
            .unwrap();
        assert_eq!(signed.authorization(), upper.authorization());
    }

    #[test]
    fn test_hmac_accepts_empty_key() {
        assert_eq!(
            hex::encode(hmac_sha256(b"", b"").unwrap()),
            "b613679a0814d9ec772f95d778c35fc5ff1697c493715653c6c712144292c5ad"
        );
    }

    #[test]
    fn test_canonical_uri_escapes_encoded_segments_again() {
        assert_eq!(canonical_uri("/facts"), "/facts");
        assert_eq!(canonical_uri("/facts/a%20b"), "/facts/a%2520b");
        assert_eq!(canonical_uri("/"), "/");
    }

    #[test]
    fn test_header_values_are_whitespace_normalized() {
        assert_eq!(normalize_value("  a   b \t c "), "a b c");
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        let signer = RequestSigner::new("us-east-1", "execute-api");
        let request = SigningRequest::get("api.dougsellers.dev", "/facts");

        let mut no_secret = creds();
        no_secret.secret_access_key.clear();
        assert_eq!(
            signer.sign_at(&no_secret, &request, fixed_clock()),
            Err(SignError::MissingField("secret access key"))
        );

        let mut no_token = creds();
        no_token.session_token.clear();
        assert_eq!(
            signer.sign_at(&no_token, &request, fixed_clock()),
            Err(SignError::MissingField("session token"))
        );

        let no_host = SigningRequest::get("", "/facts");
        assert_eq!(
            signer.sign_at(&creds(), &no_host, fixed_clock()),
            Err(SignError::MissingField("host"))
        );
    }

    #[test]
    fn test_relative_path_is_rejected() {
        let signer = RequestSigner::new("us-east-1", "execute-api");
        let request = SigningRequest::get("api.dougsellers.dev", "facts");
        assert!(matches!(
            signer.sign_at(&creds(), &request, fixed_clock()),
            Err(SignError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_header_map_carries_all_headers() {
        let signer = RequestSigner::new("us-east-1", "execute-api");
        let signed = signer
            .sign_at(&creds(), &SigningRequest::get("api.dougsellers.dev", "/facts"), fixed_clock())
            .unwrap();

        let map = signed.header_map().unwrap();
        assert_eq!(map.len(), 6);
        assert!(map.contains_key("authorization"));
        assert_eq!(map.get("host").unwrap(), "api.dougsellers.dev");
    }
}
