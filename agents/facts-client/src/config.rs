//! Client Configuration
//!
//! Region, identity pool and facts host for the guest-credentialed client.
//! Everything has a default matching the deployed site and can be
//! overridden from the environment.

use std::env;
use thiserror::Error;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_IDENTITY_POOL_ID: &str = "us-east-1:2e47788f-4c4a-4133-b6eb-792d7acc5dd4";
pub const DEFAULT_FACTS_HOST: &str = "api.dougsellers.dev";
pub const DEFAULT_SIGNING_SERVICE: &str = "execute-api";

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// Settings shared by the credential provider, signer and facts client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactsConfig {
    /// AWS region of both the identity pool and the facts API
    pub region: String,
    /// Identity pool that vends guest identities
    pub identity_pool_id: String,
    /// Host of the facts API (signed as the `host` header)
    pub facts_host: String,
    /// Service name used in the SigV4 credential scope
    pub service: String,
    /// Override for the federation endpoint (tests, local stubs)
    pub federation_endpoint: Option<String>,
    /// Override for the facts base URL (tests, local stubs)
    pub facts_base_url: Option<String>,
}

impl Default for FactsConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            identity_pool_id: DEFAULT_IDENTITY_POOL_ID.to_string(),
            facts_host: DEFAULT_FACTS_HOST.to_string(),
            service: DEFAULT_SIGNING_SERVICE.to_string(),
            federation_endpoint: None,
            facts_base_url: None,
        }
    }
}

impl FactsConfig {
    /// Build configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            region: env::var("AWS_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string()),
            identity_pool_id: env::var("FACTS_IDENTITY_POOL_ID")
                .unwrap_or_else(|_| DEFAULT_IDENTITY_POOL_ID.to_string()),
            facts_host: env::var("FACTS_API_HOST")
                .unwrap_or_else(|_| DEFAULT_FACTS_HOST.to_string()),
            service: env::var("FACTS_SIGNING_SERVICE")
                .unwrap_or_else(|_| DEFAULT_SIGNING_SERVICE.to_string()),
            federation_endpoint: env::var("FACTS_FEDERATION_ENDPOINT").ok(),
            facts_base_url: env::var("FACTS_BASE_URL").ok(),
        }
    }

    /// Reject configurations that could never produce a signed request
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::Missing("region"));
        }
        if self.identity_pool_id.trim().is_empty() {
            return Err(ConfigError::Missing("identity pool id"));
        }
        if self.facts_host.trim().is_empty() {
            return Err(ConfigError::Missing("facts host"));
        }
        if self.service.trim().is_empty() {
            return Err(ConfigError::Missing("signing service"));
        }
        Ok(())
    }

    /// Endpoint for the identity federation service
    pub fn federation_endpoint(&self) -> String {
        self.federation_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://cognito-identity.{}.amazonaws.com/", self.region))
    }

    /// Base URL (scheme and authority, no trailing slash) of the facts API
    pub fn facts_base_url(&self) -> String {
        match &self.facts_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}", self.facts_host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployed_site() {
        let config = FactsConfig::default();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.facts_host, "api.dougsellers.dev");
        assert_eq!(config.service, "execute-api");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_derived_endpoints() {
        let config = FactsConfig {
            region: "eu-west-2".to_string(),
            ..FactsConfig::default()
        };
        assert_eq!(
            config.federation_endpoint(),
            "https://cognito-identity.eu-west-2.amazonaws.com/"
        );
        assert_eq!(config.facts_base_url(), "https://api.dougsellers.dev");
    }

    #[test]
    fn test_base_url_override_drops_trailing_slash() {
        let config = FactsConfig {
            facts_base_url: Some("http://127.0.0.1:8080/".to_string()),
            ..FactsConfig::default()
        };
        assert_eq!(config.facts_base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_from_env_reads_host_override() {
        env::set_var("FACTS_API_HOST", "facts.example.test");
        let config = FactsConfig::from_env();
        env::remove_var("FACTS_API_HOST");

        assert_eq!(config.facts_host, "facts.example.test");
        assert_eq!(config.facts_base_url(), "https://facts.example.test");
    }

    #[test]
    fn test_validate_rejects_blank_host() {
        let config = FactsConfig {
            facts_host: "  ".to_string(),
            ..FactsConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Missing("facts host")));
    }
}
