//! Provider configuration
//!
//! Credentials and region are taken from the environment; service endpoints
//! are derived from region and cloud domain unless overridden.

use crate::client::{RestClient, ServiceClient};
use crate::error::{Result, ServiceError};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_REGION: &str = "eu-de";
const DEFAULT_CLOUD: &str = "otc.t-systems.com";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration shared by every service client
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub auth_token: String,
    pub project_id: String,
    pub region: String,
    /// Cloud domain, e.g. "otc.t-systems.com"
    pub cloud: String,
    /// Timeout of a single HTTP request
    pub request_timeout: Duration,
    endpoints: HashMap<String, String>,
}

impl ProviderConfig {
    pub fn new(auth_token: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            project_id: project_id.into(),
            region: DEFAULT_REGION.to_string(),
            cloud: DEFAULT_CLOUD.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            endpoints: HashMap::new(),
        }
    }

    /// Create ProviderConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let auth_token = std::env::var("OTC_AUTH_TOKEN")
            .map_err(|_| ServiceError::MissingEnvVar("OTC_AUTH_TOKEN".to_string()))?;
        let project_id = std::env::var("OTC_PROJECT_ID")
            .map_err(|_| ServiceError::MissingEnvVar("OTC_PROJECT_ID".to_string()))?;

        let mut config = Self::new(auth_token, project_id);
        if let Ok(region) = std::env::var("OTC_REGION") {
            config.region = region;
        }
        if let Ok(cloud) = std::env::var("OTC_CLOUD") {
            config.cloud = cloud;
        }
        Ok(config)
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Override the endpoint of one service (e.g. for a local test server)
    pub fn with_endpoint(mut self, service: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.insert(service.into(), url.into());
        self
    }

    /// Base URL of a service, without trailing slash
    pub fn endpoint(&self, service: &str) -> String {
        match self.endpoints.get(service) {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.{}.{}", service, self.region, self.cloud),
        }
    }

    /// Client for one service, authenticated with the configured token
    pub fn service_client(&self, service: &str) -> Result<ServiceClient> {
        if self.auth_token.is_empty() {
            return Err(ServiceError::InvalidConfig("auth token is empty".to_string()));
        }
        let rest = RestClient::new(&self.auth_token, self.request_timeout)?;
        Ok(ServiceClient::new(rest, self.endpoint(service), &self.project_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_derivation() {
        let config = ProviderConfig::new("token", "p-1").with_region("eu-nl");
        assert_eq!(
            config.endpoint("sfs-turbo"),
            "https://sfs-turbo.eu-nl.otc.t-systems.com"
        );
    }

    #[test]
    fn test_endpoint_override() {
        let config =
            ProviderConfig::new("token", "p-1").with_endpoint("rds", "http://127.0.0.1:8080/");
        assert_eq!(config.endpoint("rds"), "http://127.0.0.1:8080");
        assert_eq!(config.endpoint("dcs"), "https://dcs.eu-de.otc.t-systems.com");
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("OTC_AUTH_TOKEN", Some("secret")),
                ("OTC_PROJECT_ID", Some("project-1")),
                ("OTC_REGION", Some("eu-ch2")),
                ("OTC_CLOUD", None),
            ],
            || {
                let config = tokio_test::assert_ok!(ProviderConfig::from_env());
                assert_eq!(config.auth_token, "secret");
                assert_eq!(config.project_id, "project-1");
                assert_eq!(config.region, "eu-ch2");
                assert_eq!(config.cloud, DEFAULT_CLOUD);
            },
        );
    }

    #[test]
    fn test_from_env_missing_token() {
        temp_env::with_vars(
            [
                ("OTC_AUTH_TOKEN", None::<&str>),
                ("OTC_PROJECT_ID", Some("project-1")),
            ],
            || {
                let err = tokio_test::assert_err!(ProviderConfig::from_env());
                assert!(matches!(err, ServiceError::MissingEnvVar(ref v) if v == "OTC_AUTH_TOKEN"));
            },
        );
    }

    #[test]
    fn test_service_client_requires_token() {
        let config = ProviderConfig::new("", "p-1");
        assert!(config.service_client("dcs").is_err());
    }
}
