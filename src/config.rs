//! Client configuration
//!
//! Connection settings for a [`ComputeClient`](crate::ComputeClient):
//! endpoint, project, zone, and an optional bearer token. The endpoint is
//! configurable so tests can point the client at a mock server.

use crate::error::{Error, Result};
use url::Url;

/// Default compute API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://compute.googleapis.com/compute/v1";

/// Default zone when neither the caller nor the environment names one.
pub const DEFAULT_ZONE: &str = "us-central1-a";

const DEFAULT_USER_AGENT: &str = concat!("nimbus/", env!("CARGO_PKG_VERSION"));

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API endpoint root, without a trailing slash.
    pub endpoint: Url,
    /// Project owning the resources.
    pub project: String,
    /// Zone the client operates in.
    pub zone: String,
    /// Bearer token attached to every request, when present.
    pub auth_token: Option<String>,
    /// User agent reported to the provider.
    pub user_agent: String,
}

impl ClientConfig {
    /// Create a configuration for a project and zone, using the default
    /// endpoint.
    pub fn new(project: &str, zone: &str) -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL"),
            project: project.to_string(),
            zone: zone.to_string(),
            auth_token: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Build a configuration from the environment (NIMBUS_PROJECT,
    /// NIMBUS_ZONE, NIMBUS_TOKEN, NIMBUS_ENDPOINT). The project is the
    /// only required variable; the zone falls back to [`DEFAULT_ZONE`].
    pub fn from_env() -> Result<Self> {
        let project = std::env::var("NIMBUS_PROJECT").map_err(|_| Error::Configuration {
            message: "NIMBUS_PROJECT is not set".to_string(),
        })?;
        let zone = std::env::var("NIMBUS_ZONE").unwrap_or_else(|_| DEFAULT_ZONE.to_string());

        let mut config = Self::new(&project, &zone);
        if let Ok(token) = std::env::var("NIMBUS_TOKEN") {
            config.auth_token = Some(token);
        }
        if let Ok(endpoint) = std::env::var("NIMBUS_ENDPOINT") {
            config = config.with_endpoint(&endpoint)?;
        }
        Ok(config)
    }

    /// Override the API endpoint. Trailing slashes are trimmed so URL
    /// building stays uniform.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self> {
        let trimmed = endpoint.trim_end_matches('/');
        self.endpoint = Url::parse(trimmed).map_err(|e| Error::Configuration {
            message: format!("invalid endpoint {endpoint:?}: {e}"),
        })?;
        Ok(self)
    }

    /// Attach a bearer token.
    pub fn with_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_string());
        self
    }

    /// Override the user agent.
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    /// Get the region for the current zone (`us-central1-a` -> `us-central1`).
    pub fn region(&self) -> String {
        let parts: Vec<&str> = self.zone.rsplitn(2, '-').collect();
        if parts.len() == 2 {
            parts[1].to_string()
        } else {
            self.zone.clone()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("", DEFAULT_ZONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_strips_zone_suffix() {
        let config = ClientConfig::new("my-project", "europe-west1-b");
        assert_eq!(config.region(), "europe-west1");
    }

    #[test]
    fn region_of_unqualified_zone_is_itself() {
        let config = ClientConfig::new("my-project", "local");
        assert_eq!(config.region(), "local");
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let config = ClientConfig::new("p", "us-central1-a")
            .with_endpoint("http://localhost:9000/compute/v1/")
            .unwrap();
        assert_eq!(config.endpoint.as_str(), "http://localhost:9000/compute/v1");
    }

    #[test]
    fn invalid_endpoint_is_a_configuration_error() {
        let result = ClientConfig::new("p", "us-central1-a").with_endpoint("not a url");
        assert!(matches!(
            result,
            Err(Error::Configuration { .. })
        ));
    }
}
