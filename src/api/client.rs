//! Compute client
//!
//! Main client for the compute API, combining configuration, URL
//! building, and HTTP functionality. Handles and trackers clone this
//! freely; the underlying reqwest client is shared.

use super::http::HttpClient;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::operation::OperationTracker;
use serde_json::Value;

/// Main compute API client
#[derive(Clone)]
pub struct ComputeClient {
    pub config: ClientConfig,
    http: HttpClient,
}

impl ComputeClient {
    /// Create a new client from a configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = HttpClient::new(&config.user_agent)?;
        Ok(Self { config, http })
    }

    /// Operation tracker bound to this client
    pub fn operations(&self) -> OperationTracker {
        OperationTracker::new(self.clone())
    }

    /// Switch to a different zone
    pub fn switch_zone(&mut self, zone: &str) {
        self.config.zone = zone.to_string();
    }

    /// Switch to a different project
    pub fn switch_project(&mut self, project: &str) {
        self.config.project = project.to_string();
    }

    // =========================================================================
    // URL builders
    // =========================================================================

    /// Build a project-scoped API URL
    pub fn project_url(&self, path: &str) -> String {
        format!(
            "{}/projects/{}/{}",
            self.config.endpoint.as_str().trim_end_matches('/'),
            self.config.project,
            path
        )
    }

    /// Build a zonal API URL
    pub fn zonal_url(&self, resource: &str) -> String {
        self.project_url(&format!("zones/{}/{}", self.config.zone, resource))
    }

    /// Build a global API URL
    pub fn global_url(&self, resource: &str) -> String {
        self.project_url(&format!("global/{}", resource))
    }

    /// URL of one instance
    pub fn instance_url(&self, name: &str) -> String {
        self.zonal_url(&format!("instances/{}", name))
    }

    /// URL of an instance action (start, stop, reset, setMetadata, ...)
    pub fn instance_action_url(&self, name: &str, action: &str) -> String {
        self.zonal_url(&format!("instances/{}/{}", name, action))
    }

    /// URL of one disk
    pub fn disk_url(&self, name: &str) -> String {
        self.zonal_url(&format!("disks/{}", name))
    }

    /// URL of one zonal operation
    pub fn operation_url(&self, name: &str) -> String {
        self.zonal_url(&format!("operations/{}", name))
    }

    /// URL of an instance's serial port output
    pub fn serial_port_url(&self, name: &str, port: u8) -> String {
        format!(
            "{}?port={}",
            self.instance_action_url(name, "serialPort"),
            port
        )
    }

    // =========================================================================
    // Request helpers
    // =========================================================================

    /// Make a GET request
    pub async fn get(&self, url: &str) -> Result<Value> {
        self.http.get(url, self.config.auth_token.as_deref()).await
    }

    /// Make a mutating POST request. A generated `requestId` is attached
    /// so provider-side retries of the same submission deduplicate.
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        let url = with_request_id(url);
        self.http
            .post(&url, self.config.auth_token.as_deref(), body)
            .await
    }

    /// Make a DELETE request, also carrying a `requestId`.
    pub async fn delete(&self, url: &str) -> Result<Value> {
        let url = with_request_id(url);
        self.http
            .delete(&url, self.config.auth_token.as_deref())
            .await
    }
}

/// Append a fresh `requestId` query parameter to a mutating request URL.
fn with_request_id(url: &str) -> String {
    let id = uuid::Uuid::new_v4();
    if url.contains('?') {
        format!("{url}&requestId={id}")
    } else {
        format!("{url}?requestId={id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> ComputeClient {
        let config = ClientConfig::new("test-project", "us-central1-a")
            .with_endpoint("http://localhost:9000/compute/v1")
            .unwrap();
        ComputeClient::new(config).unwrap()
    }

    #[test]
    fn zonal_urls_carry_project_and_zone() {
        let client = test_client();
        assert_eq!(
            client.instance_url("vm-1"),
            "http://localhost:9000/compute/v1/projects/test-project/zones/us-central1-a/instances/vm-1"
        );
        assert_eq!(
            client.instance_action_url("vm-1", "start"),
            "http://localhost:9000/compute/v1/projects/test-project/zones/us-central1-a/instances/vm-1/start"
        );
    }

    #[test]
    fn serial_port_url_has_port_param() {
        let client = test_client();
        let url = client.serial_port_url("vm-1", 4);
        assert!(url.ends_with("/instances/vm-1/serialPort?port=4"));
    }

    #[test]
    fn switch_zone_rebases_urls() {
        let mut client = test_client();
        client.switch_zone("europe-west1-b");
        assert!(client.disk_url("data-disk").contains("/zones/europe-west1-b/"));
    }

    #[test]
    fn request_id_appends_to_existing_query() {
        let url = with_request_id("http://x/serialPort?port=4");
        assert!(url.contains("port=4&requestId="));

        let url = with_request_id("http://x/start");
        assert!(url.contains("/start?requestId="));
    }
}
