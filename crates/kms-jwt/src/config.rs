//! Key service client configuration.

use aws_config::{BehaviorVersion, Region};
use aws_sdk_kms::Client as KmsClient;
use aws_sdk_kms::config::Credentials;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Access key used together with an endpoint override (LocalStack and similar).
pub const ENDPOINT_OVERRIDE_ACCESS_KEY: &str = "test";

/// Configuration for the AWS KMS client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KmsConfig {
    /// AWS region the keys live in (e.g., "eu-west-2").
    pub region: String,

    /// Endpoint override, e.g. "http://localhost:4566".
    ///
    /// When set, static test credentials are used instead of the default
    /// credential chain.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl KmsConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            endpoint: None,
        }
    }

    /// Set the endpoint override. Blank values are ignored.
    pub fn with_endpoint(mut self, endpoint: Option<impl Into<String>>) -> Self {
        self.endpoint = endpoint.map(Into::into).filter(|e: &String| !e.trim().is_empty());
        self
    }

    /// Build a KMS client for this configuration.
    pub async fn client(&self) -> KmsClient {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(self.region.clone()));

        if let Some(endpoint) = &self.endpoint {
            info!(endpoint = %endpoint, "Using custom KMS endpoint");
            loader = loader.endpoint_url(endpoint).credentials_provider(Credentials::new(
                ENDPOINT_OVERRIDE_ACCESS_KEY,
                ENDPOINT_OVERRIDE_ACCESS_KEY,
                None,
                None,
                "kms-jwt-endpoint-override",
            ));
        }

        let sdk_config = loader.load().await;
        KmsClient::new(&sdk_config)
    }
}
