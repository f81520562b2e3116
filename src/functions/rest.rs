use async_trait::async_trait;

use crate::error::CloudError;
use crate::functions::{CloudFunction, FunctionRegistry};
use crate::gcp::GcpClient;

/// `FunctionRegistry` over the Cloud Functions v2 REST API.
#[derive(Debug, Clone)]
pub struct CloudFunctionsRegistry {
    client: GcpClient,
}

impl CloudFunctionsRegistry {
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FunctionRegistry for CloudFunctionsRegistry {
    async fn get_function(&self, name: &str) -> Result<CloudFunction, CloudError> {
        let url = format!(
            "{}/v2/{name}",
            self.client.endpoints().functions.trim_end_matches('/')
        );
        self.client.send_json(self.client.get(&url), name).await
    }
}
