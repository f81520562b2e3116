//! Deployment metadata for Cloud Functions (2nd gen).

pub mod rest;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GcpConfig;
use crate::error::CloudError;

pub use rest::CloudFunctionsRegistry;

pub const STATE_UNSPECIFIED: &str = "STATE_UNSPECIFIED";
const INGRESS_UNSPECIFIED: &str = "INGRESS_SETTINGS_UNSPECIFIED";

/// Function resource as returned by the Cloud Functions v2 API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudFunction {
    pub name: String,
    pub state: Option<String>,
    pub update_time: Option<DateTime<Utc>>,
    pub labels: Option<BTreeMap<String, String>>,
    pub build_config: Option<BuildConfig>,
    pub service_config: Option<ServiceConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    pub runtime: Option<String>,
    pub worker_pool: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub service_account_email: Option<String>,
    pub available_memory: Option<String>,
    pub max_instance_count: Option<i64>,
    pub min_instance_count: Option<i64>,
    pub ingress_settings: Option<String>,
    pub environment_variables: Option<BTreeMap<String, String>>,
}

/// Flattened view of a deployed function. Every field from a missing nested
/// config is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionMetadata {
    pub name: String,
    pub state: String,
    pub update_time: Option<String>,
    pub service_account_email: Option<String>,
    pub available_memory: Option<String>,
    pub max_instance_count: Option<i64>,
    pub min_instance_count: Option<i64>,
    pub ingress_settings: Option<String>,
    pub build_worker_pool: Option<String>,
    pub runtime: Option<String>,
    pub environment_variables: Option<BTreeMap<String, String>>,
    pub labels: Option<BTreeMap<String, String>>,
}

impl From<CloudFunction> for FunctionMetadata {
    fn from(function: CloudFunction) -> Self {
        let service = function.service_config;
        let build = function.build_config;

        Self {
            name: function.name,
            state: function
                .state
                .filter(|state| !state.is_empty())
                .unwrap_or_else(|| STATE_UNSPECIFIED.to_string()),
            update_time: function
                .update_time
                .map(|time| time.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            service_account_email: service
                .as_ref()
                .and_then(|s| s.service_account_email.clone()),
            available_memory: service.as_ref().and_then(|s| s.available_memory.clone()),
            // Zero-valued counts are omitted on the wire.
            max_instance_count: service
                .as_ref()
                .map(|s| s.max_instance_count.unwrap_or(0)),
            min_instance_count: service
                .as_ref()
                .map(|s| s.min_instance_count.unwrap_or(0)),
            ingress_settings: service
                .as_ref()
                .and_then(|s| s.ingress_settings.clone())
                .filter(|ingress| ingress != INGRESS_UNSPECIFIED),
            build_worker_pool: build.as_ref().and_then(|b| b.worker_pool.clone()),
            runtime: build.as_ref().and_then(|b| b.runtime.clone()),
            environment_variables: service
                .and_then(|s| s.environment_variables)
                .filter(|vars| !vars.is_empty()),
            labels: function.labels.filter(|labels| !labels.is_empty()),
        }
    }
}

#[async_trait]
pub trait FunctionRegistry: Send + Sync {
    async fn get_function(&self, name: &str) -> Result<CloudFunction, CloudError>;
}

pub fn function_path(project_id: &str, location: &str, function: &str) -> String {
    format!("projects/{project_id}/locations/{location}/functions/{function}")
}

#[derive(Clone)]
pub struct DeploymentDescriptor {
    registry: Arc<dyn FunctionRegistry>,
    config: Arc<GcpConfig>,
}

impl DeploymentDescriptor {
    pub fn new(registry: Arc<dyn FunctionRegistry>, config: Arc<GcpConfig>) -> Self {
        Self { registry, config }
    }

    pub async fn describe(
        &self,
        function_name: &str,
        location: Option<&str>,
    ) -> Result<FunctionMetadata, CloudError> {
        let project_id = self.config.require_project_id()?;
        let region = self.config.resolve_region(location);
        let name = function_path(project_id, region, function_name);
        debug!(%name, "describing cloud function");

        let function = self.registry.get_function(&name).await?;
        Ok(function.into())
    }
}
