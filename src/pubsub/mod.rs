//! Publishing scrape requests that kick off the pipeline.

pub mod rest;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::GcpConfig;
use crate::error::CloudError;

pub use rest::PubSubPublisher;

pub const DEFAULT_KEYWORDS: [&str; 5] = ["fenerbahce", "galatasaray", "mourinho", "transfer", "derbi"];
pub const DEFAULT_URLS: [&str; 3] = [
    "https://www.fanatik.com.tr",
    "https://www.ntvspor.net",
    "https://www.trtspor.com.tr/haber/futbol",
];
pub const DEFAULT_SCRAPE_DEPTH: i64 = 1;
pub const PAYLOAD_LOG_LEVEL: &str = "INFO";

/// Message body understood by the scraper function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub keywords: Vec<String>,
    pub urls: Vec<String>,
    pub scrape_depth: i64,
    pub persist: bool,
    pub log_level: String,
}

/// Caller-supplied trigger options. Absent or empty lists fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub topic_name: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub urls: Option<Vec<String>>,
    #[serde(default = "default_scrape_depth")]
    pub scrape_depth: i64,
    #[serde(default)]
    pub persist: bool,
}

fn default_scrape_depth() -> i64 {
    DEFAULT_SCRAPE_DEPTH
}

impl Default for TriggerRequest {
    fn default() -> Self {
        Self {
            topic_name: None,
            keywords: None,
            urls: None,
            scrape_depth: DEFAULT_SCRAPE_DEPTH,
            persist: false,
        }
    }
}

impl TriggerRequest {
    pub fn payload(&self) -> ScrapeRequest {
        ScrapeRequest {
            keywords: or_defaults(self.keywords.as_deref(), &DEFAULT_KEYWORDS),
            urls: or_defaults(self.urls.as_deref(), &DEFAULT_URLS),
            scrape_depth: self.scrape_depth,
            persist: self.persist,
            log_level: PAYLOAD_LOG_LEVEL.to_string(),
        }
    }
}

fn or_defaults(values: Option<&[String]>, defaults: &[&str]) -> Vec<String> {
    match values {
        Some(values) if !values.is_empty() => values.to_vec(),
        _ => defaults.iter().map(|value| value.to_string()).collect(),
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes one message and resolves to its server-assigned id once acknowledged.
    async fn publish(&self, topic_path: &str, data: Vec<u8>) -> Result<String, CloudError>;
}

pub fn topic_path(project_id: &str, topic: &str) -> String {
    format!("projects/{project_id}/topics/{topic}")
}

#[derive(Clone)]
pub struct PipelineTrigger {
    publisher: Arc<dyn Publisher>,
    config: Arc<GcpConfig>,
}

impl PipelineTrigger {
    pub fn new(publisher: Arc<dyn Publisher>, config: Arc<GcpConfig>) -> Self {
        Self { publisher, config }
    }

    pub async fn trigger(&self, request: &TriggerRequest) -> Result<String, CloudError> {
        let project_id = self.config.require_project_id()?;
        let topic = self.config.resolve_topic(request.topic_name.as_deref());
        let path = topic_path(project_id, topic);

        let data = serde_json::to_vec(&request.payload())
            .map_err(|err| CloudError::Response(err.to_string()))?;
        let message_id = self.publisher.publish(&path, data).await?;

        info!(topic = %path, %message_id, "published scrape request");
        Ok(message_id)
    }
}
