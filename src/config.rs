//! Environment-derived settings shared by every accessor.
//!
//! Values are resolved once and passed around explicitly. Lookups follow
//! argument > environment > literal default everywhere.

use crate::error::CloudError;

pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_TOPIC: &str = "scraping-requests";
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_MODEL_LOCATION: &str = "global";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpConfig {
    pub project_id: Option<String>,
    pub region: String,
    pub scraping_topic: String,
    pub model: String,
    pub model_location: String,
    pub use_vertex_ai: bool,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            region: DEFAULT_REGION.to_string(),
            scraping_topic: DEFAULT_TOPIC.to_string(),
            model: DEFAULT_MODEL.to_string(),
            model_location: DEFAULT_MODEL_LOCATION.to_string(),
            use_vertex_ai: true,
            api_key: None,
            access_token: None,
        }
    }
}

impl GcpConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let first = |keys: &[&str]| keys.iter().find_map(|key| get(*key));

        let use_vertex_ai = get("GOOGLE_GENAI_USE_VERTEXAI")
            .map(|value| !matches!(value.trim().to_ascii_lowercase().as_str(), "false" | "0"))
            .unwrap_or(true);

        Self {
            project_id: first(&[
                "GCP_PROJECT_ID",
                "GOOGLE_CLOUD_PROJECT",
                "CLOUDSDK_CORE_PROJECT",
            ]),
            region: first(&["REGION", "VERTEX_AI_LOCATION"])
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            scraping_topic: get("SCRAPING_REQUESTS_TOPIC")
                .unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            model: get("VERTEX_AI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            model_location: first(&["GOOGLE_CLOUD_LOCATION", "VERTEX_AI_LOCATION"])
                .unwrap_or_else(|| DEFAULT_MODEL_LOCATION.to_string()),
            use_vertex_ai,
            api_key: first(&["GOOGLE_API_KEY", "GEMINI_API_KEY"]),
            access_token: get("GOOGLE_OAUTH_ACCESS_TOKEN"),
        }
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn require_project_id(&self) -> Result<&str, CloudError> {
        self.project_id.as_deref().ok_or_else(|| {
            CloudError::Configuration("GCP project ID is not configured in the environment".into())
        })
    }

    /// Region for a call, preferring the explicit override.
    pub fn resolve_region<'a>(&'a self, location: Option<&'a str>) -> &'a str {
        location
            .filter(|value| !value.is_empty())
            .unwrap_or(self.region.as_str())
    }

    pub fn resolve_topic<'a>(&'a self, topic: Option<&'a str>) -> &'a str {
        topic
            .filter(|value| !value.is_empty())
            .unwrap_or(self.scraping_topic.as_str())
    }
}
