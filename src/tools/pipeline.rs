//! The tool set exposed to the testing agent.
//!
//! Each tool is a thin adapter: it validates and deserializes the model's
//! arguments, resolves the matching accessor from the dependency map and
//! returns the accessor's result as JSON (or raw text for object reads).

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::agent::AgentBuilder;
use crate::config::GcpConfig;
use crate::error::{CloudError, ToolError};
use crate::functions::{CloudFunctionsRegistry, DeploymentDescriptor, FunctionRegistry};
use crate::gcp::GcpClient;
use crate::logs::{
    CloudLoggingStore, DEFAULT_LOG_LIMIT, DEFAULT_LOOKBACK_MINUTES, LogQueryAccessor, LogStore,
    MAX_LOOKBACK_MINUTES,
};
use crate::pubsub::{PipelineTrigger, PubSubPublisher, Publisher, TriggerRequest};
use crate::storage::{
    DEFAULT_LIST_LIMIT, DEFAULT_PREVIEW_LINES, GcsObjectStore, ObjectStore, StorageAccessor,
};
use crate::tools::{ToolOutcome, ToolSpec, parse_args};

pub const LIST_GCS_OBJECTS: &str = "list_gcs_objects";
pub const READ_GCS_OBJECT: &str = "read_gcs_object";
pub const READ_GCS_JSONL_PREVIEW: &str = "read_gcs_jsonl_preview";
pub const QUERY_FUNCTION_LOGS: &str = "query_function_logs";
pub const TRIGGER_SCRAPER_PIPELINE: &str = "trigger_scraper_pipeline";
pub const DESCRIBE_CLOUD_FUNCTION: &str = "describe_cloud_function";

pub const TOOL_NAMES: [&str; 6] = [
    TRIGGER_SCRAPER_PIPELINE,
    LIST_GCS_OBJECTS,
    READ_GCS_OBJECT,
    READ_GCS_JSONL_PREVIEW,
    QUERY_FUNCTION_LOGS,
    DESCRIBE_CLOUD_FUNCTION,
];

pub fn all_tools() -> Vec<ToolSpec> {
    vec![
        trigger_scraper_pipeline_tool(),
        list_gcs_objects_tool(),
        read_gcs_object_tool(),
        read_gcs_jsonl_preview_tool(),
        query_function_logs_tool(),
        describe_cloud_function_tool(),
    ]
}

/// The four accessors plus the config they share.
#[derive(Clone)]
pub struct PipelineServices {
    pub config: Arc<GcpConfig>,
    pub storage: StorageAccessor,
    pub logs: LogQueryAccessor,
    pub trigger: PipelineTrigger,
    pub descriptor: DeploymentDescriptor,
}

impl PipelineServices {
    pub fn new(
        config: Arc<GcpConfig>,
        objects: Arc<dyn ObjectStore>,
        log_store: Arc<dyn LogStore>,
        publisher: Arc<dyn Publisher>,
        registry: Arc<dyn FunctionRegistry>,
    ) -> Self {
        Self {
            storage: StorageAccessor::new(objects),
            logs: LogQueryAccessor::new(log_store, config.clone()),
            trigger: PipelineTrigger::new(publisher, config.clone()),
            descriptor: DeploymentDescriptor::new(registry, config.clone()),
            config,
        }
    }

    /// Wires every accessor to its Google Cloud REST backend.
    pub fn from_config(config: GcpConfig) -> Result<Self, CloudError> {
        let client = GcpClient::from_config(&config)?;
        Ok(Self::new(
            Arc::new(config),
            Arc::new(GcsObjectStore::new(client.clone())),
            Arc::new(CloudLoggingStore::new(client.clone())),
            Arc::new(PubSubPublisher::new(client.clone())),
            Arc::new(CloudFunctionsRegistry::new(client)),
        ))
    }

    /// Installs the tools and the accessors they resolve at call time.
    pub fn register(self, builder: AgentBuilder) -> AgentBuilder {
        builder
            .tools(all_tools())
            .dependency(self.storage)
            .dependency(self.logs)
            .dependency(self.trigger)
            .dependency(self.descriptor)
    }
}

fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

fn default_preview_lines() -> usize {
    DEFAULT_PREVIEW_LINES
}

fn default_minutes() -> i64 {
    DEFAULT_LOOKBACK_MINUTES
}

fn default_log_limit() -> usize {
    DEFAULT_LOG_LIMIT
}

#[derive(Debug, Deserialize)]
struct ListObjectsArgs {
    bucket_name: String,
    #[serde(default)]
    prefix: String,
    #[serde(default = "default_list_limit")]
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct ReadObjectArgs {
    bucket_name: String,
    object_path: String,
}

#[derive(Debug, Deserialize)]
struct PreviewArgs {
    bucket_name: String,
    object_path: String,
    #[serde(default = "default_preview_lines")]
    max_lines: usize,
}

#[derive(Debug, Deserialize)]
struct QueryLogsArgs {
    function_name: String,
    #[serde(default = "default_minutes")]
    minutes: i64,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default = "default_log_limit")]
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct DescribeFunctionArgs {
    function_name: String,
    #[serde(default)]
    location: Option<String>,
}

pub fn list_gcs_objects_tool() -> ToolSpec {
    ToolSpec::new(
        LIST_GCS_OBJECTS,
        "List recent objects under a prefix. bucket_name may include the gs:// prefix.",
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "bucket_name": {"type": "string", "description": "Target bucket, with or without gs://"},
            "prefix": {"type": "string", "description": "Object prefix within the bucket"},
            "limit": {"type": "integer", "minimum": 0, "description": "Maximum entries to return (default 20)"}
        },
        "required": ["bucket_name"],
        "additionalProperties": false
    }))
    .expect("valid schema")
    .with_handler(|args, deps| {
        let storage = deps.require::<StorageAccessor>("StorageAccessor");
        async move {
            let args: ListObjectsArgs = parse_args(LIST_GCS_OBJECTS, args)?;
            let entries = storage?
                .list(&args.bucket_name, &args.prefix, args.limit)
                .await?;
            ToolOutcome::json(&entries)
        }
    })
}

pub fn read_gcs_object_tool() -> ToolSpec {
    ToolSpec::new(READ_GCS_OBJECT, "Return the raw text content of a GCS object.")
        .with_schema(json!({
            "type": "object",
            "properties": {
                "bucket_name": {"type": "string"},
                "object_path": {"type": "string", "description": "Object name, or a full gs://bucket/object URI"}
            },
            "required": ["bucket_name", "object_path"],
            "additionalProperties": false
        }))
        .expect("valid schema")
        .with_handler(|args, deps| {
            let storage = deps.require::<StorageAccessor>("StorageAccessor");
            async move {
                let args: ReadObjectArgs = parse_args(READ_GCS_OBJECT, args)?;
                let text = storage?.read(&args.bucket_name, &args.object_path).await?;
                Ok::<_, ToolError>(ToolOutcome::Text(text))
            }
        })
}

pub fn read_gcs_jsonl_preview_tool() -> ToolSpec {
    ToolSpec::new(
        READ_GCS_JSONL_PREVIEW,
        "Return the first N JSONL rows of an object to keep responses small.",
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "bucket_name": {"type": "string"},
            "object_path": {"type": "string"},
            "max_lines": {"type": "integer", "minimum": 0, "description": "Non-blank lines to parse (default 10)"}
        },
        "required": ["bucket_name", "object_path"],
        "additionalProperties": false
    }))
    .expect("valid schema")
    .with_handler(|args, deps| {
        let storage = deps.require::<StorageAccessor>("StorageAccessor");
        async move {
            let args: PreviewArgs = parse_args(READ_GCS_JSONL_PREVIEW, args)?;
            let rows = storage?
                .preview_jsonl(&args.bucket_name, &args.object_path, args.max_lines)
                .await?;
            ToolOutcome::json(&rows)
        }
    })
}

pub fn query_function_logs_tool() -> ToolSpec {
    ToolSpec::new(
        QUERY_FUNCTION_LOGS,
        "Fetch recent log entries for a Cloud Function, newest first.",
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "function_name": {"type": "string"},
            "minutes": {
                "type": "integer",
                "minimum": 0,
                "maximum": MAX_LOOKBACK_MINUTES,
                "description": "Look-back window (default 60)"
            },
            "severity": {"type": "string", "description": "Minimum severity, e.g. ERROR"},
            "limit": {"type": "integer", "minimum": 0, "description": "Maximum entries (default 50)"}
        },
        "required": ["function_name"],
        "additionalProperties": false
    }))
    .expect("valid schema")
    .with_handler(|args, deps| {
        let logs = deps.require::<LogQueryAccessor>("LogQueryAccessor");
        async move {
            let args: QueryLogsArgs = parse_args(QUERY_FUNCTION_LOGS, args)?;
            let entries = logs?
                .query(
                    &args.function_name,
                    args.minutes,
                    args.severity.as_deref(),
                    args.limit,
                )
                .await?;
            ToolOutcome::json(&entries)
        }
    })
}

pub fn trigger_scraper_pipeline_tool() -> ToolSpec {
    ToolSpec::new(
        TRIGGER_SCRAPER_PIPELINE,
        "Publish the canonical scraping request to the pipeline topic and return the message id.",
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "topic_name": {"type": "string", "description": "Defaults to SCRAPING_REQUESTS_TOPIC or scraping-requests"},
            "keywords": {"type": "array", "items": {"type": "string"}},
            "urls": {"type": "array", "items": {"type": "string"}},
            "scrape_depth": {"type": "integer"},
            "persist": {"type": "boolean"}
        },
        "required": [],
        "additionalProperties": false
    }))
    .expect("valid schema")
    .with_handler(|args, deps| {
        let trigger = deps.require::<PipelineTrigger>("PipelineTrigger");
        async move {
            let request: TriggerRequest = parse_args(TRIGGER_SCRAPER_PIPELINE, args)?;
            let message_id = trigger?.trigger(&request).await?;
            Ok::<_, ToolError>(ToolOutcome::Text(message_id))
        }
    })
}

pub fn describe_cloud_function_tool() -> ToolSpec {
    ToolSpec::new(
        DESCRIBE_CLOUD_FUNCTION,
        "Return deployment metadata (state, update time, service account, limits) for a Cloud Function.",
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "function_name": {"type": "string", "description": "Logical name, e.g. result-merger"},
            "location": {"type": "string", "description": "Region override; defaults to REGION or us-central1"}
        },
        "required": ["function_name"],
        "additionalProperties": false
    }))
    .expect("valid schema")
    .with_handler(|args, deps| {
        let descriptor = deps.require::<DeploymentDescriptor>("DeploymentDescriptor");
        async move {
            let args: DescribeFunctionArgs = parse_args(DESCRIBE_CLOUD_FUNCTION, args)?;
            let metadata = descriptor?
                .describe(&args.function_name, args.location.as_deref())
                .await?;
            ToolOutcome::json(&metadata)
        }
    })
}
