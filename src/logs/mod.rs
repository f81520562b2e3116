//! Cloud Logging queries scoped to a single Cloud Function.

pub mod cloud_logging;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::GcpConfig;
use crate::error::CloudError;

pub use cloud_logging::CloudLoggingStore;

pub const DEFAULT_LOOKBACK_MINUTES: i64 = 60;
pub const DEFAULT_LOG_LIMIT: usize = 50;
pub const NEWEST_FIRST: &str = "timestamp desc";
/// Longest retention Cloud Logging buckets allow (3650 days).
pub const MAX_LOOKBACK_MINUTES: i64 = 3650 * 24 * 60;
const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: Option<DateTime<Utc>>,
    pub severity: String,
    pub function: String,
    pub text: String,
}

/// Payload as delivered by the service, before rendering to text.
#[derive(Debug, Clone, PartialEq)]
pub enum LogPayload {
    Text(String),
    Json(Value),
    Empty,
}

impl LogPayload {
    pub fn render(&self) -> String {
        match self {
            LogPayload::Text(text) => text.clone(),
            LogPayload::Json(value) => match value.get("message") {
                Some(Value::String(message)) => message.clone(),
                Some(message) => message.to_string(),
                None => value.to_string(),
            },
            LogPayload::Empty => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawLogEntry {
    pub timestamp: Option<DateTime<Utc>>,
    pub severity: Option<String>,
    pub payload: LogPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntriesRequest {
    pub resource_names: Vec<String>,
    pub filter: String,
    pub order_by: String,
    pub page_size: usize,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntriesPage {
    pub entries: Vec<RawLogEntry>,
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn list_entries(&self, request: &EntriesRequest) -> Result<EntriesPage, CloudError>;
}

/// Conjunctive filter for a function's entries at or after `start`.
pub fn build_filter(function_name: &str, start: DateTime<Utc>, severity: Option<&str>) -> String {
    let mut clauses = vec![
        r#"resource.type="cloud_function""#.to_string(),
        format!(r#"resource.labels.function_name="{function_name}""#),
        format!(r#"timestamp>="{}""#, start.format("%Y-%m-%dT%H:%M:%S%.6fZ")),
    ];
    if let Some(severity) = severity.filter(|s| !s.trim().is_empty()) {
        clauses.push(format!("severity>={}", severity.trim().to_uppercase()));
    }
    clauses.join(" AND ")
}

/// `now` minus `minutes`, rejecting windows chrono cannot represent.
pub fn window_start(now: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>, CloudError> {
    Duration::try_minutes(minutes)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| {
            CloudError::MalformedInput(format!(
                "look-back window of {minutes} minutes is out of range"
            ))
        })
}

#[derive(Clone)]
pub struct LogQueryAccessor {
    store: Arc<dyn LogStore>,
    config: Arc<GcpConfig>,
}

impl LogQueryAccessor {
    pub fn new(store: Arc<dyn LogStore>, config: Arc<GcpConfig>) -> Self {
        Self { store, config }
    }

    /// Newest-first entries for `function_name` over the last `minutes`.
    pub async fn query(
        &self,
        function_name: &str,
        minutes: i64,
        severity: Option<&str>,
        limit: usize,
    ) -> Result<Vec<LogEntry>, CloudError> {
        let project_id = self.config.require_project_id()?;
        let start = window_start(Utc::now(), minutes)?;
        let filter = build_filter(function_name, start, severity);
        debug!(%filter, limit, "querying function logs");

        let mut results = Vec::new();
        let mut page_token = None;

        while results.len() < limit {
            let request = EntriesRequest {
                resource_names: vec![format!("projects/{project_id}")],
                filter: filter.clone(),
                order_by: NEWEST_FIRST.to_string(),
                page_size: (limit - results.len()).min(MAX_PAGE_SIZE),
                page_token,
            };
            let page = self.store.list_entries(&request).await?;

            for entry in page.entries {
                results.push(LogEntry {
                    timestamp: entry.timestamp,
                    severity: entry.severity.unwrap_or_else(|| "DEFAULT".to_string()),
                    function: function_name.to_string(),
                    text: entry.payload.render(),
                });
                if results.len() >= limit {
                    break;
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct RecordingStore {
        pages: Mutex<Vec<EntriesPage>>,
        requests: Mutex<Vec<EntriesRequest>>,
    }

    #[async_trait]
    impl LogStore for RecordingStore {
        async fn list_entries(&self, request: &EntriesRequest) -> Result<EntriesPage, CloudError> {
            self.requests
                .lock()
                .expect("lock poisoned")
                .push(request.clone());
            let mut pages = self.pages.lock().expect("lock poisoned");
            if pages.is_empty() {
                Ok(EntriesPage::default())
            } else {
                Ok(pages.remove(0))
            }
        }
    }

    fn entry(text: &str) -> RawLogEntry {
        RawLogEntry {
            timestamp: Some(Utc::now()),
            severity: Some("INFO".to_string()),
            payload: LogPayload::Text(text.to_string()),
        }
    }

    fn accessor(store: Arc<RecordingStore>) -> LogQueryAccessor {
        LogQueryAccessor::new(
            store,
            Arc::new(GcpConfig::default().with_project_id("aisports-test")),
        )
    }

    fn filter_start(filter: &str) -> DateTime<Utc> {
        let (_, rest) = filter.split_once(r#"timestamp>=""#).expect("timestamp clause");
        let (stamp, _) = rest.split_once('"').expect("closing quote");
        stamp.parse::<DateTime<Utc>>().expect("rfc3339 timestamp")
    }

    #[test]
    fn filter_has_all_clauses_and_uppercases_severity() {
        let start = "2025-10-01T10:00:00Z".parse::<DateTime<Utc>>().expect("ts");
        let filter = build_filter("result-merger", start, Some("error"));
        assert_eq!(
            filter,
            r#"resource.type="cloud_function" AND resource.labels.function_name="result-merger" AND timestamp>="2025-10-01T10:00:00.000000Z" AND severity>=ERROR"#
        );
        assert!(!build_filter("f", start, None).contains("severity"));
        assert!(!build_filter("f", start, Some("")).contains("severity"));
    }

    #[tokio::test]
    async fn query_builds_window_relative_to_now() {
        let store = Arc::new(RecordingStore::default());
        let before = Utc::now();
        accessor(store.clone())
            .query("f", 30, Some("error"), 50)
            .await
            .expect("queries");
        let after = Utc::now();

        let requests = store.requests.lock().expect("lock poisoned");
        let request = &requests[0];
        assert_eq!(request.resource_names, vec!["projects/aisports-test".to_string()]);
        assert_eq!(request.order_by, NEWEST_FIRST);
        assert!(request.filter.ends_with("severity>=ERROR"));

        let start = filter_start(&request.filter);
        assert!(start >= before - Duration::minutes(30) - Duration::seconds(1));
        assert!(start <= after - Duration::minutes(30));
    }

    #[tokio::test]
    async fn query_stops_at_limit_across_pages() {
        let store = Arc::new(RecordingStore {
            pages: Mutex::new(vec![
                EntriesPage {
                    entries: vec![entry("a"), entry("b")],
                    next_page_token: Some("p2".to_string()),
                },
                EntriesPage {
                    entries: vec![entry("c"), entry("d")],
                    next_page_token: Some("p3".to_string()),
                },
            ]),
            ..RecordingStore::default()
        });

        let entries = accessor(store.clone())
            .query("scraper-function", 60, None, 3)
            .await
            .expect("queries");

        let texts = entries.iter().map(|e| e.text.as_str()).collect::<Vec<_>>();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert!(entries.iter().all(|e| e.function == "scraper-function"));

        let requests = store.requests.lock().expect("lock poisoned");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].page_size, 1);
        assert_eq!(requests[1].page_token.as_deref(), Some("p2"));
    }

    #[test]
    fn window_start_rejects_unrepresentable_windows() {
        let now = "2025-10-01T10:00:00Z".parse::<DateTime<Utc>>().expect("ts");
        assert_eq!(
            window_start(now, 30).expect("in range"),
            "2025-10-01T09:30:00Z".parse::<DateTime<Utc>>().expect("ts")
        );
        assert!(matches!(
            window_start(now, 1_000_000_000_000),
            Err(CloudError::MalformedInput(_))
        ));
        assert!(window_start(now, i64::MAX).is_err());
    }

    #[tokio::test]
    async fn huge_window_is_an_error_not_a_panic() {
        let store = Arc::new(RecordingStore::default());
        let err = accessor(store.clone())
            .query("f", 1_000_000_000_000, None, 10)
            .await
            .expect_err("must fail");
        assert!(matches!(err, CloudError::MalformedInput(_)));
        assert!(store.requests.lock().expect("lock poisoned").is_empty());
    }

    #[tokio::test]
    async fn query_requires_project() {
        let accessor = LogQueryAccessor::new(
            Arc::new(RecordingStore::default()),
            Arc::new(GcpConfig::default()),
        );
        let err = accessor.query("f", 60, None, 10).await.expect_err("must fail");
        assert!(matches!(err, CloudError::Configuration(_)));
    }

    #[test]
    fn payload_rendering_prefers_message_field() {
        assert_eq!(LogPayload::Text("plain".into()).render(), "plain");
        assert_eq!(
            LogPayload::Json(json!({"message": "merged 12 batches", "count": 12})).render(),
            "merged 12 batches"
        );
        assert_eq!(LogPayload::Json(json!({"count": 12})).render(), r#"{"count":12}"#);
        assert_eq!(LogPayload::Empty.render(), "");
    }
}
