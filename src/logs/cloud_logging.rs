use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CloudError;
use crate::gcp::GcpClient;
use crate::logs::{EntriesPage, EntriesRequest, LogPayload, LogStore, RawLogEntry};

/// `LogStore` over the Cloud Logging v2 `entries:list` method.
#[derive(Debug, Clone)]
pub struct CloudLoggingStore {
    client: GcpClient,
}

impl CloudLoggingStore {
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListEntriesBody<'a> {
    resource_names: &'a [String],
    filter: &'a str,
    order_by: &'a str,
    page_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEntriesResponse {
    #[serde(default)]
    entries: Vec<WireLogEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLogEntry {
    timestamp: Option<DateTime<Utc>>,
    severity: Option<String>,
    text_payload: Option<String>,
    json_payload: Option<Value>,
    proto_payload: Option<Value>,
}

impl From<WireLogEntry> for RawLogEntry {
    fn from(entry: WireLogEntry) -> Self {
        let payload = match (entry.text_payload, entry.json_payload, entry.proto_payload) {
            (Some(text), _, _) => LogPayload::Text(text),
            (None, Some(json), _) | (None, None, Some(json)) => LogPayload::Json(json),
            (None, None, None) => LogPayload::Empty,
        };
        Self {
            timestamp: entry.timestamp,
            severity: entry.severity,
            payload,
        }
    }
}

#[async_trait]
impl LogStore for CloudLoggingStore {
    async fn list_entries(&self, request: &EntriesRequest) -> Result<EntriesPage, CloudError> {
        let url = format!(
            "{}/v2/entries:list",
            self.client.endpoints().logging.trim_end_matches('/')
        );
        let body = ListEntriesBody {
            resource_names: &request.resource_names,
            filter: &request.filter,
            order_by: &request.order_by,
            page_size: request.page_size,
            page_token: request.page_token.as_deref(),
        };

        let response: ListEntriesResponse = self
            .client
            .send_json(self.client.post(&url).json(&body), "log entries")
            .await?;

        Ok(EntriesPage {
            entries: response.entries.into_iter().map(Into::into).collect(),
            next_page_token: response.next_page_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn wire_entries_pick_the_populated_payload() {
        let response: ListEntriesResponse = serde_json::from_value(json!({
            "entries": [
                {"timestamp": "2025-10-01T10:00:00Z", "severity": "ERROR", "textPayload": "boom"},
                {"severity": "INFO", "jsonPayload": {"message": "published 3 batches"}},
                {}
            ]
        }))
        .expect("parses");

        let entries = response
            .entries
            .into_iter()
            .map(RawLogEntry::from)
            .collect::<Vec<_>>();
        assert_eq!(entries[0].payload, LogPayload::Text("boom".to_string()));
        assert!(entries[0].timestamp.is_some());
        assert_eq!(entries[1].payload.render(), "published 3 batches");
        assert_eq!(entries[2].payload, LogPayload::Empty);
        assert_eq!(entries[2].severity, None);
    }

    #[test]
    fn request_body_uses_rest_field_names() {
        let names = vec!["projects/p".to_string()];
        let body = ListEntriesBody {
            resource_names: &names,
            filter: "x",
            order_by: "timestamp desc",
            page_size: 50,
            page_token: None,
        };
        let value = serde_json::to_value(body).expect("serializes");
        assert_eq!(value["resourceNames"][0], "projects/p");
        assert_eq!(value["orderBy"], "timestamp desc");
        assert_eq!(value["pageSize"], 50);
        assert!(value.get("pageToken").is_none());
    }
}
