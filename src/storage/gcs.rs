use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::CloudError;
use crate::gcp::GcpClient;
use crate::storage::{ObjectListingEntry, ObjectPage, ObjectStore};

/// `ObjectStore` over the Cloud Storage JSON API.
#[derive(Debug, Clone)]
pub struct GcsObjectStore {
    client: GcpClient,
}

impl GcsObjectStore {
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }

    fn objects_url(&self, bucket: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o",
            self.client.endpoints().storage.trim_end_matches('/'),
            urlencoding::encode(bucket)
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListObjectsResponse {
    #[serde(default)]
    items: Vec<GcsObject>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsObject {
    name: String,
    // The JSON API encodes uint64 as a decimal string.
    size: Option<String>,
    updated: Option<DateTime<Utc>>,
    content_type: Option<String>,
}

impl From<GcsObject> for ObjectListingEntry {
    fn from(object: GcsObject) -> Self {
        Self {
            name: object.name,
            size: object
                .size
                .and_then(|size| size.parse().ok())
                .unwrap_or_default(),
            updated: object.updated,
            content_type: object.content_type,
        }
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        page_size: usize,
        page_token: Option<String>,
    ) -> Result<ObjectPage, CloudError> {
        let mut query = vec![("maxResults", page_size.to_string())];
        if !prefix.is_empty() {
            query.push(("prefix", prefix.to_string()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let request = self.client.get(&self.objects_url(bucket)).query(&query);
        let response: ListObjectsResponse = self
            .client
            .send_json(request, &format!("gs://{bucket}"))
            .await?;

        Ok(ObjectPage {
            items: response.items.into_iter().map(Into::into).collect(),
            next_page_token: response.next_page_token,
        })
    }

    async fn download_text(&self, bucket: &str, object: &str) -> Result<String, CloudError> {
        let url = format!("{}/{}", self.objects_url(bucket), urlencoding::encode(object));
        let request = self.client.get(&url).query(&[("alt", "media")]);
        self.client
            .send_text(request, &format!("gs://{bucket}/{object}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::GcpEndpoints;

    #[test]
    fn object_names_are_percent_encoded() {
        let client = GcpClient::new(None, GcpEndpoints::default()).expect("client");
        let store = GcsObjectStore::new(client);
        assert_eq!(
            store.objects_url("aisports-news"),
            "https://storage.googleapis.com/storage/v1/b/aisports-news/o"
        );
        assert_eq!(urlencoding::encode("news_data/a b.json"), "news_data%2Fa%20b.json");
    }

    #[test]
    fn listing_response_maps_string_sizes_and_timestamps() {
        let response: ListObjectsResponse = serde_json::from_str(
            r#"{
                "items": [
                    {"name": "news_data/1.json", "size": "512", "updated": "2025-10-01T12:00:00.123Z", "contentType": "application/json"},
                    {"name": "news_data/2.json"}
                ],
                "nextPageToken": "abc"
            }"#,
        )
        .expect("parses");

        assert_eq!(response.next_page_token.as_deref(), Some("abc"));
        let entries = response
            .items
            .into_iter()
            .map(ObjectListingEntry::from)
            .collect::<Vec<_>>();
        assert_eq!(entries[0].size, 512);
        assert!(entries[0].updated.is_some());
        assert_eq!(entries[1].size, 0);
        assert_eq!(entries[1].content_type, None);
    }
}
