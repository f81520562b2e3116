//! Cloud Storage access: listing, raw reads and JSONL previews.

pub mod gcs;
pub mod path;
pub mod preview;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::CloudError;

pub use gcs::GcsObjectStore;
pub use path::{ObjectLocation, normalize};
pub use preview::{DEFAULT_PREVIEW_LINES, parse_jsonl_preview};

pub const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectListingEntry {
    pub name: String,
    pub size: u64,
    pub updated: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub items: Vec<ObjectListingEntry>,
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        page_size: usize,
        page_token: Option<String>,
    ) -> Result<ObjectPage, CloudError>;

    async fn download_text(&self, bucket: &str, object: &str) -> Result<String, CloudError>;
}

#[derive(Clone)]
pub struct StorageAccessor {
    store: Arc<dyn ObjectStore>,
}

impl StorageAccessor {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Lists objects under `prefix` in provider order, fetching no further pages
    /// once `limit` entries are collected.
    pub async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<ObjectListingEntry>, CloudError> {
        let location = normalize(bucket, None)?;
        let mut results = Vec::new();
        let mut page_token = None;

        while results.len() < limit {
            let page_size = (limit - results.len()).min(MAX_PAGE_SIZE);
            let page = self
                .store
                .list_page(&location.bucket, prefix, page_size, page_token)
                .await?;

            for entry in page.items {
                results.push(entry);
                if results.len() >= limit {
                    break;
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(bucket = %location.bucket, prefix, count = results.len(), "listed objects");
        Ok(results)
    }

    pub async fn read(&self, bucket: &str, object_path: &str) -> Result<String, CloudError> {
        let location = normalize(bucket, Some(object_path))?;
        let object = location.require_object()?;
        debug!(bucket = %location.bucket, object, "reading object");
        self.store.download_text(&location.bucket, object).await
    }

    /// Reads the object, then parses up to `max_lines` non-blank lines.
    pub async fn preview_jsonl(
        &self,
        bucket: &str,
        object_path: &str,
        max_lines: usize,
    ) -> Result<Vec<Value>, CloudError> {
        let content = self.read(bucket, object_path).await?;
        Ok(parse_jsonl_preview(&content, max_lines))
    }
}
