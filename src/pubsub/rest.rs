use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::CloudError;
use crate::gcp::GcpClient;
use crate::pubsub::Publisher;

/// `Publisher` over the Pub/Sub v1 REST `topics.publish` method.
#[derive(Debug, Clone)]
pub struct PubSubPublisher {
    client: GcpClient,
}

impl PubSubPublisher {
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Serialize)]
struct PublishBody {
    messages: Vec<PubsubMessage>,
}

#[derive(Debug, Serialize)]
struct PubsubMessage {
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

fn publish_body(data: &[u8]) -> PublishBody {
    PublishBody {
        messages: vec![PubsubMessage {
            data: STANDARD.encode(data),
        }],
    }
}

#[async_trait]
impl Publisher for PubSubPublisher {
    async fn publish(&self, topic_path: &str, data: Vec<u8>) -> Result<String, CloudError> {
        let url = format!(
            "{}/v1/{topic_path}:publish",
            self.client.endpoints().pubsub.trim_end_matches('/')
        );
        let request = self.client.post(&url).json(&publish_body(&data));
        let response: PublishResponse = self.client.send_json(request, topic_path).await?;

        response.message_ids.into_iter().next().ok_or_else(|| {
            CloudError::Response(format!("publish to {topic_path} returned no message id"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_data_is_base64_encoded() {
        let body = serde_json::to_value(publish_body(br#"{"persist":false}"#)).expect("serializes");
        let encoded = body["messages"][0]["data"].as_str().expect("string data");
        assert_eq!(STANDARD.decode(encoded).expect("decodes"), br#"{"persist":false}"#);
    }

    #[test]
    fn publish_response_reads_message_ids() {
        let response: PublishResponse =
            serde_json::from_str(r#"{"messageIds":["1234567890"]}"#).expect("parses");
        assert_eq!(response.message_ids, vec!["1234567890".to_string()]);
    }
}
