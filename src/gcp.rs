//! Authenticated JSON transport shared by the Google Cloud backends.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::GcpConfig;
use crate::error::CloudError;

pub const STORAGE_BASE_URL: &str = "https://storage.googleapis.com";
pub const LOGGING_BASE_URL: &str = "https://logging.googleapis.com";
pub const PUBSUB_BASE_URL: &str = "https://pubsub.googleapis.com";
pub const FUNCTIONS_BASE_URL: &str = "https://cloudfunctions.googleapis.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpEndpoints {
    pub storage: String,
    pub logging: String,
    pub pubsub: String,
    pub functions: String,
}

impl Default for GcpEndpoints {
    fn default() -> Self {
        Self {
            storage: STORAGE_BASE_URL.to_string(),
            logging: LOGGING_BASE_URL.to_string(),
            pubsub: PUBSUB_BASE_URL.to_string(),
            functions: FUNCTIONS_BASE_URL.to_string(),
        }
    }
}

/// A reqwest client paired with the bearer token and service base URLs.
#[derive(Debug, Clone)]
pub struct GcpClient {
    http: Client,
    access_token: Option<String>,
    endpoints: GcpEndpoints,
}

impl GcpClient {
    pub fn new(access_token: Option<String>, endpoints: GcpEndpoints) -> Result<Self, CloudError> {
        let http = Client::builder()
            .build()
            .map_err(|err| CloudError::Request(err.to_string()))?;

        Ok(Self {
            http,
            access_token,
            endpoints,
        })
    }

    pub fn from_config(config: &GcpConfig) -> Result<Self, CloudError> {
        Self::new(config.access_token.clone(), GcpEndpoints::default())
    }

    pub fn endpoints(&self) -> &GcpEndpoints {
        &self.endpoints
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.authorize(self.http.get(url))
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.authorize(self.http.post(url))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends the request and decodes a JSON body. `resource` names the target in
    /// not-found errors.
    pub async fn send_json<T>(&self, request: RequestBuilder, resource: &str) -> Result<T, CloudError>
    where
        T: DeserializeOwned,
    {
        let response = self.send(request, resource).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| CloudError::Response(err.to_string()))
    }

    pub async fn send_text(&self, request: RequestBuilder, resource: &str) -> Result<String, CloudError> {
        let response = self.send(request, resource).await?;
        response
            .text()
            .await
            .map_err(|err| CloudError::Response(err.to_string()))
    }

    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Response, CloudError> {
        let response = request
            .send()
            .await
            .map_err(|err| CloudError::Request(err.to_string()))?;

        let status = response.status();
        debug!(%status, resource, "google api response");

        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body, resource))
    }
}

/// Maps a non-success status to an error. Only 404 is classified; everything
/// else keeps the service's own status and message.
fn classify_failure(status: StatusCode, body: &str, resource: &str) -> CloudError {
    if status == StatusCode::NOT_FOUND {
        CloudError::NotFound(resource.to_string())
    } else {
        api_error_from_body(status, body)
    }
}

#[derive(Debug, Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleApiError,
}

#[derive(Debug, Deserialize)]
struct GoogleApiError {
    code: Option<u16>,
    status: Option<String>,
    message: Option<String>,
}

fn api_error_from_body(status: StatusCode, body: &str) -> CloudError {
    if let Ok(parsed) = serde_json::from_str::<GoogleErrorEnvelope>(body) {
        let code = parsed.error.code.unwrap_or(status.as_u16());
        let status_name = parsed
            .error
            .status
            .unwrap_or_else(|| status.to_string().to_uppercase());
        let message = parsed
            .error
            .message
            .unwrap_or_else(|| "unknown google api error".to_string());
        return CloudError::Api {
            status: code,
            message: format!("{status_name}: {message}"),
        };
    }

    CloudError::Api {
        status: status.as_u16(),
        message: if body.is_empty() {
            status.to_string()
        } else {
            body.to_string()
        },
    }
}
