use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::config::GcpConfig;
use crate::error::ProviderError;
use crate::llm::{
    ChatModel, ModelCompletion, ModelMessage, ModelToolCall, ModelToolChoice, ModelToolDefinition,
    ModelUsage,
};

const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// How requests are addressed and authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoogleAuth {
    /// Gemini API with an API key.
    ApiKey(String),
    /// Vertex AI publisher model with an OAuth bearer token.
    Vertex {
        project_id: String,
        location: String,
        access_token: String,
    },
}

#[derive(Debug, Clone)]
pub struct GoogleModelConfig {
    pub auth: GoogleAuth,
    pub model: String,
    pub api_base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl GoogleModelConfig {
    pub fn new(auth: GoogleAuth, model: impl Into<String>) -> Self {
        Self {
            auth,
            model: model.into(),
            api_base_url: None,
            temperature: Some(0.2),
            max_output_tokens: Some(8192),
        }
    }

    /// Picks Vertex AI or the Gemini API the same way the rest of the process
    /// resolves its settings.
    pub fn from_gcp(config: &GcpConfig) -> Result<Self, ProviderError> {
        let auth = if config.use_vertex_ai {
            let project_id = config.project_id.clone().ok_or_else(|| {
                ProviderError::Request("Vertex AI requires a GCP project ID".to_string())
            })?;
            let access_token = config.access_token.clone().ok_or_else(|| {
                ProviderError::Request("GOOGLE_OAUTH_ACCESS_TOKEN is not set".to_string())
            })?;
            GoogleAuth::Vertex {
                project_id,
                location: config.model_location.clone(),
                access_token,
            }
        } else {
            let api_key = config.api_key.clone().ok_or_else(|| {
                ProviderError::Request("GOOGLE_API_KEY (or GEMINI_API_KEY) is not set".to_string())
            })?;
            GoogleAuth::ApiKey(api_key)
        };
        Ok(Self::new(auth, config.model.clone()))
    }

    fn endpoint(&self) -> String {
        let model = &self.model;
        match (&self.auth, self.api_base_url.as_deref()) {
            (GoogleAuth::ApiKey(_), base) => {
                let base = base.unwrap_or(GEMINI_API_BASE_URL).trim_end_matches('/');
                format!("{base}/models/{model}:generateContent")
            }
            (
                GoogleAuth::Vertex {
                    project_id,
                    location,
                    ..
                },
                base,
            ) => {
                let host = match base {
                    Some(base) => base.trim_end_matches('/').to_string(),
                    None if location == "global" => "https://aiplatform.googleapis.com".to_string(),
                    None => format!("https://{location}-aiplatform.googleapis.com"),
                };
                format!(
                    "{host}/v1/projects/{project_id}/locations/{location}/publishers/google/models/{model}:generateContent"
                )
            }
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            GoogleAuth::ApiKey(key) => request.header("x-goog-api-key", key),
            GoogleAuth::Vertex { access_token, .. } => request.bearer_auth(access_token),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoogleModel {
    client: Client,
    config: GoogleModelConfig,
}

impl GoogleModel {
    pub fn new(config: GoogleModelConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .build()
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn from_gcp(config: &GcpConfig) -> Result<Self, ProviderError> {
        Self::new(GoogleModelConfig::from_gcp(config)?)
    }

    pub fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl ChatModel for GoogleModel {
    async fn invoke(
        &self,
        messages: &[ModelMessage],
        tools: &[ModelToolDefinition],
        tool_choice: ModelToolChoice,
    ) -> Result<ModelCompletion, ProviderError> {
        let request = build_request(messages, tools, tool_choice, &self.config);
        debug!(model = %self.config.model, turns = request.contents.len(), "generateContent");

        let response = self
            .config
            .authorize(self.client.post(self.config.endpoint()))
            .json(&request)
            .send()
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Request(describe_api_error(status, &body)));
        }

        let payload = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|err| ProviderError::Response(err.to_string()))?;

        normalize_response(payload)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<Value>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct FunctionCall {
    // Vertex rejects ids on requests; only read them from responses.
    #[serde(default, skip_serializing)]
    id: Option<String>,
    name: Option<String>,
    args: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    thoughts_token_count: Option<u32>,
}

fn build_request(
    messages: &[ModelMessage],
    tools: &[ModelToolDefinition],
    tool_choice: ModelToolChoice,
    config: &GoogleModelConfig,
) -> GenerateContentRequest {
    let mut system_lines = Vec::new();
    let mut contents = Vec::new();

    for message in messages {
        match message {
            ModelMessage::System(text) if !text.is_empty() => system_lines.push(text.clone()),
            ModelMessage::System(_) => {}
            ModelMessage::User(text) if !text.is_empty() => contents.push(Content {
                role: "user".to_string(),
                parts: vec![Part::text(text.clone())],
            }),
            ModelMessage::User(_) => {}
            ModelMessage::Assistant {
                content,
                tool_calls,
            } => {
                let text_part = content
                    .as_ref()
                    .filter(|text| !text.is_empty())
                    .map(|text| Part::text(text.clone()));
                let call_parts = tool_calls.iter().map(|call| Part {
                    function_call: Some(FunctionCall {
                        id: None,
                        name: Some(call.name.clone()),
                        args: Some(call.arguments.clone()),
                    }),
                    ..Part::default()
                });
                let parts = text_part.into_iter().chain(call_parts).collect::<Vec<_>>();
                if !parts.is_empty() {
                    contents.push(Content {
                        role: "model".to_string(),
                        parts,
                    });
                }
            }
            ModelMessage::ToolResult {
                tool_name,
                content,
                is_error,
                ..
            } => contents.push(Content {
                role: "user".to_string(),
                parts: vec![Part {
                    function_response: Some(FunctionResponse {
                        name: tool_name.clone(),
                        response: tool_result_payload(content, *is_error),
                    }),
                    ..Part::default()
                }],
            }),
        }
    }

    let system_instruction = (!system_lines.is_empty()).then(|| Content {
        role: String::new(),
        parts: vec![Part::text(system_lines.join("\n\n"))],
    });

    let declarations = tools
        .iter()
        .map(|tool| FunctionDeclaration {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: gemini_schema(tool.parameters.clone()),
        })
        .collect::<Vec<_>>();

    let tool_config = (!declarations.is_empty()).then(|| {
        let (mode, allowed) = match tool_choice {
            ModelToolChoice::Auto => ("AUTO", None),
            ModelToolChoice::Required => ("ANY", None),
            ModelToolChoice::None => ("NONE", None),
            ModelToolChoice::Tool(name) => ("ANY", Some(vec![name])),
        };
        let mut calling = json!({"mode": mode});
        if let Some(allowed) = allowed {
            calling["allowedFunctionNames"] = json!(allowed);
        }
        json!({"functionCallingConfig": calling})
    });

    GenerateContentRequest {
        contents,
        system_instruction,
        tools: if declarations.is_empty() {
            Vec::new()
        } else {
            vec![ToolDeclarations {
                function_declarations: declarations,
            }]
        },
        tool_config,
        generation_config: GenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        },
    }
}

// Function responses must be JSON objects.
fn tool_result_payload(content: &str, is_error: bool) -> Value {
    if is_error {
        return json!({"error": content});
    }
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(other) => json!({"result": other}),
        Err(_) => json!({"result": content}),
    }
}

fn normalize_response(response: GenerateContentResponse) -> Result<ModelCompletion, ProviderError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ProviderError::Response(
            "google response missing candidates".to_string(),
        ));
    };

    let mut completion = ModelCompletion::default();
    let mut text_parts = Vec::new();
    let mut thinking_parts = Vec::new();

    let parts = candidate.content.map(|content| content.parts).unwrap_or_default();
    if parts.is_empty() {
        if let Some(reason) = candidate.finish_reason.filter(|reason| reason != "STOP") {
            return Err(ProviderError::Response(format!(
                "google candidate finished without content ({reason})"
            )));
        }
    }

    for (index, part) in parts.into_iter().enumerate() {
        match (part.text, part.thought.unwrap_or(false)) {
            (Some(text), true) => thinking_parts.push(text),
            (Some(text), false) => text_parts.push(text),
            (None, _) => {}
        }

        if let Some(call) = part.function_call {
            let name = call.name.ok_or_else(|| {
                ProviderError::Response("google functionCall missing name".to_string())
            })?;
            completion.tool_calls.push(ModelToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{}", index + 1)),
                name,
                arguments: call.args.unwrap_or_else(|| json!({})),
            });
        }
    }

    completion.text = (!text_parts.is_empty()).then(|| text_parts.join("\n"));
    completion.thinking = (!thinking_parts.is_empty()).then(|| thinking_parts.join("\n"));
    completion.usage = response.usage_metadata.map(|usage| ModelUsage {
        input_tokens: usage.prompt_token_count.unwrap_or(0),
        output_tokens: usage
            .candidates_token_count
            .unwrap_or(0)
            .saturating_add(usage.thoughts_token_count.unwrap_or(0)),
    });

    Ok(completion)
}

fn describe_api_error(status: reqwest::StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(str::to_string));
    match message {
        Some(message) => format!("google api error {}: {message}", status.as_u16()),
        None if body.is_empty() => format!("google api request failed ({status})"),
        None => format!("google api request failed ({status}): {body}"),
    }
}

/// Strips the JSON-schema keywords the function-declaration schema subset rejects.
fn gemini_schema(schema: Value) -> Value {
    match schema {
        Value::Object(map) => {
            let cleaned = map
                .into_iter()
                .filter(|(key, value)| {
                    !matches!(key.as_str(), "additionalProperties" | "default" | "$schema")
                        && !(key == "required" && value.as_array().is_some_and(Vec::is_empty))
                })
                .map(|(key, value)| (key, gemini_schema(value)))
                .collect::<Map<_, _>>();
            Value::Object(cleaned)
        }
        Value::Array(values) => Value::Array(values.into_iter().map(gemini_schema).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn vertex_config(location: &str) -> GoogleModelConfig {
        GoogleModelConfig::new(
            GoogleAuth::Vertex {
                project_id: "aisports".to_string(),
                location: location.to_string(),
                access_token: "token".to_string(),
            },
            "gemini-2.5-pro",
        )
    }

    #[test]
    fn endpoints_cover_gemini_api_and_vertex() {
        let gemini = GoogleModelConfig::new(GoogleAuth::ApiKey("k".into()), "gemini-2.5-flash");
        assert_eq!(
            gemini.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            vertex_config("global").endpoint(),
            "https://aiplatform.googleapis.com/v1/projects/aisports/locations/global/publishers/google/models/gemini-2.5-pro:generateContent"
        );
        assert!(
            vertex_config("us-central1")
                .endpoint()
                .starts_with("https://us-central1-aiplatform.googleapis.com/v1/projects/aisports/locations/us-central1/")
        );
    }

    #[test]
    fn config_from_gcp_requires_credentials_for_selected_backend() {
        let config = GcpConfig::default().with_project_id("aisports");
        assert!(GoogleModelConfig::from_gcp(&config).is_err());

        let mut config = config;
        config.access_token = Some("ya29.token".to_string());
        let model = GoogleModelConfig::from_gcp(&config).expect("vertex config");
        assert!(matches!(model.auth, GoogleAuth::Vertex { .. }));
        assert_eq!(model.model, "gemini-2.5-pro");

        config.use_vertex_ai = false;
        config.api_key = Some("key".to_string());
        let model = GoogleModelConfig::from_gcp(&config).expect("api key config");
        assert_eq!(model.auth, GoogleAuth::ApiKey("key".to_string()));
    }

    #[test]
    fn build_request_serializes_history_and_tools() {
        let messages = vec![
            ModelMessage::System("You are the testing agent".to_string()),
            ModelMessage::User("Verify the merger".to_string()),
            ModelMessage::Assistant {
                content: Some("Triggering".to_string()),
                tool_calls: vec![ModelToolCall {
                    id: "call_1".to_string(),
                    name: "trigger_scraper_pipeline".to_string(),
                    arguments: json!({}),
                }],
            },
            ModelMessage::ToolResult {
                tool_call_id: "call_1".to_string(),
                tool_name: "trigger_scraper_pipeline".to_string(),
                content: "1234".to_string(),
                is_error: false,
            },
            ModelMessage::ToolResult {
                tool_call_id: "call_2".to_string(),
                tool_name: "list_gcs_objects".to_string(),
                content: "[{\"name\":\"a\"}]".to_string(),
                is_error: false,
            },
        ];
        let tools = vec![ModelToolDefinition {
            name: "list_gcs_objects".to_string(),
            description: "List objects".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"limit": {"type": "integer", "minimum": 0, "default": 20}},
                "required": [],
                "additionalProperties": false
            }),
        }];

        let request = build_request(
            &messages,
            &tools,
            ModelToolChoice::Tool("list_gcs_objects".to_string()),
            &vertex_config("global"),
        );
        let value = serde_json::to_value(request).expect("serializes");

        assert_eq!(
            value["systemInstruction"]["parts"][0]["text"],
            "You are the testing agent"
        );
        assert!(value["systemInstruction"].get("role").is_none());
        assert_eq!(value["contents"][1]["role"], "model");
        let call = &value["contents"][1]["parts"][1]["functionCall"];
        assert_eq!(call["name"], "trigger_scraper_pipeline");
        assert!(call.get("id").is_none());
        assert_eq!(
            value["contents"][2]["parts"][0]["functionResponse"]["response"]["result"],
            1234
        );
        assert_eq!(
            value["contents"][3]["parts"][0]["functionResponse"]["response"]["result"][0]["name"],
            "a"
        );
        assert_eq!(value["toolConfig"]["functionCallingConfig"]["mode"], "ANY");
        assert_eq!(
            value["toolConfig"]["functionCallingConfig"]["allowedFunctionNames"][0],
            "list_gcs_objects"
        );
        let parameters = &value["tools"][0]["functionDeclarations"][0]["parameters"];
        assert!(parameters.get("additionalProperties").is_none());
        assert!(parameters.get("required").is_none());
        assert!(parameters["properties"]["limit"].get("default").is_none());
        assert_eq!(parameters["properties"]["limit"]["minimum"], 0);
    }

    #[test]
    fn normalize_response_extracts_text_thinking_calls_and_usage() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "checking logs"},
                        {"text": "merger ran at 10:02", "thought": true},
                        {"functionCall": {"name": "query_function_logs", "args": {"function_name": "result-merger"}}}
                    ]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 11, "candidatesTokenCount": 7, "thoughtsTokenCount": 3}
        }))
        .expect("parses");

        let completion = normalize_response(response).expect("normalizes");
        assert_eq!(completion.text.as_deref(), Some("checking logs"));
        assert_eq!(completion.thinking.as_deref(), Some("merger ran at 10:02"));
        assert_eq!(completion.tool_calls[0].name, "query_function_logs");
        assert_eq!(completion.tool_calls[0].id, "call_3");
        assert_eq!(
            completion.usage,
            Some(ModelUsage {
                input_tokens: 11,
                output_tokens: 10,
            })
        );
    }

    #[test]
    fn normalize_response_rejects_empty_or_blocked_candidates() {
        let err = normalize_response(GenerateContentResponse {
            candidates: Vec::new(),
            usage_metadata: None,
        })
        .expect_err("should fail");
        assert!(err.to_string().contains("missing candidates"));

        let blocked: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .expect("parses");
        let err = normalize_response(blocked).expect_err("should fail");
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn api_errors_prefer_google_message() {
        let message = describe_api_error(
            reqwest::StatusCode::FORBIDDEN,
            r#"{"error":{"code":403,"message":"Permission denied on resource project"}}"#,
        );
        assert_eq!(message, "google api error 403: Permission denied on resource project");
    }
}
