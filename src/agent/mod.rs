//! Tool-calling loop that lets the model drive the pipeline tools and
//! returns its final report.

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::llm::{
    ChatModel, ModelCompletion, ModelMessage, ModelToolCall, ModelToolChoice, ModelToolDefinition,
    ModelUsage,
};
use crate::policy::{AGENT_DESCRIPTION, AGENT_NAME, TESTING_AGENT_INSTRUCTION, TestReport};
use crate::tools::{DependencyMap, ToolSpec};

pub const DEFAULT_MAX_ITERATIONS: u32 = 40;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub description: String,
    pub max_iterations: u32,
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: AGENT_NAME.to_string(),
            description: AGENT_DESCRIPTION.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_prompt: Some(TESTING_AGENT_INSTRUCTION.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Thinking {
        content: String,
    },
    Text {
        content: String,
    },
    ToolCall {
        tool: String,
        args_json: serde_json::Value,
        tool_call_id: String,
    },
    ToolResult {
        tool: String,
        result_text: String,
        tool_call_id: String,
        is_error: bool,
    },
    FinalResponse {
        content: String,
    },
}

#[derive(Default)]
pub struct AgentBuilder {
    model: Option<Arc<dyn ChatModel>>,
    tools: Vec<ToolSpec>,
    config: AgentConfig,
    dependencies: DependencyMap,
}

impl AgentBuilder {
    pub fn model<M>(mut self, model: M) -> Self
    where
        M: ChatModel + 'static,
    {
        self.model = Some(Arc::new(model));
        self
    }

    pub fn tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    pub fn dependency<T>(self, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.dependencies.insert(value);
        self
    }

    pub fn build(self) -> Result<Agent, AgentError> {
        let Some(model) = self.model else {
            return Err(AgentError::Config(
                "agent model must be configured via AgentBuilder::model(...)".to_string(),
            ));
        };

        let mut tool_map = HashMap::new();
        for tool in &self.tools {
            if tool_map
                .insert(tool.name().to_string(), tool.clone())
                .is_some()
            {
                return Err(AgentError::Config(format!(
                    "duplicate tool registered: {}",
                    tool.name()
                )));
            }
        }

        let definitions = self.tools.iter().map(ModelToolDefinition::from).collect();

        Ok(Agent {
            model,
            definitions,
            tool_map,
            config: self.config,
            dependencies: self.dependencies,
            history: Vec::new(),
            usage: ModelUsage::default(),
        })
    }
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    definitions: Vec<ModelToolDefinition>,
    tool_map: HashMap<String, ToolSpec>,
    config: AgentConfig,
    dependencies: DependencyMap,
    history: Vec<ModelMessage>,
    usage: ModelUsage,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn messages_len(&self) -> usize {
        self.history.len()
    }

    /// Token usage summed over every model call so far.
    pub fn usage(&self) -> ModelUsage {
        self.usage
    }

    /// Runs a test plan to completion and parses the verdict from the answer.
    pub async fn run(&mut self, test_plan: impl Into<String>) -> Result<TestReport, AgentError> {
        let content = self.query(test_plan).await?;
        let report = TestReport::from_content(content);
        info!(
            agent = %self.config.name,
            verdict = report.verdict.map(|v| v.as_str()).unwrap_or("NONE"),
            input_tokens = self.usage.input_tokens,
            output_tokens = self.usage.output_tokens,
            "test run finished"
        );
        Ok(report)
    }

    pub async fn query(&mut self, user_message: impl Into<String>) -> Result<String, AgentError> {
        let stream = self.query_stream(user_message);
        futures_util::pin_mut!(stream);

        let mut final_response: Option<String> = None;

        while let Some(event) = stream.next().await {
            if let AgentEvent::FinalResponse { content } = event? {
                final_response = Some(content);
            }
        }

        final_response.ok_or(AgentError::MissingFinalResponse)
    }

    pub fn query_stream(
        &mut self,
        user_message: impl Into<String>,
    ) -> impl Stream<Item = Result<AgentEvent, AgentError>> + '_ {
        let user_message = user_message.into();

        try_stream! {
            if self.history.is_empty() {
                if let Some(system_prompt) = &self.config.system_prompt {
                    self.history
                        .push(ModelMessage::System(system_prompt.clone()));
                }
            }

            self.history.push(ModelMessage::User(user_message));

            let tool_choice = if self.definitions.is_empty() {
                ModelToolChoice::None
            } else {
                ModelToolChoice::Auto
            };

            for iteration in 0..self.config.max_iterations {
                let completion = self
                    .model
                    .invoke(&self.history, &self.definitions, tool_choice.clone())
                    .await?;
                debug!(iteration, tool_calls = completion.tool_calls.len(), "model turn");

                if let Some(usage) = completion.usage {
                    self.usage += usage;
                }

                if let Some(thinking) = completion.thinking.clone() {
                    yield AgentEvent::Thinking { content: thinking };
                }

                self.append_assistant_message(&completion);

                if let Some(text) = completion.text.clone().filter(|text| !text.is_empty()) {
                    yield AgentEvent::Text { content: text };
                }

                if completion.tool_calls.is_empty() {
                    yield AgentEvent::FinalResponse {
                        content: completion.text.unwrap_or_default(),
                    };
                    return;
                }

                for tool_call in completion.tool_calls {
                    yield AgentEvent::ToolCall {
                        tool: tool_call.name.clone(),
                        args_json: tool_call.arguments.clone(),
                        tool_call_id: tool_call.id.clone(),
                    };

                    let (result_text, is_error) = self.execute_tool_call(&tool_call).await;
                    self.history.push(ModelMessage::ToolResult {
                        tool_call_id: tool_call.id.clone(),
                        tool_name: tool_call.name.clone(),
                        content: result_text.clone(),
                        is_error,
                    });

                    yield AgentEvent::ToolResult {
                        tool: tool_call.name,
                        result_text,
                        tool_call_id: tool_call.id,
                        is_error,
                    };
                }
            }

            Err::<(), AgentError>(AgentError::MaxIterationsReached {
                max_iterations: self.config.max_iterations,
            })?;
        }
    }

    fn append_assistant_message(&mut self, completion: &ModelCompletion) {
        self.history.push(ModelMessage::Assistant {
            content: completion.text.clone(),
            tool_calls: completion.tool_calls.clone(),
        });
    }

    /// Executes one call. Failures become error results for the model to weigh
    /// rather than aborting the run.
    async fn execute_tool_call(&self, tool_call: &ModelToolCall) -> (String, bool) {
        let Some(tool) = self.tool_map.get(&tool_call.name) else {
            warn!(tool = %tool_call.name, "model requested unknown tool");
            return (format!("Unknown tool '{}'.", tool_call.name), true);
        };

        match tool
            .execute(tool_call.arguments.clone(), &self.dependencies)
            .await
        {
            Ok(outcome) => (outcome.render(), false),
            Err(err) => {
                warn!(tool = %tool_call.name, error = %err, "tool call failed");
                (err.to_string(), true)
            }
        }
    }
}

pub async fn query(
    agent: &mut Agent,
    user_message: impl Into<String>,
) -> Result<String, AgentError> {
    agent.query(user_message).await
}

pub fn query_stream(
    agent: &mut Agent,
    user_message: impl Into<String>,
) -> impl Stream<Item = Result<AgentEvent, AgentError>> + '_ {
    agent.query_stream(user_message)
}
