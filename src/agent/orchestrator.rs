//! The bounded tool-calling loop between the model and the MCP session

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::schema::tool_declaration;
use super::transcript::Transcript;
use super::types::{AgentAnswer, AgentConfig, AgentResult, ToolCallRecord};
use super::virtual_tools::VirtualToolSet;
use crate::llm::{Backend, FunctionCall, FunctionDeclaration, FunctionResponse, LlmResponse};
use crate::mcp::protocol::{Prompt, Resource, ResourceTemplate, Tool};
use crate::mcp::{McpError, McpOperations, McpResult, McpSession};

/// What the server offers, as seen by the loop
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    pub tools: Vec<Tool>,
    pub resources: Vec<Resource>,
    pub templates: Vec<ResourceTemplate>,
    pub prompts: Vec<Prompt>,
}

impl ToolCatalog {
    /// Fetch every catalog from a connected session.
    ///
    /// Tools are required. Servers that do not implement the resource or
    /// prompt listings just contribute nothing for them.
    pub async fn from_session(session: &McpSession) -> McpResult<Self> {
        let tools = session.list_tools().await?;
        let resources = optional(session.list_resources().await, "resources/list")?;
        let mut templates = optional(
            session.list_resource_templates().await,
            "resources/templates/list",
        )?;
        let prompts = optional(session.list_prompts().await, "prompts/list")?;

        for resource in resources.iter().filter(|r| r.is_template()) {
            if !templates.iter().any(|t| t.uri_template == resource.uri) {
                templates.push(ResourceTemplate::from(resource));
            }
        }

        Ok(Self {
            tools,
            resources,
            templates,
            prompts,
        })
    }
}

fn optional<T: Default>(result: McpResult<T>, method: &str) -> McpResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e @ (McpError::Protocol(_) | McpError::RequestTimeout)) => {
            debug!("{} unavailable: {}", method, e);
            Ok(T::default())
        }
        Err(e) => Err(e),
    }
}

/// Drives one prompt to a final answer
pub struct Orchestrator {
    backend: Arc<dyn Backend>,
    session: Arc<dyn McpOperations>,
    config: AgentConfig,
    tools: Vec<Tool>,
    virtual_tools: VirtualToolSet,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn Backend>,
        session: Arc<dyn McpOperations>,
        catalog: ToolCatalog,
        config: AgentConfig,
    ) -> Self {
        let virtual_tools = if config.virtual_tools {
            let reserved: Vec<&str> = catalog.tools.iter().map(|t| t.name.as_str()).collect();
            VirtualToolSet::build(
                &reserved,
                &catalog.resources,
                &catalog.templates,
                &catalog.prompts,
                true,
            )
        } else {
            VirtualToolSet::default()
        };

        Self {
            backend,
            session,
            config,
            tools: catalog.tools,
            virtual_tools,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Declared tools followed by virtual ones
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.tools
            .iter()
            .map(tool_declaration)
            .chain(self.virtual_tools.declarations())
            .collect()
    }

    /// Run the loop for one user prompt.
    ///
    /// Individual tool failures are fed back to the model. Session-level
    /// MCP failures and model errors end the loop with an error.
    pub async fn ask(&self, prompt: &str) -> AgentResult<AgentAnswer> {
        let declarations = self.declarations();
        let max_rounds = self.config.max_rounds;
        let mut transcript = Transcript::new(prompt);
        let mut records = Vec::new();

        info!(
            "Asking {} with {} tool declarations",
            self.backend.model(),
            declarations.len()
        );
        let mut reply = self.send(&transcript, &declarations, max_rounds == 0).await?;
        let mut round_trips = 1;
        let mut round = 0;

        while reply.has_function_calls() && round < max_rounds {
            round += 1;
            let calls: Vec<FunctionCall> = reply.function_calls().into_iter().cloned().collect();
            debug!("Round {}: {} function call(s)", round, calls.len());

            let mut responses = Vec::with_capacity(calls.len());
            for call in calls {
                let response = self.execute(&call).await?;
                records.push(ToolCallRecord {
                    round,
                    name: call.name.clone(),
                    arguments: call.args.clone(),
                    response: response.clone(),
                });
                responses.push(FunctionResponse {
                    name: call.name,
                    response,
                });
            }
            transcript.push_round(&reply, responses);

            // The request after the last budgeted round offers no tools
            let last = round == max_rounds;
            reply = self.send(&transcript, &declarations, last).await?;
            round_trips += 1;
        }

        if reply.has_function_calls() {
            warn!(
                "Tool budget of {} round(s) spent; returning the last reply as-is",
                max_rounds
            );
        }

        Ok(AgentAnswer {
            text: reply.text(),
            tool_calls: records,
            round_trips,
            final_reply: reply,
        })
    }

    async fn send(
        &self,
        transcript: &Transcript,
        declarations: &[FunctionDeclaration],
        without_tools: bool,
    ) -> AgentResult<LlmResponse> {
        let tools = if without_tools { &[][..] } else { declarations };
        Ok(self.backend.generate(transcript.turns(), tools).await?)
    }

    /// Run one call and build the payload fed back to the model
    async fn execute(&self, call: &FunctionCall) -> AgentResult<Value> {
        let arguments = match &call.args {
            Value::Null => json!({}),
            args => args.clone(),
        };

        let outcome = if self.tools.iter().any(|t| t.name == call.name) {
            self.session.call_tool(&call.name, arguments).await
        } else if let Some(tool) = self.virtual_tools.find(&call.name) {
            tool.invoke(self.session.as_ref(), &arguments).await
        } else {
            Err(McpError::ToolInvocation(format!("Unknown tool: {}", call.name)))
        };

        match outcome {
            Ok(Value::Object(result)) => Ok(Value::Object(result)),
            Ok(other) => Ok(json!({ "result": other })),
            Err(e) if e.is_session_level() => Err(e.into()),
            Err(e) => {
                warn!("Tool {} failed: {}", call.name, e);
                Ok(json!({ "error": error_message(&e) }))
            }
        }
    }
}

/// The message the model sees for a failed call
fn error_message(error: &McpError) -> String {
    match error {
        McpError::ToolInvocation(message)
        | McpError::Protocol(message)
        | McpError::Transport(message) => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentError;
    use crate::llm::{async_trait, LlmError, Part, Role, Turn};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies and records what it was sent
    struct ScriptedModel {
        replies: Mutex<VecDeque<LlmResponse>>,
        requests: Mutex<Vec<(Vec<Turn>, usize)>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<LlmResponse>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<(Vec<Turn>, usize)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Backend for ScriptedModel {
        async fn generate(
            &self,
            contents: &[Turn],
            tools: &[FunctionDeclaration],
        ) -> Result<LlmResponse, LlmError> {
            self.requests
                .lock()
                .unwrap()
                .push((contents.to_vec(), tools.len()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::Api("script exhausted".to_string()))
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-1"
        }
    }

    type ToolHandler = Box<dyn Fn(&str, &Value) -> McpResult<Value> + Send + Sync>;

    struct FakeSession {
        handler: ToolHandler,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl FakeSession {
        fn new(handler: impl Fn(&str, &Value) -> McpResult<Value> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl McpOperations for FakeSession {
        async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<Value> {
            self.calls.lock().unwrap().push((name.to_string(), arguments.clone()));
            (self.handler)(name, &arguments)
        }

        async fn read_resource(&self, uri: &str) -> McpResult<Value> {
            self.calls.lock().unwrap().push((uri.to_string(), Value::Null));
            (self.handler)(uri, &Value::Null)
        }

        async fn get_prompt(&self, name: &str, arguments: Value) -> McpResult<Value> {
            self.calls.lock().unwrap().push((name.to_string(), arguments.clone()));
            (self.handler)(name, &arguments)
        }
    }

    fn forecast_tool() -> Tool {
        Tool {
            name: "get_weather_forecast".to_string(),
            description: "Forecast for coordinates".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "latitude": {"type": "number"},
                    "longitude": {"type": "number"}
                },
                "required": ["latitude", "longitude"]
            }),
        }
    }

    fn catalog() -> ToolCatalog {
        ToolCatalog {
            tools: vec![forecast_tool()],
            ..ToolCatalog::default()
        }
    }

    fn call(name: &str, args: Value) -> LlmResponse {
        LlmResponse {
            parts: vec![Part::FunctionCall(FunctionCall {
                name: name.to_string(),
                args,
            })],
            usage: None,
            finish_reason: Some("STOP".to_string()),
        }
    }

    fn forecast_call() -> LlmResponse {
        call(
            "get_weather_forecast",
            json!({"latitude": 41.8, "longitude": -71.4}),
        )
    }

    fn orchestrator(
        model: Arc<ScriptedModel>,
        session: Arc<FakeSession>,
        config: AgentConfig,
    ) -> Orchestrator {
        Orchestrator::new(model, session, catalog(), config)
    }

    /// The function responses sent in the last request
    fn last_responses(model: &ScriptedModel) -> Vec<FunctionResponse> {
        let requests = model.requests();
        let (turns, _) = requests.last().unwrap();
        turns
            .last()
            .unwrap()
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::FunctionResponse(response) => Some(response.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_plain_reply_needs_no_tools() {
        let model = ScriptedModel::new(vec![LlmResponse::text_only("It is sunny.")]);
        let session = FakeSession::new(|_, _| panic!("no tool should run"));
        let agent = orchestrator(model.clone(), session.clone(), AgentConfig::default());

        let answer = agent.ask("Weather?").await.unwrap();

        assert_eq!(answer.text, "It is sunny.");
        assert!(answer.tool_calls.is_empty());
        assert_eq!(answer.round_trips, 1);
        assert!(session.calls().is_empty());
    }

    #[tokio::test]
    async fn test_single_tool_round() {
        let model = ScriptedModel::new(vec![
            forecast_call(),
            LlmResponse::text_only("Clear skies in Providence."),
        ]);
        let session = FakeSession::new(|_, _| Ok(json!({"forecast": "Clear"})));
        let agent = orchestrator(model.clone(), session.clone(), AgentConfig::default());

        let answer = agent.ask("Weather in Providence?").await.unwrap();

        assert_eq!(answer.text, "Clear skies in Providence.");
        assert_eq!(answer.tool_calls.len(), 1);
        assert_eq!(answer.round_trips, 2);
        assert_eq!(
            session.calls(),
            vec![(
                "get_weather_forecast".to_string(),
                json!({"latitude": 41.8, "longitude": -71.4})
            )]
        );

        let requests = model.requests();
        let (turns, tools) = &requests[1];
        // The forecast tool plus the three built-in resource proxies
        assert_eq!(*tools, 4);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].role, Role::Model);
        assert_eq!(
            last_responses(&model),
            vec![FunctionResponse {
                name: "get_weather_forecast".to_string(),
                response: json!({"forecast": "Clear"}),
            }]
        );
    }

    #[tokio::test]
    async fn test_tool_failure_is_fed_back() {
        let model = ScriptedModel::new(vec![
            forecast_call(),
            LlmResponse::text_only("The forecast service is down."),
        ]);
        let session =
            FakeSession::new(|_, _| Err(McpError::ToolInvocation("upstream unavailable".to_string())));
        let agent = orchestrator(model.clone(), session, AgentConfig::default());

        let answer = agent.ask("Weather?").await.unwrap();

        assert_eq!(answer.text, "The forecast service is down.");
        assert!(answer.tool_calls[0].failed());
        assert_eq!(
            last_responses(&model)[0].response,
            json!({"error": "upstream unavailable"})
        );
    }

    #[tokio::test]
    async fn test_budget_ends_with_tool_free_request() {
        let replies = (0..7).map(|_| forecast_call()).collect();
        let model = ScriptedModel::new(replies);
        let session = FakeSession::new(|_, _| Ok(json!({"forecast": "Clear"})));
        let agent = orchestrator(model.clone(), session.clone(), AgentConfig::default());

        let answer = agent.ask("Weather?").await.unwrap();

        assert_eq!(answer.round_trips, 6);
        assert_eq!(answer.tool_calls.len(), 5);
        assert_eq!(session.calls().len(), 5);
        assert_eq!(answer.final_reply, forecast_call());

        let tool_counts: Vec<usize> = model.requests().iter().map(|(_, n)| *n).collect();
        assert_eq!(tool_counts, vec![4, 4, 4, 4, 4, 0]);
    }

    #[tokio::test]
    async fn test_zero_budget_returns_first_reply() {
        let model = ScriptedModel::new(vec![forecast_call()]);
        let session = FakeSession::new(|_, _| panic!("no tool should run"));
        let config = AgentConfig {
            max_rounds: 0,
            ..AgentConfig::default()
        };
        let agent = orchestrator(model.clone(), session, config);

        let answer = agent.ask("Weather?").await.unwrap();

        assert_eq!(answer.round_trips, 1);
        assert!(answer.tool_calls.is_empty());
        assert_eq!(model.requests()[0].1, 0);
    }

    #[tokio::test]
    async fn test_session_closed_aborts_loop() {
        let model = ScriptedModel::new(vec![forecast_call(), LlmResponse::text_only("unused")]);
        let session = FakeSession::new(|_, _| Err(McpError::SessionClosed));
        let agent = orchestrator(model.clone(), session, AgentConfig::default());

        let err = agent.ask("Weather?").await.unwrap_err();

        assert!(matches!(err, AgentError::Session(McpError::SessionClosed)));
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_and_virtual_tools() {
        let model = ScriptedModel::new(vec![
            LlmResponse {
                parts: vec![
                    Part::FunctionCall(FunctionCall {
                        name: "teleport".to_string(),
                        args: json!({}),
                    }),
                    Part::FunctionCall(FunctionCall {
                        name: "read_animal_facts".to_string(),
                        args: json!({"species": "dolphin", "category": "diet"}),
                    }),
                ],
                usage: None,
                finish_reason: None,
            },
            LlmResponse::text_only("Dolphins eat fish."),
        ]);
        let session = FakeSession::new(|_, _| Ok(json!({"contents": [{"text": "fish"}]})));
        let agent = orchestrator(model.clone(), session.clone(), AgentConfig::default());

        let answer = agent.ask("What do dolphins eat?").await.unwrap();

        assert_eq!(answer.text, "Dolphins eat fish.");
        let responses = last_responses(&model);
        assert_eq!(responses[0].response, json!({"error": "Unknown tool: teleport"}));
        assert_eq!(responses[1].response, json!({"contents": [{"text": "fish"}]}));
        assert_eq!(
            session.calls(),
            vec![("animal://facts/dolphin/diet".to_string(), Value::Null)]
        );
    }

    #[tokio::test]
    async fn test_model_errors_abort() {
        let model = ScriptedModel::new(vec![]);
        let session = FakeSession::new(|_, _| Ok(json!({})));
        let agent = orchestrator(model, session, AgentConfig::default());

        let err = agent.ask("Weather?").await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(LlmError::Api(_))));
    }

    #[test]
    fn test_virtual_tools_can_be_disabled() {
        let model = ScriptedModel::new(vec![]);
        let session = FakeSession::new(|_, _| Ok(json!({})));
        let config = AgentConfig {
            virtual_tools: false,
            ..AgentConfig::default()
        };
        let agent = orchestrator(model, session, config);
        let names: Vec<String> = agent.declarations().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["get_weather_forecast"]);
    }

    #[test]
    fn test_error_messages_drop_variant_prefix() {
        assert_eq!(
            error_message(&McpError::Protocol("bad".to_string())),
            "bad".to_string()
        );
        assert_eq!(error_message(&McpError::RequestTimeout), "Request timed out");
    }
}
