//! Completion engine - the model backend that produces agent turns
//!
//! An engine keeps one conversation thread per agent and answers a prompt on
//! that thread with a stream of text fragments. [`AzureOpenAiEngine`] talks to
//! an Azure OpenAI chat deployment over server-sent events and runs any tool
//! calls the model makes against the agent's tool bridge before the final
//! text reaches the caller.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::agent::AgentProfile;
use crate::bridge::{ToolBridge, ToolSpec};
use crate::config::CompletionConfig;
use crate::error::{Result, WayfarerError};
use crate::role::AgentRole;
use crate::tools::ToolCapability;

/// Tool-call round trips allowed inside one agent turn
pub const MAX_TOOL_ROUNDS: usize = 5;

/// Single-pass stream of text fragments making up one assistant turn
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Handle to an engine-side conversation thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(Uuid);

impl ThreadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread_{}", self.0.simple())
    }
}

/// Backend capable of answering prompts on persistent per-agent threads
#[async_trait]
pub trait CompletionEngine: Send + Sync {
    /// Open the thread an agent keeps for the whole session
    async fn open_thread(&self, profile: &AgentProfile) -> Result<ThreadId>;

    /// Submit `prompt` on `thread` and stream the reply
    async fn stream_turn(&self, thread: ThreadId, prompt: String) -> Result<FragmentStream>;

    /// Release the thread and anything the engine holds for it
    async fn close_thread(&self, thread: ThreadId) -> Result<()>;
}

// ──────────────────────────────────────────────────────────────────────────────
// Wire types
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    fn tool_request(content: String, calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: (!content.is_empty()).then_some(content),
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    fn tool_result(call_id: &str, output: String) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(output),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: FunctionCall,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Reassembles tool calls streamed as indexed fragments
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    calls: BTreeMap<usize, ToolCall>,
}

impl ToolCallAccumulator {
    fn push(&mut self, delta: ToolCallDelta) {
        let call = self.calls.entry(delta.index).or_insert_with(|| ToolCall {
            id: String::new(),
            kind: "function".to_string(),
            function: FunctionCall::default(),
        });
        if let Some(id) = delta.id {
            call.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                call.function.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                call.function.arguments.push_str(&arguments);
            }
        }
    }

    fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_values()
            .filter(|call| !call.function.name.is_empty())
            .collect()
    }
}

/// Splits a server-sent event byte stream into `data:` payloads
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes, returning every complete `data:` payload
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\r', '\n']);
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Azure OpenAI
// ──────────────────────────────────────────────────────────────────────────────

/// A bridge tool as offered to one thread
#[derive(Clone)]
struct BoundTool {
    spec: ToolSpec,
    bridge: Arc<ToolBridge>,
}

struct ThreadState {
    role: AgentRole,
    messages: Vec<ChatMessage>,
    tools: Vec<BoundTool>,
}

#[derive(Clone)]
struct ChatClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl ChatClient {
    async fn post(
        &self,
        role: AgentRole,
        messages: &[ChatMessage],
        tools: &[BoundTool],
    ) -> Result<reqwest::Response> {
        let mut body = json!({
            "messages": messages,
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tool_definitions(tools.iter().map(|t| &t.spec)));
        }

        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| WayfarerError::dispatch(role, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(WayfarerError::dispatch(
                role,
                format!("status {}: {}", status, detail),
            ));
        }
        Ok(response)
    }
}

/// Function-tool definitions for the chat completions `tools` field
fn tool_definitions<'a>(specs: impl Iterator<Item = &'a ToolSpec>) -> Vec<Value> {
    specs
        .map(|spec| {
            json!({
                "type": "function",
                "function": {
                    "name": spec.name,
                    "description": spec.description.clone().unwrap_or_default(),
                    "parameters": spec.input_schema,
                },
            })
        })
        .collect()
}

struct ConnectedBridge {
    bridge: Arc<ToolBridge>,
    tools: Vec<ToolSpec>,
}

/// Streams chat completions from an Azure OpenAI deployment.
///
/// Threads are kept client-side: each one holds the agent's system
/// instructions, every completed exchange on it, and the bridge tools the
/// agent may call. Bridges are launched once and shared between threads.
pub struct AzureOpenAiEngine {
    http: ChatClient,
    threads: Arc<Mutex<HashMap<ThreadId, ThreadState>>>,
    bridges: tokio::sync::Mutex<HashMap<String, ConnectedBridge>>,
}

impl AzureOpenAiEngine {
    pub fn new(config: CompletionConfig) -> Self {
        Self {
            http: ChatClient {
                client: reqwest::Client::new(),
                url: completions_url(&config),
                api_key: config.api_key,
            },
            threads: Arc::new(Mutex::new(HashMap::new())),
            bridges: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Use a preconfigured HTTP client
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http.client = client;
        self
    }

    /// Register an already-connected bridge under its name. Capabilities with
    /// that name reuse it instead of launching a server.
    pub async fn attach_bridge(&self, bridge: Arc<ToolBridge>) -> Result<usize> {
        let tools = bridge.list_tools().await?;
        let count = tools.len();
        self.bridges.lock().await.insert(
            bridge.name().to_string(),
            ConnectedBridge { bridge, tools },
        );
        Ok(count)
    }

    async fn bind_tools(&self, capabilities: &[ToolCapability]) -> Result<Vec<BoundTool>> {
        let mut bound = Vec::new();
        let mut bridges = self.bridges.lock().await;
        for capability in capabilities {
            if !bridges.contains_key(capability.name()) {
                let bridge = Arc::new(ToolBridge::spawn(capability).await?);
                let tools = bridge.list_tools().await?;
                info!(bridge = %capability.name(), tools = tools.len(), "Tool bridge ready");
                bridges.insert(
                    capability.name().to_string(),
                    ConnectedBridge { bridge, tools },
                );
            }
            if let Some(connected) = bridges.get(capability.name()) {
                bound.extend(connected.tools.iter().map(|spec| BoundTool {
                    spec: spec.clone(),
                    bridge: Arc::clone(&connected.bridge),
                }));
            }
        }
        Ok(bound)
    }
}

fn completions_url(config: &CompletionConfig) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        config.endpoint.trim_end_matches('/'),
        config.deployment,
        config.api_version,
    )
}

#[async_trait]
impl CompletionEngine for AzureOpenAiEngine {
    async fn open_thread(&self, profile: &AgentProfile) -> Result<ThreadId> {
        let tools = self.bind_tools(&profile.tools).await?;
        let id = ThreadId::new();
        let names: Vec<&str> = tools.iter().map(|t| t.spec.name.as_str()).collect();
        debug!(thread = %id, role = %profile.role, tools = ?names, "Opening thread");

        self.threads.lock().insert(
            id,
            ThreadState {
                role: profile.role,
                messages: vec![ChatMessage::text("system", profile.instructions.clone())],
                tools,
            },
        );
        Ok(id)
    }

    #[instrument(skip(self, prompt))]
    async fn stream_turn(&self, thread: ThreadId, prompt: String) -> Result<FragmentStream> {
        let (role, mut messages, tools) = {
            let threads = self.threads.lock();
            let state = threads.get(&thread).ok_or_else(|| {
                WayfarerError::Configuration(format!("unknown thread {}", thread))
            })?;
            (state.role, state.messages.clone(), state.tools.clone())
        };
        messages.push(ChatMessage::text("user", prompt));

        let response = self.http.post(role, &messages, &tools).await?;

        let (tx, rx) = mpsc::channel::<Result<String>>(32);
        let turn = ToolTurn {
            role,
            http: self.http.clone(),
            tools,
            tx,
        };
        let threads = Arc::clone(&self.threads);

        tokio::spawn(async move {
            match turn.run(response, messages).await {
                Ok(Some(exchange)) => {
                    if let Some(state) = threads.lock().get_mut(&thread) {
                        state.messages.extend(exchange);
                    }
                }
                // Consumer went away; the exchange is not committed
                Ok(None) => {}
                Err(e) => {
                    let _ = turn.tx.send(Err(e)).await;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn close_thread(&self, thread: ThreadId) -> Result<()> {
        if self.threads.lock().remove(&thread).is_some() {
            debug!(thread = %thread, "Closed thread");
        }
        Ok(())
    }
}

/// What one streamed completion produced
struct RoundOutcome {
    text: String,
    calls: Vec<ToolCall>,
}

/// One agent turn, including any tool-call rounds
struct ToolTurn {
    role: AgentRole,
    http: ChatClient,
    tools: Vec<BoundTool>,
    tx: mpsc::Sender<Result<String>>,
}

impl ToolTurn {
    /// Drive the turn to its final text. Returns the messages to append to
    /// the thread, starting with the user prompt, or `None` if the consumer
    /// dropped the stream.
    async fn run(
        &self,
        mut response: reqwest::Response,
        mut messages: Vec<ChatMessage>,
    ) -> Result<Option<Vec<ChatMessage>>> {
        let start = messages.len() - 1;
        let mut rounds = 0;

        loop {
            let Some(outcome) = self.read_round(response).await? else {
                return Ok(None);
            };
            if outcome.calls.is_empty() {
                messages.push(ChatMessage::text("assistant", outcome.text));
                return Ok(Some(messages.split_off(start)));
            }

            rounds += 1;
            if rounds > MAX_TOOL_ROUNDS {
                return Err(WayfarerError::dispatch(
                    self.role,
                    format!("gave up after {} tool call rounds", MAX_TOOL_ROUNDS),
                ));
            }

            let calls = outcome.calls;
            messages.push(ChatMessage::tool_request(outcome.text, calls.clone()));
            for call in &calls {
                let output = self.invoke(call).await;
                messages.push(ChatMessage::tool_result(&call.id, output));
            }
            response = self.http.post(self.role, &messages, &self.tools).await?;
        }
    }

    async fn read_round(&self, response: reqwest::Response) -> Result<Option<RoundOutcome>> {
        let mut bytes = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut text = String::new();
        let mut calls = ToolCallAccumulator::default();

        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| WayfarerError::dispatch(self.role, e.to_string()))?;
            for payload in decoder.push(&chunk) {
                if payload == "[DONE]" {
                    break 'read;
                }
                let parsed: ChatChunk = match serde_json::from_str(&payload) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!(error = %e, "Skipping malformed completion chunk");
                        continue;
                    }
                };
                for delta in parsed.choices.into_iter().filter_map(|c| c.delta) {
                    delta.tool_calls.into_iter().for_each(|d| calls.push(d));
                    let Some(content) = delta.content.filter(|c| !c.is_empty()) else {
                        continue;
                    };
                    text.push_str(&content);
                    if self.tx.send(Ok(content)).await.is_err() {
                        return Ok(None);
                    }
                }
            }
        }

        Ok(Some(RoundOutcome {
            text,
            calls: calls.finish(),
        }))
    }

    /// Run one tool call. Failures become text for the model.
    async fn invoke(&self, call: &ToolCall) -> String {
        let Some(tool) = self.tools.iter().find(|t| t.spec.name == call.function.name) else {
            warn!(role = %self.role, tool = %call.function.name, "Model called an unknown tool");
            return format!("Unknown tool: {}", call.function.name);
        };
        let arguments: Value = if call.function.arguments.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str(&call.function.arguments) {
                Ok(arguments) => arguments,
                Err(e) => return format!("Invalid arguments for {}: {}", call.function.name, e),
            }
        };

        info!(role = %self.role, tool = %call.function.name, "Calling bridge tool");
        match tool.bridge.call_tool(&call.function.name, arguments).await {
            Ok(output) => output,
            Err(e) => {
                warn!(role = %self.role, error = %e, "Bridge tool call failed");
                format!("Tool call failed: {}", e)
            }
        }
    }
}
