//! Stdio tool bridge client
//!
//! Speaks newline-delimited JSON-RPC 2.0 to a tool server: an `initialize`
//! handshake, `tools/list`, then `tools/call` for each tool invocation the
//! model requests. One request is in flight at a time.

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, WayfarerError};
use crate::tools::ToolCapability;

const PROTOCOL_VERSION: &str = "2024-11-05";

/// A tool advertised by the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

type Reader = Box<dyn AsyncBufRead + Send + Unpin>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

struct Transport {
    reader: Reader,
    writer: Writer,
    next_id: u64,
}

impl Transport {
    async fn send_line(&mut self, value: &impl Serialize) -> Result<()> {
        let mut line = serde_json::to_string(value)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Connected tool server
pub struct ToolBridge {
    name: String,
    transport: Mutex<Transport>,
    child: parking_lot::Mutex<Option<Child>>,
}

impl ToolBridge {
    /// Launch the server behind `capability` and complete the handshake
    #[instrument(skip(capability), fields(bridge = %capability.name()))]
    pub async fn spawn(capability: &ToolCapability) -> Result<Self> {
        let ToolCapability::StdioBridge {
            name,
            command,
            args,
        } = capability;

        info!(command = %command, args = ?args, "Spawning tool bridge");
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| bridge_error(name, format!("failed to launch {}: {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| bridge_error(name, "stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| bridge_error(name, "stdout not captured"))?;

        let bridge = Self::connect(name.clone(), BufReader::new(stdout), stdin).await?;
        *bridge.child.lock() = Some(child);
        Ok(bridge)
    }

    /// Handshake over an already-open transport
    pub async fn connect<R, W>(name: impl Into<String>, reader: R, writer: W) -> Result<Self>
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let bridge = Self {
            name: name.into(),
            transport: Mutex::new(Transport {
                reader: Box::new(reader),
                writer: Box::new(writer),
                next_id: 0,
            }),
            child: parking_lot::Mutex::new(None),
        };

        bridge
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                })),
            )
            .await?;
        bridge
            .transport
            .lock()
            .await
            .send_line(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
            .await?;

        debug!(bridge = %bridge.name, "Tool bridge initialised");
        Ok(bridge)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tools the server advertises
    pub async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        let result = self.request("tools/list", None).await?;
        let tools = result.get("tools").cloned().unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(tools)?)
    }

    /// Invoke `tool` and flatten its text content.
    ///
    /// A result flagged `isError` is returned as text so the model can react
    /// to it; only transport failures are errors.
    #[instrument(skip(self, arguments))]
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String> {
        let result = self
            .request("tools/call", Some(json!({ "name": tool, "arguments": arguments })))
            .await?;

        let text = result
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|block| block.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            warn!(bridge = %self.name, tool, "Tool reported an error");
            return Ok(format!("Tool error: {}", text));
        }
        Ok(text)
    }

    /// Stop the server process, if this bridge launched one
    pub fn shutdown(&self) {
        if let Some(mut child) = self.child.lock().take() {
            if let Err(e) = child.start_kill() {
                debug!(bridge = %self.name, error = %e, "Tool bridge already exited");
            }
        }
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let mut transport = self.transport.lock().await;
        transport.next_id += 1;
        let id = transport.next_id;

        transport
            .send_line(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .await?;

        let mut line = String::new();
        loop {
            line.clear();
            if transport.reader.read_line(&mut line).await? == 0 {
                return Err(bridge_error(&self.name, format!("closed while awaiting {}", method)));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let response: RpcResponse = match serde_json::from_str(trimmed) {
                Ok(response) => response,
                Err(e) => {
                    debug!(bridge = %self.name, error = %e, "Skipping non-JSON bridge output");
                    continue;
                }
            };
            // Notifications and stale replies carry no matching id
            if response.id.as_ref().and_then(Value::as_u64) != Some(id) {
                continue;
            }
            if let Some(error) = response.error {
                return Err(bridge_error(
                    &self.name,
                    format!("{} failed: {} (code {})", method, error.message, error.code),
                ));
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }
    }
}

impl Drop for ToolBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn bridge_error(name: &str, message: impl Into<String>) -> WayfarerError {
    WayfarerError::ToolBridge {
        name: name.to_string(),
        message: message.into(),
    }
}
