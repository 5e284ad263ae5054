//! Stdio MCP client session runtime for the amc coding client.
//!
//! Owns the transport subprocess lifecycle: spawn, initialize handshake,
//! tool catalog discovery, one bounded tools/call, and unconditional
//! teardown. Exactly one session runs per process invocation and its
//! operations are strictly sequential; there is no pipelining.

use std::{collections::BTreeMap, path::PathBuf, process::Stdio, time::Duration};

use serde_json::{json, Value};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    process::{Child, ChildStdin, ChildStdout, Command},
    time::timeout,
};
use tracing::{debug, warn};

pub const MCP_JSONRPC_VERSION: &str = "2.0";
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const INIT_REQUEST_ID: &str = "amc-client-init";
const TOOLS_LIST_REQUEST_ID: &str = "amc-client-tools-list";
const TOOLS_CALL_REQUEST_ID: &str = "amc-client-tools-call";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum McpSessionError {
    #[error("failed to spawn mcp server command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("mcp server handshake failed: {0}")]
    Handshake(String),
    #[error("mcp server transport failed: {0}")]
    Transport(String),
    #[error("mcp server protocol violation: {0}")]
    Protocol(String),
}

/// Launch parameters for the MCP server transport subprocess.
#[derive(Debug, Clone, Default)]
pub struct McpServerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

/// Session lifecycle state. Terminal failure states are sticky until
/// teardown moves the session back to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Initialized,
    ToolListing,
    Ready,
    ToolInvoking,
    Completed,
    TimedOut,
    Failed,
}

/// Public struct `ToolDescriptor` used across amc components.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// One unit of a tool-invocation response, tagged by kind. Non-text kinds
/// (images, embedded resources) are carried through unmodified so callers
/// can still inspect them.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    Text { text: String },
    Other(Value),
}

impl ContentItem {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentItem::Text { text } => Some(text),
            ContentItem::Other(_) => None,
        }
    }
}

/// Filtered view of the textual items, in original response order.
pub fn text_items(items: &[ContentItem]) -> Vec<&str> {
    items.iter().filter_map(ContentItem::as_text).collect()
}

/// Outcome of one bounded tool invocation. Transport-level failures are
/// reported through `McpSessionError` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallOutcome {
    Completed(Vec<ContentItem>),
    TimedOut { waited: Duration },
}

/// One live connection to an MCP server transport subprocess.
///
/// The child process handle is exclusively owned by the session and is
/// released on every exit path: `shutdown` reaps it and `kill_on_drop`
/// backstops early returns and panics.
pub struct McpSession {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Lines<BufReader<ChildStdout>>,
    state: SessionState,
    tools: Vec<ToolDescriptor>,
    initialize_result: Option<Value>,
}

impl McpSession {
    /// Spawn the transport subprocess with piped stdio. The session starts
    /// in `Connecting`; callers must `initialize` before anything else.
    pub fn spawn(config: &McpServerConfig) -> Result<Self, McpSessionError> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = config.cwd.as_ref() {
            command.current_dir(cwd);
        }
        for (key, value) in &config.env {
            command.env(key, value);
        }
        let mut child = command.spawn().map_err(|source| McpSessionError::Spawn {
            command: config.command.clone(),
            source,
        })?;
        let stdin = child.stdin.take().ok_or_else(|| {
            McpSessionError::Transport("failed to open stdin for mcp server".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            McpSessionError::Transport("failed to open stdout for mcp server".to_string())
        })?;
        Ok(Self {
            child,
            stdin: Some(stdin),
            lines: BufReader::new(stdout).lines(),
            state: SessionState::Connecting,
            tools: Vec::new(),
            initialize_result: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Tool catalog discovered by `list_tools`, in server order.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|tool| tool.name == name)
    }

    pub fn initialize_result(&self) -> Option<&Value> {
        self.initialize_result.as_ref()
    }

    /// Perform the initialize handshake. Failure here is fatal for the
    /// session and leaves it in `Failed`.
    pub async fn initialize(&mut self) -> Result<(), McpSessionError> {
        let exchanged = self.initialize_exchange().await;
        match exchanged {
            Ok(result) => {
                self.state = SessionState::Initialized;
                self.initialize_result = Some(result);
                Ok(())
            }
            Err(error) => {
                self.state = SessionState::Failed;
                Err(match error {
                    McpSessionError::Transport(message) | McpSessionError::Protocol(message) => {
                        McpSessionError::Handshake(message)
                    }
                    other => other,
                })
            }
        }
    }

    async fn initialize_exchange(&mut self) -> Result<Value, McpSessionError> {
        self.send_request(
            INIT_REQUEST_ID,
            "initialize",
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {"tools": {"listChanged": true}},
                "clientInfo": {
                    "name": "amc",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
        .await?;
        self.read_response(INIT_REQUEST_ID).await
    }

    /// Request the tool catalog. Catalog failures are non-fatal: the session
    /// logs a warning, keeps an empty catalog, and still advances to `Ready`.
    pub async fn list_tools(&mut self) -> &[ToolDescriptor] {
        self.state = SessionState::ToolListing;
        let exchanged = self.list_tools_exchange().await;
        match exchanged {
            Ok(tools) => {
                debug!("discovered {} mcp tool(s)", tools.len());
                self.tools = tools;
            }
            Err(error) => {
                warn!("mcp tool catalog discovery failed, continuing with empty catalog: {error}");
                self.tools = Vec::new();
            }
        }
        self.state = SessionState::Ready;
        &self.tools
    }

    async fn list_tools_exchange(&mut self) -> Result<Vec<ToolDescriptor>, McpSessionError> {
        self.send_request(TOOLS_LIST_REQUEST_ID, "tools/list", json!({}))
            .await?;
        let result = self.read_response(TOOLS_LIST_REQUEST_ID).await?;
        let tools_array = result
            .get("tools")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                McpSessionError::Protocol("invalid tools/list payload".to_string())
            })?;
        let mut tools = Vec::with_capacity(tools_array.len());
        for tool in tools_array {
            let name = tool
                .get("name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    McpSessionError::Protocol("tool descriptor missing name".to_string())
                })?
                .to_string();
            let description = tool
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let input_schema = tool
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| json!({"type": "object", "properties": {}}));
            tools.push(ToolDescriptor {
                name,
                description,
                input_schema,
            });
        }
        Ok(tools)
    }

    /// Invoke one named tool with a structured argument payload under a
    /// strictly positive deadline.
    ///
    /// On elapse the pending read is abandoned and any late response is
    /// never processed; the transport itself is not torn down by the
    /// timeout. An unknown tool name surfaces as a remote JSON-RPC error.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
        wait: Duration,
    ) -> Result<ToolCallOutcome, McpSessionError> {
        debug_assert!(wait > Duration::ZERO, "tool call deadline must be positive");
        self.state = SessionState::ToolInvoking;
        if let Err(error) = self
            .send_request(
                TOOLS_CALL_REQUEST_ID,
                "tools/call",
                json!({"name": name, "arguments": arguments}),
            )
            .await
        {
            self.state = SessionState::Failed;
            return Err(error);
        }
        let awaited = timeout(wait, self.read_response(TOOLS_CALL_REQUEST_ID)).await;
        match awaited {
            Ok(Ok(result)) => {
                self.state = SessionState::Completed;
                Ok(ToolCallOutcome::Completed(parse_content_items(&result)))
            }
            Ok(Err(error)) => {
                self.state = SessionState::Failed;
                Err(error)
            }
            Err(_elapsed) => {
                self.state = SessionState::TimedOut;
                Ok(ToolCallOutcome::TimedOut { waited: wait })
            }
        }
    }

    /// Graceful teardown, attempted on every exit path regardless of which
    /// branch the session took. Closes stdin, gives the server a short grace
    /// window to exit on its own, then force-terminates and reaps it. The
    /// session always ends in `Disconnected`.
    pub async fn shutdown(&mut self) -> Result<(), McpSessionError> {
        self.stdin.take();
        let graceful = timeout(SHUTDOWN_GRACE, self.child.wait()).await;
        let reaped = match graceful {
            Ok(waited) => waited.map(|_status| ()),
            Err(_elapsed) => {
                let _ = self.child.start_kill();
                self.child.wait().await.map(|_status| ())
            }
        };
        self.state = SessionState::Disconnected;
        reaped.map_err(|error| {
            McpSessionError::Transport(format!("failed to reap mcp server process: {error}"))
        })
    }

    async fn send_request(
        &mut self,
        id: &str,
        method: &str,
        params: Value,
    ) -> Result<(), McpSessionError> {
        let frame = json!({
            "jsonrpc": MCP_JSONRPC_VERSION,
            "id": id,
            "method": method,
            "params": params,
        });
        let mut line = frame.to_string();
        line.push('\n');
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            McpSessionError::Transport("mcp server stdin is already closed".to_string())
        })?;
        stdin.write_all(line.as_bytes()).await.map_err(|error| {
            McpSessionError::Transport(format!("failed to write '{method}' request: {error}"))
        })?;
        stdin.flush().await.map_err(|error| {
            McpSessionError::Transport(format!("failed to flush '{method}' request: {error}"))
        })
    }

    /// Read response lines until the one matching `id` arrives. Server
    /// notifications and unrelated frames are skipped.
    async fn read_response(&mut self, id: &str) -> Result<Value, McpSessionError> {
        loop {
            let line = self.lines.next_line().await.map_err(|error| {
                McpSessionError::Transport(format!("failed to read mcp server response: {error}"))
            })?;
            let Some(line) = line else {
                return Err(McpSessionError::Transport(
                    "mcp server closed stdout before responding".to_string(),
                ));
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let value = serde_json::from_str::<Value>(trimmed).map_err(|error| {
                McpSessionError::Protocol(format!(
                    "mcp server returned invalid JSON '{trimmed}': {error}"
                ))
            })?;
            if value.get("id").and_then(Value::as_str) != Some(id) {
                continue;
            }
            if let Some(error) = value.get("error") {
                let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown json-rpc error");
                return Err(McpSessionError::Protocol(format!(
                    "json-rpc error code={code} message={message}"
                )));
            }
            return value.get("result").cloned().ok_or_else(|| {
                McpSessionError::Protocol("response missing result object".to_string())
            });
        }
    }
}

/// Decode the heterogeneous `content` sequence of a tools/call result into
/// tagged items, preserving order. Items that are not well-formed text
/// content are kept as `Other` rather than dropped.
pub fn parse_content_items(result: &Value) -> Vec<ContentItem> {
    let Some(array) = result.get("content").and_then(Value::as_array) else {
        return Vec::new();
    };
    array
        .iter()
        .map(|item| {
            match (
                item.get("type").and_then(Value::as_str),
                item.get("text").and_then(Value::as_str),
            ) {
                (Some("text"), Some(text)) => ContentItem::Text {
                    text: text.to_string(),
                },
                _ => ContentItem::Other(item.clone()),
            }
        })
        .collect()
}
