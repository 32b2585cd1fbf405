use clap::{Args, Subcommand};
use serde_json::{Map, Value, json};
use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

mod error;
mod gateway;
mod session;
mod tools;
mod util;

pub use error::ToolError;
pub use gateway::{GatewayCall, GatewayClient, SuccessBody, classify_response};
pub use session::{GatewaySession, SessionStore};
pub use tools::{GatewayTools, ToolDefinition, tool_definitions};

use util::to_pretty_json;

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const MCP_SERVER_NAME: &str = "webmethods-mcp";

#[derive(Subcommand)]
pub enum McpCommands {
    /// Run the API Gateway MCP server over stdio
    Serve(McpServeArgs),
    /// Print the tool catalog as JSON
    Tools,
}

#[derive(Args, Clone, Debug, Default)]
pub struct McpServeArgs {
    /// Accept invalid TLS certificates from the gateway (self-signed on-prem installs)
    #[arg(long)]
    pub insecure: bool,
}

pub async fn run(command: McpCommands) -> i32 {
    match command {
        McpCommands::Serve(args) => {
            let gateway = if args.insecure {
                match util::insecure_client() {
                    Ok(http) => GatewayClient::new(http),
                    Err(err) => {
                        report_fatal(&err.to_string());
                        return 1;
                    }
                }
            } else {
                GatewayClient::default()
            };
            let server = McpServer::new(GatewayTools::new(SessionStore::new(), gateway));
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    report_fatal(&err);
                    1
                }
            }
        }
        McpCommands::Tools => {
            println!("{}", to_pretty_json(&tools_list_payload()));
            0
        }
    }
}

fn report_fatal(message: &str) {
    let payload = json!({
        "error": "mcp_server_error",
        "message": message,
    });
    eprintln!("{}", to_pretty_json(&payload));
}

/// How a message arrived on stdin; the reply is written the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One JSON value per line.
    Line,
    /// `Content-Length` headers, blank line, body.
    ContentLength,
}

pub struct McpServer {
    tools: GatewayTools,
}

impl McpServer {
    pub fn new(tools: GatewayTools) -> Self {
        Self { tools }
    }

    pub fn sessions(&self) -> &SessionStore {
        self.tools.sessions()
    }

    async fn serve_stdio(&self) -> Result<(), String> {
        tracing::info!(
            server = MCP_SERVER_NAME,
            version = env!("CARGO_PKG_VERSION"),
            "mcp server listening on stdio"
        );

        let mut reader = BufReader::new(io::stdin());
        let mut stdout = io::stdout();
        self.serve(&mut reader, &mut stdout).await?;

        tracing::info!("stdin closed, mcp server stopping");
        Ok(())
    }

    /// Answer messages from `reader` until EOF.
    ///
    /// A message that is not valid JSON gets a parse error reply and the loop
    /// keeps going; only I/O failures and broken headers end it.
    pub async fn serve<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<(), String>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let incoming = read_message(reader)
                .await
                .map_err(|e| format!("Failed to read MCP message: {e}"))?;
            let Some((parsed, framing)) = incoming else {
                return Ok(());
            };

            let responses = match parsed {
                Ok(incoming) => self.handle_incoming_message(incoming).await,
                Err(err) => {
                    tracing::warn!(error = %err, "discarding unparsable MCP message");
                    vec![error_response(Value::Null, RpcError::parse_error(&err))]
                }
            };
            for response in responses {
                write_message(writer, &response, framing)
                    .await
                    .map_err(|e| format!("Failed to write MCP response: {e}"))?;
            }
        }
    }

    pub async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; this server never sends requests of its own.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            tracing::debug!(method, "notification received");
            None
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        tracing::debug!(tool = name, "tools/call");
        Ok(match self.tools.execute(name, args).await {
            Ok(payload) => build_tool_call_response(payload, false),
            Err(err) => {
                tracing::debug!(tool = name, error = %err, code = err.code(), "tool call failed");
                build_tool_call_response(err.to_value(), true)
            }
        })
    }
}

fn initialize_payload() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "tools": {
                "listChanged": false
            },
            "resources": {
                "listChanged": false
            },
            "prompts": {
                "listChanged": false
            }
        },
        "serverInfo": {
            "name": MCP_SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        },
        "instructions": "Call set_credentials(base_url, username, password) first; every other tool fails with credentials_not_set until it has been called. Gateway errors come back as {error, details} with the HTTP status in 'error'."
    })
}

fn tools_list_payload() -> Value {
    let tools: Vec<Value> = tool_definitions()
        .into_iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema,
            })
        })
        .collect();
    json!({ "tools": tools })
}

fn build_tool_call_response(payload: Value, is_error: bool) -> Value {
    let mut response = json!({
        "content": [{ "type": "text", "text": to_pretty_json(&payload) }],
    });
    if payload.is_object() {
        response["structuredContent"] = payload;
    }
    if is_error {
        response["isError"] = Value::Bool(true);
    }
    response
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn parse_error(err: &serde_json::Error) -> Self {
        Self {
            code: -32700,
            message: format!("Parse error: {err}"),
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

fn invalid_data(message: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.into())
}

/// A framed message whose body may or may not have been valid JSON.
pub type FramedMessage = (Result<Value, serde_json::Error>, Framing);

/// Read the next message, detecting its framing from the first line.
///
/// Returns `None` on a clean EOF between messages. A body that is not JSON
/// still comes back as a message so the caller can answer it.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<FramedMessage>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut in_headers = false;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            if !in_headers {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }

        let trimmed = line.trim();
        if !in_headers {
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                return Ok(Some((serde_json::from_str(trimmed), Framing::Line)));
            }
            in_headers = true;
        }

        if trimmed.is_empty() {
            break;
        }
        if trimmed.to_ascii_lowercase().starts_with("content-length:") {
            let raw_len = trimmed
                .split_once(':')
                .map(|(_, right)| right.trim())
                .unwrap_or_default();
            let parsed = raw_len
                .parse::<usize>()
                .map_err(|_| invalid_data("Invalid Content-Length header"))?;
            content_length = Some(parsed);
        }
    }

    let content_length =
        content_length.ok_or_else(|| invalid_data("Missing Content-Length header"))?;
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;

    Ok(Some((serde_json::from_slice(&payload), Framing::ContentLength)))
}

pub async fn write_message<W>(
    writer: &mut W,
    value: &Value,
    framing: Framing,
) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value)
        .map_err(|e| invalid_data(format!("Failed to serialize JSON: {e}")))?;
    match framing {
        Framing::Line => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
    }
    writer.flush().await?;
    Ok(())
}
