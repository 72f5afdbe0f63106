//! JSON-RPC 2.0 envelopes and the subset of MCP messages the client uses.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{McpError, McpResult};

/// Protocol revision announced during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const JSONRPC_VERSION: &str = "2.0";

/// Method names used by the client.
pub mod methods {
    /// Opens a session.
    pub const INITIALIZE: &str = "initialize";
    /// Sent once the handshake response has been processed.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Lists server tools.
    pub const LIST_TOOLS: &str = "tools/list";
    /// Invokes a server tool.
    pub const CALL_TOOL: &str = "tools/call";
}

/// Outgoing request or notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl JsonRpcRequest {
    /// Creates a request expecting a response.
    #[must_use]
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Creates a notification (no id, no response).
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Returns the request id; `None` for notifications.
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Returns the method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the params object.
    #[must_use]
    pub fn params(&self) -> Option<&Value> {
        self.params.as_ref()
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
    /// Optional extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Incoming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    jsonrpc: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Successful response.
    #[must_use]
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Error response.
    #[must_use]
    pub fn failure(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: Some(id),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Returns the id this response answers.
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Converts the envelope into its result value.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Rpc`] for error responses and
    /// [`McpError::Protocol`] when neither field is present.
    pub fn into_result(self) -> McpResult<Value> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(McpError::Rpc {
                code: error.code,
                message: error.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(McpError::protocol("response carries neither result nor error")),
        }
    }
}

/// Parses one inbound line, returning `None` for server-initiated requests
/// and notifications.
///
/// # Errors
///
/// Returns [`McpError::Json`] when the line is not JSON.
pub fn parse_response(line: &str) -> McpResult<Option<JsonRpcResponse>> {
    let value: Value = serde_json::from_str(line)?;
    if value.get("method").is_some() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(value)?))
}

/// Params of the `initialize` request.
#[must_use]
pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": { "name": client_name, "version": client_version },
    })
}

/// Tool as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// JSON schema for the arguments.
    #[serde(default)]
    pub input_schema: Option<Value>,
}

/// Result of `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    /// Page of tools.
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    /// Cursor for the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// One item of a tool result's `content` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    /// Plain text.
    Text {
        /// Text payload.
        text: String,
    },
    /// Base64 image.
    Image {
        /// Base64 data.
        data: String,
        /// MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Embedded resource.
    Resource {
        /// Resource body as sent by the server.
        resource: Value,
    },
}

/// Result of `tools/call`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content items in server order.
    #[serde(default)]
    pub content: Vec<ContentItem>,
    /// Structured output, when the tool declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    /// Set when the tool itself failed.
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Renders the first content item: text verbatim, anything else as JSON.
    /// Falls back to the structured content, then to an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Json`] if a non-text item cannot be serialised.
    pub fn first_text(&self) -> McpResult<String> {
        match self.content.first() {
            Some(ContentItem::Text { text }) => Ok(text.clone()),
            Some(other) => Ok(serde_json::to_string(other)?),
            None => match &self.structured_content {
                Some(value) => Ok(serde_json::to_string(value)?),
                None => Ok(String::new()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialises_without_empty_fields() {
        let note = JsonRpcRequest::notification(methods::INITIALIZED, None);
        assert_eq!(
            serde_json::to_string(&note).unwrap(),
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#
        );

        let call = JsonRpcRequest::new(7, methods::CALL_TOOL, Some(json!({"name": "echo"})));
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["params"]["name"], "echo");
    }

    #[test]
    fn parse_response_skips_server_messages() {
        let log = r#"{"jsonrpc":"2.0","method":"notifications/message","params":{}}"#;
        assert!(parse_response(log).unwrap().is_none());

        let ok = parse_response(r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(ok.id(), Some(3));
        assert!(ok.into_result().is_ok());

        let err = parse_response(r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32601,"message":"nope"}}"#)
            .unwrap()
            .unwrap()
            .into_result()
            .unwrap_err();
        assert!(matches!(err, McpError::Rpc { code: -32601, .. }));

        assert!(parse_response("not json").is_err());
    }

    #[test]
    fn first_text_prefers_text_items() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "hello"}, {"type": "text", "text": "ignored"}]
        }))
        .unwrap();
        assert_eq!(result.first_text().unwrap(), "hello");

        let image: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "image", "data": "AA==", "mimeType": "image/png"}]
        }))
        .unwrap();
        assert_eq!(
            image.first_text().unwrap(),
            r#"{"type":"image","data":"AA==","mimeType":"image/png"}"#
        );

        let structured: CallToolResult =
            serde_json::from_value(json!({"content": [], "structuredContent": {"n": 1}})).unwrap();
        assert_eq!(structured.first_text().unwrap(), r#"{"n":1}"#);
        assert_eq!(CallToolResult::default().first_text().unwrap(), "");
    }
}
