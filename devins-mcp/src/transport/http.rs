use std::fmt;

use async_trait::async_trait;
use hyper::body::to_bytes;
use hyper::header::{ACCEPT, CONTENT_TYPE};
use hyper::{Body, Request, Uri};
use tracing::debug;

use super::Transport;
use super::http_client::{HyperClient, https_client};
use crate::error::{McpError, McpResult};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, parse_response};

const SESSION_HEADER: &str = "mcp-session-id";
const EVENT_STREAM: &str = "text/event-stream";

/// Streamable-HTTP transport: every message is a POST to one endpoint; the
/// answer is either a JSON body or a short server-sent event stream.
pub struct HttpTransport {
    client: HyperClient,
    endpoint: Uri,
    session_id: Option<String>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

struct HttpReply {
    event_stream: bool,
    body: String,
}

impl HttpTransport {
    /// Creates a transport for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Transport`] if the URL cannot be parsed.
    pub fn new(url: &str) -> McpResult<Self> {
        let endpoint = url
            .parse::<Uri>()
            .map_err(|err| McpError::transport(format!("invalid MCP endpoint `{url}`: {err}")))?;
        if endpoint.scheme().is_none() {
            return Err(McpError::transport(format!(
                "MCP endpoint `{url}` needs an http or https scheme"
            )));
        }

        Ok(Self {
            client: https_client(),
            endpoint,
            session_id: None,
        })
    }

    /// Returns the session id assigned by the server, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    async fn post(&mut self, message: &JsonRpcRequest) -> McpResult<HttpReply> {
        let payload = serde_json::to_vec(message)?;
        let mut builder = Request::post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream");
        if let Some(session) = &self.session_id {
            builder = builder.header(SESSION_HEADER, session.as_str());
        }
        let request = builder
            .body(Body::from(payload))
            .map_err(|err| McpError::transport(format!("failed to build MCP request: {err}")))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|err| McpError::transport(format!("MCP request failed: {err}")))?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            self.session_id = Some(session.to_owned());
        }
        let status = response.status();
        let event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with(EVENT_STREAM));
        let bytes = to_bytes(response.into_body())
            .await
            .map_err(|err| McpError::transport(format!("failed to read MCP response: {err}")))?;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        if !status.is_success() {
            return Err(McpError::transport(format!(
                "MCP server returned {status}: {body}"
            )));
        }
        Ok(HttpReply { event_stream, body })
    }
}

/// Finds the response for `id` among the `data:` lines of an event stream.
fn response_from_events(body: &str, id: Option<u64>) -> Option<JsonRpcResponse> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| parse_response(data.trim()).ok().flatten())
        .find(|response| response.id() == id)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&mut self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        let reply = self.post(&request).await?;
        debug!(method = request.method(), bytes = reply.body.len(), "mcp http reply");

        if reply.event_stream {
            return response_from_events(&reply.body, request.id()).ok_or_else(|| {
                McpError::protocol(format!(
                    "event stream held no response for `{}`",
                    request.method()
                ))
            });
        }
        parse_response(&reply.body)?
            .ok_or_else(|| McpError::protocol("expected a response, got a server request"))
    }

    async fn notify(&mut self, notification: JsonRpcRequest) -> McpResult<()> {
        self.post(&notification).await.map(|_| ())
    }

    async fn close(&mut self) -> McpResult<()> {
        self.session_id = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_stream_yields_matching_response() {
        let body = "event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n\
                    event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"tools\":[]}}\n\n";

        let response = response_from_events(body, Some(2)).unwrap();
        assert_eq!(response.id(), Some(2));
        assert!(response_from_events(body, Some(3)).is_none());
    }

    #[test]
    fn rejects_relative_endpoints() {
        assert!(HttpTransport::new("localhost/mcp").is_err());
        assert!(HttpTransport::new("not a url").is_err());

        let transport = HttpTransport::new("http://127.0.0.1:3000/mcp").unwrap();
        assert!(transport.session_id().is_none());
    }
}
