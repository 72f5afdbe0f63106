//! Mapping of command nodes onto tool calls.

use std::collections::BTreeMap;

use devins_lang::{Node, UsedKind, UsedNode};
use devins_mcp::McpToolInfo;
use devins_primitives::{CallKind, CallOrigin};
use devins_tools::{CONTENT_PARAM, ToolHandle, ToolMetadata};
use serde_json::Value;

/// Parameter receiving the `:value` of a tool that names no primary parameter.
pub const DEFAULT_ARG_PARAM: &str = "input";

/// Where a command is executed.
pub(crate) enum Target {
    Builtin(ToolHandle),
    Remote(McpToolInfo),
    Unknown,
}

/// Parameters extracted from a command node.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Invocation {
    pub(crate) params: BTreeMap<String, String>,
    /// The attached code block was taken as the tool's content.
    pub(crate) body_consumed: bool,
}

pub(crate) fn origin(used: &UsedNode) -> CallOrigin {
    let kind = match used.kind {
        UsedKind::Command => CallKind::Command,
        UsedKind::Agent => CallKind::Agent,
    };
    CallOrigin::new(kind, used.span.line, used.span.column)
}

pub(crate) fn builtin_invocation(metadata: &ToolMetadata, used: &UsedNode) -> Invocation {
    let mut invocation = Invocation::default();
    if let Some(value) = command_value(used) {
        let key = metadata.primary_param().unwrap_or(DEFAULT_ARG_PARAM);
        invocation.params.insert(key.to_owned(), value.to_owned());
    }
    if metadata.accepts_body() {
        attach_body(used, &mut invocation);
    }
    invocation
}

/// MCP tools always receive an attached body. A `:value` written as a JSON
/// object supplies named arguments; any other value fills the schema's first
/// required (or declared) property.
pub(crate) fn remote_invocation(info: &McpToolInfo, used: &UsedNode) -> Invocation {
    let mut invocation = Invocation::default();
    if let Some(value) = command_value(used) {
        match serde_json::from_str::<Value>(value) {
            Ok(Value::Object(members)) => {
                for (key, member) in members {
                    let text = match member {
                        Value::String(text) => text,
                        other => other.to_string(),
                    };
                    invocation.params.insert(key, text);
                }
            }
            _ => {
                let key =
                    primary_property(info.input_schema.as_ref()).unwrap_or(DEFAULT_ARG_PARAM);
                invocation.params.insert(key.to_owned(), value.to_owned());
            }
        }
    }
    attach_body(used, &mut invocation);
    invocation
}

/// Text emitted after a command's output: its attached body, unless a tool
/// consumed it.
pub(crate) fn trailing_source(used: &UsedNode, invocation: &Invocation) -> String {
    if invocation.body_consumed {
        return String::new();
    }
    used.children.iter().map(Node::to_source).collect()
}

pub(crate) fn denial_marker(tool: &str, reason: &str) -> String {
    format!("<PolicyDenied tool=\"{tool}\">{reason}</PolicyDenied>")
}

fn command_value(used: &UsedNode) -> Option<&str> {
    used.raw_args.as_deref().filter(|value| !value.is_empty())
}

/// Whether the command's code block is still open, as in a partially
/// streamed document.
pub(crate) fn body_unterminated(used: &UsedNode) -> bool {
    used.body().is_some_and(|body| !body.terminated)
}

fn attach_body(used: &UsedNode, invocation: &mut Invocation) {
    if let Some(body) = used.body().filter(|body| body.terminated) {
        invocation
            .params
            .insert(CONTENT_PARAM.to_owned(), body.content.clone());
        invocation.body_consumed = true;
    }
}

fn primary_property(schema: Option<&Value>) -> Option<&str> {
    let schema = schema?;
    schema
        .get("required")
        .and_then(Value::as_array)
        .and_then(|required| required.first())
        .and_then(Value::as_str)
        .or_else(|| {
            schema
                .get("properties")
                .and_then(Value::as_object)
                .and_then(|properties| properties.keys().next())
                .map(String::as_str)
        })
}

#[cfg(test)]
mod tests {
    use devins_lang::parse;
    use serde_json::json;

    use super::*;

    fn first_used(source: &str) -> UsedNode {
        parse(source)
            .document
            .children()
            .iter()
            .find_map(|node| match node {
                Node::Used(used) => Some(used.clone()),
                _ => None,
            })
            .unwrap()
    }

    fn remote(schema: Option<Value>) -> McpToolInfo {
        McpToolInfo {
            name: "search".into(),
            description: String::new(),
            server_name: "docs".into(),
            input_schema: schema,
            enabled: true,
        }
    }

    #[test]
    fn builtin_value_fills_primary_param() {
        let metadata = ToolMetadata::new("read-file", "Read")
            .unwrap()
            .with_primary_param("path");
        let used = first_used("/read-file:src/lib.rs#L1-L3 please");
        let invocation = builtin_invocation(&metadata, &used);
        assert_eq!(invocation.params["path"], "src/lib.rs#L1-L3");
        assert!(!invocation.body_consumed);
    }

    #[test]
    fn body_is_consumed_only_when_accepted() {
        let source = "/write-file:a.txt\n```\nhello\n```\n";
        let used = first_used(source);

        let writer = ToolMetadata::new("write-file", "Write")
            .unwrap()
            .with_primary_param("path")
            .accepting_body();
        let invocation = builtin_invocation(&writer, &used);
        assert_eq!(invocation.params[CONTENT_PARAM], "hello\n");
        assert!(trailing_source(&used, &invocation).is_empty());

        let reader = ToolMetadata::new("read-file", "Read")
            .unwrap()
            .with_primary_param("path");
        let invocation = builtin_invocation(&reader, &used);
        assert!(!invocation.params.contains_key(CONTENT_PARAM));
        assert_eq!(trailing_source(&used, &invocation), "\n```\nhello\n```");
    }

    #[test]
    fn open_body_is_never_attached() {
        let used = first_used("/write-file:a.txt\n```\npartial");
        assert!(body_unterminated(&used));

        let writer = ToolMetadata::new("write-file", "Write")
            .unwrap()
            .with_primary_param("path")
            .accepting_body();
        let invocation = builtin_invocation(&writer, &used);
        assert!(!invocation.params.contains_key(CONTENT_PARAM));
        assert!(!invocation.body_consumed);
        assert_eq!(trailing_source(&used, &invocation), "\n```\npartial");

        assert!(!body_unterminated(&first_used("/write-file:a.txt\n```\ndone\n```")));
    }

    #[test]
    fn empty_value_sets_no_param() {
        let metadata = ToolMetadata::new("read-file", "Read")
            .unwrap()
            .with_primary_param("path");
        let invocation = builtin_invocation(&metadata, &first_used("/read-file: x"));
        assert!(invocation.params.is_empty());
    }

    #[test]
    fn remote_value_targets_schema_property() {
        let schema = json!({
            "type": "object",
            "properties": {"limit": {}, "query": {}},
            "required": ["query"]
        });
        let used = first_used("/docs.search:tokio");
        let invocation = remote_invocation(&remote(Some(schema)), &used);
        assert_eq!(invocation.params["query"], "tokio");

        let invocation = remote_invocation(&remote(None), &first_used("/search:tokio"));
        assert_eq!(invocation.params[DEFAULT_ARG_PARAM], "tokio");
    }

    #[test]
    fn remote_json_value_supplies_named_arguments() {
        let used = first_used(r#"/search:{"query":"tokio","limit":3}"#);
        let invocation = remote_invocation(&remote(None), &used);
        assert_eq!(invocation.params["query"], "tokio");
        assert_eq!(invocation.params["limit"], "3");
    }

    #[test]
    fn origin_records_position() {
        let used = first_used("line one\n  /shell:ls");
        let origin = origin(&used);
        assert_eq!(origin.kind(), CallKind::Command);
        assert_eq!((origin.line(), origin.column()), (2, 3));
    }

    #[test]
    fn denial_marker_format() {
        assert_eq!(
            denial_marker("shell", "blocked"),
            r#"<PolicyDenied tool="shell">blocked</PolicyDenied>"#
        );
    }
}
