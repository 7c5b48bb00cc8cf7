//! Tool-call types and helpers for answering remote function calls.
//!
//! The session only transports calls and results. Executing a call is the
//! caller's business; these helpers make sure every failure still turns into
//! a result the remote model can read.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::LiveError;

/// A function the remote model may call, advertised in the setup frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the arguments.
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
}

impl FunctionDeclaration {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// One function call requested by the remote model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// Answer to one [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    pub response: Value,
}

impl ToolResult {
    pub fn success(call: &ToolCall, response: Value) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response,
        }
    }

    /// Wrap a failure as `{ "error": message }`.
    pub fn failure(call: &ToolCall, message: impl std::fmt::Display) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: json!({ "error": message.to_string() }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.response.get("error").is_some()
    }
}

/// Executes tool calls on behalf of the session's caller.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, name: &str, args: &Value) -> Result<Value, LiveError>;
}

type ToolFn =
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value, LiveError>> + Send>> + Send + Sync;

/// Closure-based [`ToolHandler`] keyed by function name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<ToolFn>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `name`, replacing any previous one.
    pub fn register<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, LiveError>> + Send + 'static,
    {
        self.tools
            .insert(name.into(), Arc::new(move |args| Box::pin(handler(args))));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

#[async_trait]
impl ToolHandler for ToolRegistry {
    async fn call(&self, name: &str, args: &Value) -> Result<Value, LiveError> {
        let handler = self
            .tools
            .get(name)
            .cloned()
            .ok_or_else(|| LiveError::tool(name, "Unknown function"))?;
        handler(args.clone()).await
    }
}

/// Run every call through `handler`, keeping request order.
///
/// Failures become error-carrying results instead of aborting the turn.
pub async fn resolve_tool_calls<H>(handler: &H, calls: &[ToolCall]) -> Vec<ToolResult>
where
    H: ToolHandler + ?Sized,
{
    let pending = calls.iter().map(|call| async move {
        match handler.call(&call.name, &call.args).await {
            Ok(response) => ToolResult::success(call, response),
            Err(error) => {
                tracing::debug!(tool = %call.name, error = %error, "tool call failed");
                let message = match error {
                    LiveError::ToolExecution { message, .. } => message,
                    other => other.to_string(),
                };
                ToolResult::failure(call, message)
            }
        }
    });
    futures::future::join_all(pending).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    #[tokio::test]
    async fn results_follow_request_order() {
        let registry = ToolRegistry::new()
            .register("get_spending_summary", |args| async move {
                Ok(json!({ "total": 120.5, "range": args }))
            })
            .register("get_recent_receipts", |_args| async move {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                Ok(json!({ "receipts": [] }))
            });

        let calls = vec![
            call("a", "get_recent_receipts", json!({ "limit": 3 })),
            call("b", "get_spending_summary", json!({})),
        ];
        let results = resolve_tool_calls(&registry, &calls).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[0].response, json!({ "receipts": [] }));
        assert_eq!(results[1].id, "b");
        assert_eq!(results[1].response["total"], 120.5);
    }

    #[tokio::test]
    async fn unknown_function_becomes_error_result() {
        let registry = ToolRegistry::new();
        let results = resolve_tool_calls(&registry, &[call("x", "nope", Value::Null)]).await;
        assert_eq!(results[0].response, json!({ "error": "Unknown function" }));
        assert!(results[0].is_error());
    }

    #[tokio::test]
    async fn handler_failure_is_wrapped_not_propagated() {
        let registry = ToolRegistry::new().register("flaky", |_args| async move {
            Err(LiveError::tool("flaky", "datastore offline"))
        });
        let results = resolve_tool_calls(&registry, &[call("1", "flaky", json!({}))]).await;
        assert_eq!(results[0].name, "flaky");
        assert_eq!(results[0].response["error"], "datastore offline");
    }
}
