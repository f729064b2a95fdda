//! Name-to-function resolution for assistant-initiated function calls.

use futures::{FutureExt, future::BoxFuture};
use openai_realtime_types::ToolDefinition;
use serde_json::{Value, json};
use std::{collections::HashMap, panic::AssertUnwindSafe};
use tracing::{info, warn};

/// A locally invocable function. Takes the decoded argument record.
pub type ToolFn = fn(Value) -> BoxFuture<'static, anyhow::Result<Value>>;

/// Outcome of one invocation attempt.
///
/// `output` is what gets returned to the agent; on failure it is
/// `{"error": <message>}` and `error` carries the same message.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionResult {
    pub output: Value,
    pub error: Option<String>,
}

impl FunctionResult {
    fn ok(output: Value) -> Self {
        Self {
            output,
            error: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            output: json!({ "error": message }),
            error: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Default)]
pub struct FunctionExecutor {
    functions: HashMap<String, ToolFn>,
}

impl FunctionExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, function: ToolFn) {
        self.functions.insert(name.into(), function);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Invokes `name` with `arguments`. Never fails: unknown names, errors and
    /// panics inside the function all become an error result.
    pub async fn execute(&self, name: &str, arguments: Value) -> FunctionResult {
        let Some(function) = self.functions.get(name).copied() else {
            let result = FunctionResult::failed(format!("Function '{name}' not found."));
            warn!(function = name, %arguments, "Function not found.");
            return result;
        };

        let call_args = arguments.clone();
        let outcome = AssertUnwindSafe(async move { function(call_args).await })
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(output)) => FunctionResult::ok(output),
            Ok(Err(e)) => {
                FunctionResult::failed(format!("Error executing function '{name}': {e}"))
            }
            Err(panic) => {
                let cause = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "function panicked".to_string());
                FunctionResult::failed(format!("Error executing function '{name}': {cause}"))
            }
        };

        match &result.error {
            None => info!(function = name, %arguments, result = %result.output, "🔧 Function call"),
            Some(error) => warn!(function = name, %arguments, error = %error, "🔧 Function call failed"),
        }
        result
    }

    /// Catalog entries with no function behind them.
    pub fn unresolved<'a>(&self, catalog: &'a [ToolDefinition]) -> Vec<&'a str> {
        catalog
            .iter()
            .map(|tool| tool.name.as_str())
            .filter(|name| !self.contains(name))
            .collect()
    }

    /// Registered functions the catalog does not announce.
    pub fn undeclared(&self, catalog: &[ToolDefinition]) -> Vec<String> {
        let mut names: Vec<String> = self
            .functions
            .keys()
            .filter(|name| !catalog.iter().any(|tool| &tool.name == *name))
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(args: Value) -> BoxFuture<'static, anyhow::Result<Value>> {
        Box::pin(async move { Ok(json!({ "echo": args })) })
    }

    fn broken(_: Value) -> BoxFuture<'static, anyhow::Result<Value>> {
        Box::pin(async { Err(anyhow::anyhow!("disk on fire")) })
    }

    fn panicking(_: Value) -> BoxFuture<'static, anyhow::Result<Value>> {
        Box::pin(async { panic!("boom") })
    }

    fn executor() -> FunctionExecutor {
        let mut executor = FunctionExecutor::new();
        executor.register("echo", echo);
        executor.register("broken", broken);
        executor.register("panicking", panicking);
        executor
    }

    #[tokio::test]
    async fn test_success_passes_output_through() {
        let result = executor().execute("echo", json!({"x": 1})).await;
        assert_eq!(result, FunctionResult::ok(json!({"echo": {"x": 1}})));
    }

    #[tokio::test]
    async fn test_unknown_name_is_not_found() {
        let result = executor().execute("missing", json!({})).await;
        assert_eq!(result.output, json!({"error": "Function 'missing' not found."}));
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn test_error_is_captured() {
        let result = executor().execute("broken", json!({})).await;
        assert_eq!(
            result.error.as_deref(),
            Some("Error executing function 'broken': disk on fire")
        );
        assert_eq!(result.output["error"], result.error.clone().unwrap());
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let result = executor().execute("panicking", json!({})).await;
        assert_eq!(
            result.error.as_deref(),
            Some("Error executing function 'panicking': boom")
        );
    }

    #[test]
    fn test_catalog_cross_check() {
        let catalog = vec![
            ToolDefinition::function("echo", "", json!({})),
            ToolDefinition::function("ghost", "", json!({})),
        ];
        let executor = executor();
        assert_eq!(executor.unresolved(&catalog), vec!["ghost"]);
        assert_eq!(executor.undeclared(&catalog), vec!["broken", "panicking"]);
    }
}
