//! Built-in functions the assistant may call, and their catalog entries.

use crate::executor::FunctionExecutor;
use futures::future::BoxFuture;
use openai_realtime_types::ToolDefinition;
use serde_json::{Value, json};

pub const GET_CURRENT_TIME: &str = "get_current_time";
pub const GET_RANDOM_NUMBER: &str = "get_random_number";

fn no_parameters() -> Value {
    json!({ "type": "object", "properties": {}, "required": [] })
}

/// The tool descriptors announced in the session configuration.
pub fn builtin_catalog() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::function(
            GET_CURRENT_TIME,
            "Returns the current local date and time.",
            no_parameters(),
        ),
        ToolDefinition::function(
            GET_RANDOM_NUMBER,
            "Returns a random whole number between 1 and 100.",
            no_parameters(),
        ),
    ]
}

/// An executor with every built-in function registered.
pub fn builtin_executor() -> FunctionExecutor {
    let mut executor = FunctionExecutor::new();
    executor.register(GET_CURRENT_TIME, get_current_time);
    executor.register(GET_RANDOM_NUMBER, get_random_number);
    executor
}

fn get_current_time(_args: Value) -> BoxFuture<'static, anyhow::Result<Value>> {
    Box::pin(async {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        Ok(json!({ "current_time": now }))
    })
}

fn get_random_number(_args: Value) -> BoxFuture<'static, anyhow::Result<Value>> {
    Box::pin(async {
        let n: u32 = rand::random_range(1..=100);
        Ok(json!({ "random_number": n }))
    })
}
