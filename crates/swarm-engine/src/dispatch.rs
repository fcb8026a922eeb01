use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use swarm_core::messages::{ToolCall, ToolResult};
use swarm_core::tools::{Tool, ToolError};

use crate::registry::{ToolRegistry, ToolSource};

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(600);

/// Executes the tool calls of one model turn.
///
/// Results always come back one per call, in call order, whatever order the
/// calls finished in.
#[derive(Clone, Debug)]
pub struct ToolDispatcher {
    parallel: bool,
    timeout: Duration,
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self {
            parallel: true,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

impl ToolDispatcher {
    pub fn new(parallel: bool, timeout: Duration) -> Self {
        Self { parallel, timeout }
    }

    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub async fn dispatch(&self, registry: &ToolRegistry, calls: &[ToolCall]) -> Vec<ToolResult> {
        if !self.parallel {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(execute_call(lookup(registry, &call.name), call.clone(), self.timeout).await);
            }
            return results;
        }

        let handles: Vec<_> = calls
            .iter()
            .map(|call| {
                let tool = lookup(registry, &call.name);
                let call = call.clone();
                let timeout = self.timeout;
                tokio::spawn(execute_call(tool, call, timeout))
            })
            .collect();

        let mut results = Vec::with_capacity(calls.len());
        for (call, handle) in calls.iter().zip(handles) {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_err) => {
                    error!(tool = %call.name, error = %join_err, "tool task failed");
                    results.push(ToolResult::error(
                        call.id.clone(),
                        format!("Error executing tool: {join_err}"),
                    ));
                }
            }
        }
        results
    }
}

fn lookup(registry: &ToolRegistry, name: &str) -> Option<(Arc<dyn Tool>, ToolSource)> {
    registry.get(name).zip(registry.source(name))
}

async fn execute_call(
    tool: Option<(Arc<dyn Tool>, ToolSource)>,
    call: ToolCall,
    timeout: Duration,
) -> ToolResult {
    let Some((tool, source)) = tool else {
        warn!(tool = %call.name, "model requested an unknown tool");
        return ToolResult::error(call.id, format!("Tool '{}' not found", call.name));
    };

    let args = match call.decode_arguments() {
        Ok(map) => Value::Object(map),
        Err(e) => {
            warn!(tool = %call.name, error = %e, "undecodable tool arguments, using {{}}");
            Value::Object(Default::default())
        }
    };

    let start = Instant::now();
    let outcome = tokio::time::timeout(
        timeout,
        std::panic::AssertUnwindSafe(tool.execute(args)).catch_unwind(),
    )
    .await;

    let result = match outcome {
        Ok(Ok(Ok(content))) => ToolResult::success(call.id, content),
        Ok(Ok(Err(e))) => ToolResult::error(call.id, format!("Error executing tool: {e}")),
        Ok(Err(panic)) => {
            let msg = panic_message(&panic);
            error!(tool = %call.name, panic = %msg, "tool panicked during execution");
            ToolResult::error(call.id, format!("Error executing tool: tool panicked: {msg}"))
        }
        Err(_) => {
            warn!(tool = %call.name, timeout_secs = timeout.as_secs(), "tool timed out");
            ToolResult::error(
                call.id,
                format!("Error executing tool: {}", ToolError::Timeout(timeout)),
            )
        }
    };
    debug!(
        tool = %call.name,
        source = source.as_str(),
        is_error = result.is_error,
        duration_ms = start.elapsed().as_millis() as u64,
        "tool finished"
    );
    result
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}
