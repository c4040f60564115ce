//! Tool routing and dispatch

use std::path::PathBuf;

use memento_core::{AgentError, ToolCall};
use tracing::{info, instrument, warn};

use super::registry::ToolRegistry;
use super::{ExecutionResult, ToolOperation};

/// Result of routing a tool call
#[derive(Debug)]
pub enum RouteResult {
    /// Script stored
    Created { filename: String, path: PathBuf },
    /// Script could not be stored
    WriteFailed { filename: String, error: AgentError },
    /// Script ran (successfully or not)
    Executed {
        filename: String,
        result: ExecutionResult,
    },
    /// Name is not one of the recognized operations
    Unknown(String),
    /// Arguments could not be understood
    Rejected(AgentError),
}

impl RouteResult {
    pub fn is_success(&self) -> bool {
        match self {
            RouteResult::Created { .. } => true,
            RouteResult::Executed { result, .. } => result.success,
            _ => false,
        }
    }

    /// Text sent back to the model as the tool-result message
    pub fn message(&self) -> String {
        match self {
            RouteResult::Created { filename, path } => format!(
                "success: {} created and saved ({})",
                filename,
                path.display()
            ),
            RouteResult::WriteFailed { filename, error } => {
                format!("error: failed to write {}: {}", filename, error)
            }
            RouteResult::Executed { result, .. } if result.success => {
                if result.output.is_empty() {
                    "(no output)".to_string()
                } else {
                    result.output.clone()
                }
            }
            RouteResult::Executed { result, .. } => match result.exit_code {
                Some(code) => format!("{}\n[exit code {}]", result.output, code),
                None => result.output.clone(),
            },
            RouteResult::Unknown(name) => format!("unknown tool: {}", name),
            RouteResult::Rejected(error) => format!("error: {}", error),
        }
    }
}

/// Router for dispatching tool calls onto the registry
#[derive(Debug, Clone)]
pub struct ToolRouter {
    registry: ToolRegistry,
}

impl ToolRouter {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Get a reference to the registry
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Route a single tool call
    #[instrument(skip(self, call), fields(tool = %call.name, id = %call.id))]
    pub async fn route(&self, call: &ToolCall) -> RouteResult {
        info!(arguments = %call.arguments, "Action requested");

        let operation = match ToolOperation::resolve(call) {
            Ok(op) => op,
            Err(e) => {
                warn!(category = e.category(), error = %e, "Rejected tool call");
                return RouteResult::Rejected(e);
            }
        };

        let result = match operation {
            ToolOperation::CreateTool { filename, code } => {
                match self.registry.write_script(&filename, &code) {
                    Ok(path) => RouteResult::Created { filename, path },
                    Err(error) => RouteResult::WriteFailed { filename, error },
                }
            }
            ToolOperation::RunTool { filename } => {
                let result = self.registry.execute_script(&filename).await;
                RouteResult::Executed { filename, result }
            }
            ToolOperation::Unknown(name) => RouteResult::Unknown(name),
        };

        if result.is_success() {
            info!(result = %result.message(), "Action succeeded");
        } else {
            warn!(result = %result.message(), "Action failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{CREATE_TOOL, RUN_TOOL};
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::time::Duration;

    fn router(temp: &TempDir) -> ToolRouter {
        ToolRouter::new(ToolRegistry::new(
            temp.path().join("tools"),
            Duration::from_secs(5),
            10_000,
        ))
    }

    #[tokio::test]
    async fn test_route_create() {
        let temp = TempDir::new().unwrap();
        let router = router(&temp);
        let call = ToolCall::new("c1", CREATE_TOOL, json!({"filename": "a.sh", "code": "echo a"}));

        let result = router.route(&call).await;
        assert!(result.is_success());
        assert!(result.message().starts_with("success: a.sh created and saved"));
        assert_eq!(router.registry().list_tools().unwrap(), vec!["a.sh"]);
    }

    #[tokio::test]
    async fn test_route_create_traversal_fails() {
        let temp = TempDir::new().unwrap();
        let router = router(&temp);
        let args = json!({"filename": "../a.sh", "code": "echo a"});
        let call = ToolCall::new("c1", CREATE_TOOL, args);

        let result = router.route(&call).await;
        assert!(matches!(result, RouteResult::WriteFailed { .. }));
        assert!(result.message().starts_with("error: failed to write ../a.sh"));
        assert!(!temp.path().join("a.sh").exists());
    }

    #[tokio::test]
    async fn test_route_unknown() {
        let temp = TempDir::new().unwrap();
        let result = router(&temp)
            .route(&ToolCall::new("c1", "tool_teleport", json!({})))
            .await;

        assert!(!result.is_success());
        assert_eq!(result.message(), "unknown tool: tool_teleport");
    }

    #[tokio::test]
    async fn test_route_malformed_arguments() {
        let temp = TempDir::new().unwrap();
        let result = router(&temp)
            .route(&ToolCall::new("c1", RUN_TOOL, json!({"file": "x"})))
            .await;

        assert!(matches!(result, RouteResult::Rejected(_)));
        assert!(result.message().contains("malformed arguments for tool_execute"));
    }

    #[tokio::test]
    async fn test_route_run_missing() {
        let temp = TempDir::new().unwrap();
        let result = router(&temp)
            .route(&ToolCall::new("c1", RUN_TOOL, json!({"filename": "nope.sh"})))
            .await;

        assert!(!result.is_success());
        assert_eq!(result.message(), "tool not found: nope.sh");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_route_run_failure_reports_exit_code() {
        let temp = TempDir::new().unwrap();
        let router = router(&temp);
        router.registry().write_script("bad.sh", "echo nope\nexit 7\n").unwrap();

        let result = router
            .route(&ToolCall::new("c1", RUN_TOOL, json!({"filename": "bad.sh"})))
            .await;
        assert_eq!(result.message(), "nope\n\n[exit code 7]");
    }
}
