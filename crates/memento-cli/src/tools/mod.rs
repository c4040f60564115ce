//! Tool subsystem: the script catalog and the fixed set of operations the
//! model may invoke on it.
//!
//! Scripts run with the same privileges as this process. The registry only
//! guarantees path containment and a wall-clock limit per execution; it does
//! not inspect or sandbox script content.

pub mod registry;
pub mod router;
pub mod script;

use memento_core::{AgentError, ParameterProperty, ParameterSchema, ToolCall, ToolDefinition};
use serde::Deserialize;
use serde_json::Value;

pub use registry::ToolRegistry;
pub use router::{RouteResult, ToolRouter};

/// Operation name for creating or overwriting a script
pub const CREATE_TOOL: &str = "tool_write_script";
/// Operation name for running a stored script
pub const RUN_TOOL: &str = "tool_execute";

/// Outcome of running one stored script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Whether the process started and exited with status 0
    pub success: bool,
    /// Captured stdout/stderr, or a description of why nothing ran
    pub output: String,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Whether the process was killed for exceeding the time limit
    pub timed_out: bool,
}

impl ExecutionResult {
    /// Process ran to completion
    pub fn completed(exit_code: Option<i32>, output: impl Into<String>) -> Self {
        Self {
            success: exit_code == Some(0),
            output: output.into(),
            exit_code,
            timed_out: false,
        }
    }

    /// Process never ran (unknown tool, invalid name, launch failure)
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            exit_code: None,
            timed_out: false,
        }
    }

    /// Process was killed at the deadline
    pub fn timed_out(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            exit_code: None,
            timed_out: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateToolArgs {
    filename: String,
    code: String,
}

#[derive(Debug, Deserialize)]
struct RunToolArgs {
    filename: String,
}

/// The closed set of operations a tool call can resolve to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOperation {
    CreateTool { filename: String, code: String },
    RunTool { filename: String },
    Unknown(String),
}

impl ToolOperation {
    /// Resolve a tool call by name; malformed arguments are a protocol error
    pub fn resolve(call: &ToolCall) -> Result<Self, AgentError> {
        match call.name.as_str() {
            CREATE_TOOL => {
                let args: CreateToolArgs = parse_args(call)?;
                Ok(ToolOperation::CreateTool {
                    filename: args.filename,
                    code: args.code,
                })
            }
            RUN_TOOL => {
                let args: RunToolArgs = parse_args(call)?;
                Ok(ToolOperation::RunTool {
                    filename: args.filename,
                })
            }
            other => Ok(ToolOperation::Unknown(other.to_string())),
        }
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(call: &ToolCall) -> Result<T, AgentError> {
    if let Value::String(raw) = &call.arguments {
        return Err(AgentError::Protocol(format!(
            "arguments for {} are not valid JSON: {}",
            call.name, raw
        )));
    }
    serde_json::from_value(call.arguments.clone()).map_err(|e| {
        AgentError::Protocol(format!("malformed arguments for {}: {}", call.name, e))
    })
}

/// Definitions of every recognized operation, sent with each chat request
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            CREATE_TOOL,
            "Create or overwrite a script in your tool directory. The file extension selects \
             the interpreter (.py, .sh, .js, .rb, .pl, .ps1, .bat); other files run directly.",
            ParameterSchema::new()
                .with_required(
                    "filename",
                    ParameterProperty::string("Plain file name such as scan.py, no directories"),
                )
                .with_required("code", ParameterProperty::string("Full source text of the script")),
        ),
        ToolDefinition::new(
            RUN_TOOL,
            "Execute a script from your tool directory and return its combined output.",
            ParameterSchema::new().with_required(
                "filename",
                ParameterProperty::string("Name of a script previously created"),
            ),
        ),
    ]
}
