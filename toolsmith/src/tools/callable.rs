//! Compiled, invocable tools.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use thiserror::Error;
use toolsmith_lang::runtime::{ExecutionLimits, Interpreter, Namespace, ScriptError, Value};
use tracing::info;

use super::types::{input_schema, ParamType, ToolParameter};

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("arguments must be a JSON object")]
    ArgumentsNotObject,

    #[error("unknown argument '{0}'")]
    UnknownArgument(String),

    #[error("missing required argument '{0}'")]
    MissingArgument(String),

    #[error("argument '{name}' must be of type {expected}")]
    TypeMismatch { name: String, expected: ParamType },

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("{0}")]
    Script(#[from] ScriptError),

    #[error("tool result cannot be returned: {0}")]
    Result(ScriptError),

    #[error("tool call timed out after {0:?}")]
    TimedOut(Duration),

    #[error("tool server is shutting down")]
    Unavailable,

    #[error("tool execution failed: {0}")]
    Join(String),
}

impl InvocationError {
    /// Errors caused by the caller's request rather than the tool.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            InvocationError::ArgumentsNotObject
                | InvocationError::UnknownArgument(_)
                | InvocationError::MissingArgument(_)
                | InvocationError::TypeMismatch { .. }
                | InvocationError::UnknownTool(_)
        )
    }
}

/// Result of one successful tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub result: JsonValue,
    /// Lines the tool printed.
    pub output: Vec<String>,
}

/// Per-call execution bounds.
#[derive(Debug, Clone, Copy)]
pub struct InvocationLimits {
    pub max_call_depth: usize,
    pub timeout: Duration,
}

/// A tool compiled into its tenant's namespace.
///
/// Holds the namespace strongly: user functions only keep a weak reference
/// to the namespace they were defined in.
pub struct CallableUnit {
    tenant_id: String,
    tool_id: String,
    name: String,
    description: String,
    parameters: Vec<ToolParameter>,
    entry: Value,
    namespace: Arc<Namespace>,
}

impl CallableUnit {
    pub(crate) fn new(
        tenant_id: &str,
        tool_id: &str,
        name: &str,
        description: &str,
        parameters: Vec<ToolParameter>,
        entry: Value,
        namespace: Arc<Namespace>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            tool_id: tool_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            parameters,
            entry,
            namespace,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn tool_id(&self) -> &str {
        &self.tool_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &[ToolParameter] {
        &self.parameters
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    pub fn input_schema(&self) -> JsonValue {
        input_schema(&self.parameters)
    }

    /// Map a JSON argument object onto keyword arguments, applying declared
    /// defaults and type checks.
    pub fn bind_arguments(
        &self,
        arguments: &JsonValue,
    ) -> Result<Vec<(String, Value)>, InvocationError> {
        let empty = serde_json::Map::new();
        let object = match arguments {
            JsonValue::Object(object) => object,
            JsonValue::Null => &empty,
            _ => return Err(InvocationError::ArgumentsNotObject),
        };

        if let Some(unknown) = object
            .keys()
            .find(|key| !self.parameters.iter().any(|p| &p.name == *key))
        {
            return Err(InvocationError::UnknownArgument(unknown.clone()));
        }

        let mut bound = Vec::with_capacity(self.parameters.len());
        for param in &self.parameters {
            let value = match object.get(&param.name) {
                Some(value) => {
                    if !param.param_type.accepts(value) {
                        return Err(InvocationError::TypeMismatch {
                            name: param.name.clone(),
                            expected: param.param_type,
                        });
                    }
                    value
                }
                None => match &param.default {
                    Some(default) => default,
                    None => return Err(InvocationError::MissingArgument(param.name.clone())),
                },
            };
            bound.push((param.name.clone(), Value::from_json(value)));
        }
        Ok(bound)
    }

    /// Run the tool on the current thread.
    pub fn invoke(
        &self,
        arguments: &JsonValue,
        limits: ExecutionLimits,
    ) -> Result<Invocation, InvocationError> {
        let kwargs = self.bind_arguments(arguments)?;
        let mut interpreter = Interpreter::new(self.namespace.clone(), limits);
        let outcome = interpreter.call_function(&self.entry, Vec::new(), kwargs);

        let output = interpreter.take_output();
        for line in &output {
            info!(tenant = %self.tenant_id, tool = %self.name, "{}", line);
        }

        let result = outcome?.to_json().map_err(InvocationError::Result)?;
        Ok(Invocation { result, output })
    }

    /// Run the tool on the blocking pool, cancelling it cooperatively once
    /// `limits.timeout` elapses.
    pub async fn invoke_blocking(
        self: &Arc<Self>,
        arguments: JsonValue,
        limits: InvocationLimits,
    ) -> Result<Invocation, InvocationError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let execution = ExecutionLimits::default()
            .with_max_call_depth(limits.max_call_depth)
            .with_cancel_flag(cancel.clone());

        let unit = self.clone();
        let task = tokio::task::spawn_blocking(move || unit.invoke(&arguments, execution));

        match tokio::time::timeout(limits.timeout, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => Err(InvocationError::Join(join_error.to_string())),
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                Err(InvocationError::TimedOut(limits.timeout))
            }
        }
    }
}

impl std::fmt::Debug for CallableUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallableUnit")
            .field("tenant_id", &self.tenant_id)
            .field("tool_id", &self.tool_id)
            .field("name", &self.name)
            .finish()
    }
}
