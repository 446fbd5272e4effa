use thiserror::Error;

/// Errors raised while executing toolscript.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("name '{0}' is not defined")]
    NameError(String),

    #[error("type error: {0}")]
    TypeError(String),

    #[error("value error: {0}")]
    ValueError(String),

    #[error("key error: {0}")]
    KeyError(String),

    #[error("index error: {0}")]
    IndexError(String),

    #[error("attribute error: {0}")]
    AttributeError(String),

    #[error("division by zero")]
    ZeroDivision,

    #[error("integer overflow")]
    Overflow,

    #[error("import error: {0}")]
    ImportError(String),

    #[error("'{0}' outside {1}")]
    MisplacedControlFlow(&'static str, &'static str),

    #[error("maximum call depth of {0} exceeded")]
    CallDepthExceeded(usize),

    #[error("execution cancelled")]
    Cancelled,

    #[error("execution deadline exceeded")]
    DeadlineExceeded,

    #[error("{message}")]
    Host { message: String },

    #[error("{source} (line {line})")]
    At {
        line: usize,
        #[source]
        source: Box<ScriptError>,
    },
}

impl ScriptError {
    pub fn type_error(message: impl Into<String>) -> Self {
        ScriptError::TypeError(message.into())
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        ScriptError::ValueError(message.into())
    }

    pub fn host(message: impl Into<String>) -> Self {
        ScriptError::Host {
            message: message.into(),
        }
    }

    /// Attach a source line unless the error already carries one. Limit
    /// errors stay bare so callers can match on them directly.
    pub fn at_line(self, line: usize) -> Self {
        match self {
            ScriptError::At { .. }
            | ScriptError::Cancelled
            | ScriptError::DeadlineExceeded
            | ScriptError::CallDepthExceeded(_) => self,
            other => ScriptError::At {
                line,
                source: Box::new(other),
            },
        }
    }

    /// The error without its line annotation.
    pub fn root(&self) -> &ScriptError {
        match self {
            ScriptError::At { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            ScriptError::At { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// True for errors caused by an execution limit rather than the program.
    pub fn is_interruption(&self) -> bool {
        matches!(
            self.root(),
            ScriptError::Cancelled | ScriptError::DeadlineExceeded
        )
    }
}

pub type ScriptResult<T> = Result<T, ScriptError>;
