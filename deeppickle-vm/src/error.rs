//! Error types for the host runtime

use thiserror::Error;

/// Result type alias for interpreter operations
pub type ExecResult<T> = Result<T, ExecError>;

/// Runtime errors raised while calling, looking up or executing
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    #[error("TypeError: {0}")]
    Type(String),

    #[error("NameError: name '{0}' is not defined")]
    Name(String),

    #[error("AttributeError: '{owner}' object has no attribute '{name}'")]
    Attribute { owner: String, name: String },

    #[error("IndexError: {0}")]
    Index(String),

    #[error("KeyError: {0}")]
    Key(String),

    #[error("ValueError: {0}")]
    Value(String),

    #[error("ZeroDivisionError: {0}")]
    ZeroDivision(String),

    #[error("OverflowError: {0}")]
    Overflow(String),

    /// Call depth exceeded `Interpreter::max_call_depth`
    #[error("RecursionError: maximum call depth of {limit} exceeded")]
    RecursionLimit { limit: usize },

    #[error("invalid bytecode in '{code}' at offset {offset}: {message}")]
    InvalidBytecode {
        code: String,
        offset: usize,
        message: String,
    },

    #[error("ImportError: no module named '{0}'")]
    Import(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl ExecError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }

    pub fn attribute(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Attribute {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn bytecode(code: &str, offset: usize, message: impl Into<String>) -> Self {
        Self::InvalidBytecode {
            code: code.to_string(),
            offset,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExecError::attribute("Foo", "bar");
        assert_eq!(
            err.to_string(),
            "AttributeError: 'Foo' object has no attribute 'bar'"
        );

        let err = ExecError::RecursionLimit { limit: 8 };
        assert!(err.to_string().contains("8"));

        let err = ExecError::bytecode("f", 4, "stack underflow");
        assert_eq!(
            err.to_string(),
            "invalid bytecode in 'f' at offset 4: stack underflow"
        );
    }
}
