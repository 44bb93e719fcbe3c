//! Error types for the serializer

use std::io;
use std::path::PathBuf;

use deeppickle_vm::ExecError;
use thiserror::Error;

/// Result type alias for serializer operations
pub type PickleResult<T> = Result<T, PickleError>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum PickleError {
    /// I/O error during read/write
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding error
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    /// Decoding error
    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Encoding-specific errors
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Value kind that cannot be reconstructed from parts
    #[error("Cannot serialize {kind} value: {detail}")]
    UnsupportedValue { kind: String, detail: String },

    /// Closure length differs from the code's free variables
    #[error(
        "Function '{function}' carries {cells} closure cells but its code declares {freevars} free variables"
    )]
    InvalidClosure {
        function: String,
        freevars: usize,
        cells: usize,
    },

    /// A class's `__reduce__` raised
    #[error("__reduce__ of '{class}' failed: {source}")]
    Reduce {
        class: String,
        #[source]
        source: ExecError,
    },

    /// Too many nested values
    #[error("Maximum serialization depth of {limit} exceeded")]
    RecursionLimit { limit: usize },

    /// Encoder invariant violated
    #[error("Internal encoder error: {0}")]
    Internal(String),
}

/// Decoding-specific errors
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Unexpected end of stream
    #[error("Unexpected end of stream at offset {offset}")]
    UnexpectedEof { offset: u64 },

    /// Unknown instruction byte
    #[error("Invalid opcode 0x{byte:02x} at offset {offset}")]
    InvalidOpcode { byte: u8, offset: u64 },

    /// Instruction needed more stack items than available
    #[error("Stack underflow in {op} at offset {offset}")]
    StackUnderflow { op: &'static str, offset: u64 },

    /// Instruction needed a mark but none was pushed
    #[error("No mark on the stack at offset {offset}")]
    MissingMark { offset: u64 },

    /// Load of a memo slot that was never stored
    #[error("Memo slot {slot} is empty at offset {offset}")]
    MemoMissing { slot: u64, offset: u64 },

    /// Header names a version this decoder does not speak
    #[error("Unsupported protocol version {0}")]
    UnsupportedProtocol(u8),

    /// Invalid UTF-8 in a string
    #[error("Invalid UTF-8 in string")]
    InvalidUtf8,

    /// Invalid varint encoding
    #[error("Invalid varint encoding")]
    InvalidVarint,

    /// Varint overflow
    #[error("Varint overflow")]
    VarintOverflow,

    /// A global reference no longer resolves in the decoding runtime
    #[error("Cannot resolve global reference {module}.{name}")]
    UnresolvableNativeReference { module: String, name: String },

    /// A reduce, build or attribute call failed inside the runtime
    #[error("Runtime error at offset {offset}: {source}")]
    Exec {
        offset: u64,
        #[source]
        source: ExecError,
    },

    /// Stream ended without a stop instruction
    #[error("Stream ended without a stop instruction")]
    MissingStop,

    /// Structurally valid instructions producing an impossible state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl DecodeError {
    pub fn exec(offset: usize, source: ExecError) -> Self {
        Self::Exec {
            offset: offset as u64,
            source,
        }
    }

    pub fn underflow(op: &'static str, offset: usize) -> Self {
        Self::StackUnderflow {
            op,
            offset: offset as u64,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the config file
    #[error("failed to read {}: {}", .path.display(), .source)]
    Io { path: PathBuf, source: io::Error },

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value outside its allowed range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
