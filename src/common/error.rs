use std::path::PathBuf;
use thiserror::Error;

/// Result type for jnc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the jnc compiler
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Class not found: {name}")]
    ClassNotFound { name: String },

    #[error("Malformed class file: {message}")]
    MalformedClass { message: String },

    #[error("Unsupported constant pool tag: {tag}")]
    UnsupportedConstant { tag: u8 },

    #[error("No executable method found in class")]
    NoExecutableMethod,

    #[error("Failed to write {}: {message}", .path.display())]
    WriteFailed { path: PathBuf, message: String },

    #[error("Code generation error: {message}")]
    CodeGen { message: String },

    #[error("Internal compiler error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a malformed-class error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedClass { message: message.into() }
    }

    /// Create a class-not-found error
    pub fn class_not_found(name: impl Into<String>) -> Self {
        Self::ClassNotFound { name: name.into() }
    }

    /// Create a code generation error
    pub fn codegen_error(message: impl Into<String>) -> Self {
        Self::CodeGen { message: message.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Create a write-failure error for an output path
    pub fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFailed { path: path.into(), message: source.to_string() }
    }
}
