use thiserror::Error;

use crate::targets::ConfigError;

#[derive(Error, Debug)]
pub enum JarvisError {
    #[error("Invalid selector: {0}")]
    Config(#[from] ConfigError),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("Inventory error: {0}")]
    Inventory(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tonic::transport::Error> for JarvisError {
    fn from(err: tonic::transport::Error) -> Self {
        // tonic's Display stops at "transport error"; keep the underlying causes.
        JarvisError::Transport(error_chain(&err))
    }
}

/// `err` followed by each of its sources, joined with `": "`. A cause whose
/// message repeats the previous one is skipped.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut last = message.clone();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if text != last {
            message.push_str(": ");
            message.push_str(&text);
            last = text;
        }
        source = cause.source();
    }
    message
}

pub type Result<T> = std::result::Result<T, JarvisError>;
