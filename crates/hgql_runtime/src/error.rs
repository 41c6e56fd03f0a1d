//! Service errors.

use hgql_engine::EngineError;

/// Errors surfaced to the host.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service not started")]
    NotStarted,

    #[error("unknown operation {0}")]
    UnknownOperation(i32),

    #[error("invalid variables object")]
    InvalidVariables,

    #[error("{0}")]
    Parse(EngineError),

    #[error("{0}")]
    Operation(EngineError),

    #[error("subscription operations must be started with subscribe")]
    StreamingRequired,

    #[error("request cancelled")]
    Cancelled,

    #[error("failed to start worker pool: {0}")]
    Runtime(#[from] std::io::Error),
}
