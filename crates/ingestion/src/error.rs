//! Typed failures of the ingestion stages.

use stablewatch_db::SinkError;

/// Failures talking to a JSON-RPC endpoint.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC request failed with status: {0}")]
    Status(u16),
    #[error("RPC error {code}: {message}")]
    Method { code: i64, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} not found")]
    NotFound(String),
}

impl RpcError {
    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            RpcError::Status(status) => *status == 429 || *status >= 500,
            // -32005: limit exceeded, -32603: internal error on most providers
            RpcError::Method { code, .. } => matches!(code, -32005 | -32603),
            RpcError::InvalidResponse(_) | RpcError::Json(_) | RpcError::NotFound(_) => false,
        }
    }
}

/// Malformed chain data.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Transfer log has {found} topics, expected 3")]
    MissingTopics { found: usize },
    #[error("Transfer log data is {found} bytes, expected at least 32")]
    ShortData { found: usize },
    #[error("Log is missing {0}")]
    MissingLogField(&'static str),
    #[error("Raw value {raw} with {decimals} decimals does not fit a decimal amount")]
    AmountOverflow { raw: String, decimals: u8 },
    #[error("Missing field {0}")]
    MissingField(&'static str),
    #[error("Invalid quantity for {field}: {value}")]
    InvalidQuantity { field: &'static str, value: String },
    #[error(
        "Block {number} carries {len} bytes of extra data; \
         the chain needs proof-of-authority decoding"
    )]
    ExtraDataTooLong { number: u64, len: usize },
    #[error("Invalid call return data: {0}")]
    ReturnData(String),
}

/// Any failure inside an ETL loop.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
}

impl IngestError {
    /// Label used in logs and the `stablewatch_errors_total` metric.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Rpc(_) => "rpc",
            IngestError::Decode(_) => "decode",
            IngestError::Sink(_) => "sink",
            IngestError::UnknownNetwork(_) => "config",
        }
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
