//! Error types for the scenario recorder.

use ethereum_types::H256;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("{0}")]
    Rpc(#[from] RpcError),

    #[error("ABI error: {0}")]
    Abi(#[from] AbiError),

    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    /// The call payload could not be matched to a method of a tracked contract.
    #[error("Failed to decode call to {target}: {reason}")]
    Decode { target: String, reason: String },

    /// Only produced when the missing-receipt policy is `fail`.
    #[error("No receipt for transaction 0x{hash:x}")]
    ReceiptUnavailable { hash: H256 },

    #[error("Custom state extractor '{name}' failed: {cause}")]
    Extractor { name: String, cause: String },

    #[error("Resolution task failed: {0}")]
    Task(String),

    #[error("I/O error on {path}: {cause}")]
    Io { path: String, cause: String },

    #[error("Config error: {0}")]
    Config(String),
}

/// Lifecycle misuse of a scenario or of the harness driving it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("scenario '{scenario}' was never started")]
    NotStarted { scenario: String },

    #[error("scenario '{scenario}' is already closed")]
    AlreadyClosed { scenario: String },

    #[error("scenarios still running: {}", .0.join(", "))]
    StillRunning(Vec<String>),

    #[error("interception of scenario '{scenario}' is not the innermost one, restore out of order")]
    InterceptionOrder { scenario: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbiError {
    #[error("invalid signature '{signature}': {cause}")]
    InvalidSignature { signature: String, cause: String },

    #[error("invalid JSON ABI: {0}")]
    InvalidJson(String),

    #[error("cannot encode arguments for {signature}: {cause}")]
    Encode { signature: String, cause: String },

    #[error("cannot decode {what}: {cause}")]
    Decode { what: String, cause: String },
}

/// Failure talking to the node, split by where it went wrong so the
/// client can decide whether another attempt makes sense.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("cannot reach node at {url}: {cause}")]
    ConnectionFailed { url: String, cause: String },

    #[error("{method}: no answer within {elapsed_ms}ms")]
    Timeout { method: String, elapsed_ms: u64 },

    #[error("{method}: node answered HTTP {status} ({body})")]
    HttpError {
        method: String,
        status: u16,
        body: String,
    },

    #[error("{method}: node rejected the request with code {code}: {message}")]
    JsonRpcError {
        method: String,
        code: i64,
        message: String,
    },

    #[error("{method}: unexpected `{field}` in response: {cause}")]
    ParseError {
        method: String,
        field: String,
        cause: String,
    },

    #[error("{method}: giving up after {attempts} attempt(s), last error: {last_error}")]
    RetryExhausted {
        method: String,
        attempts: u32,
        last_error: Box<RpcError>,
    },
}

impl RpcError {
    /// Transport trouble and overloaded nodes are worth another attempt;
    /// anything the node actually answered is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::ConnectionFailed { .. } | RpcError::Timeout { .. } => true,
            RpcError::HttpError { status, .. } => {
                *status == 429 || (502..=504).contains(status)
            }
            RpcError::JsonRpcError { .. }
            | RpcError::ParseError { .. }
            | RpcError::RetryExhausted { .. } => false,
        }
    }

    /// Seconds the node asked us to wait, carried in the body of a 429 as
    /// `retry-after:<secs>`.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            RpcError::HttpError {
                status: 429, body, ..
            } => body.strip_prefix("retry-after:")?.trim().parse().ok(),
            _ => None,
        }
    }

    pub(crate) fn parse(method: &str, field: &str, cause: impl Into<String>) -> Self {
        RpcError::ParseError {
            method: method.into(),
            field: field.into(),
            cause: cause.into(),
        }
    }
}
