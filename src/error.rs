use thiserror::Error;

/// Failures of the key-value substrate. Callers log these and carry on with
/// whatever state they already hold.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize value for key {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to deserialize value for key {key}: {source}")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("local store quota exceeded writing {key}: {needed} bytes > {quota} bytes")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },

    #[error("local store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid rpc url {0}")]
    InvalidUrl(String),

    #[error("rpc handshake with {url} failed: {reason}")]
    Handshake { url: String, reason: String },

    #[error("rpc handshake with {0} timed out")]
    Timeout(String),
}

/// Transient RPC failures. Never fatal to a polling loop.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rpc call {method} timed out after {secs}s")]
    Timeout { method: &'static str, secs: u64 },

    #[error("rpc call {method} failed: {reason}")]
    Rpc { method: &'static str, reason: String },

    #[error("invalid signature {0}")]
    InvalidSignature(String),

    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl FetchError {
    /// Transient failures are retried on the next tick. A parse failure will
    /// fail the same way every time, so the record is skipped instead.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            FetchError::Parse(_) | FetchError::InvalidSignature(_) | FetchError::InvalidAddress(_)
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("transaction {0} has no status meta")]
    MissingMeta(String),

    #[error("transaction {0} uses an encoding without account keys")]
    MissingAccountKeys(String),

    #[error("token account data is {0} bytes, need at least 72")]
    AccountTooShort(usize),

    #[error("invalid token amount {0:?}")]
    InvalidAmount(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is not a valid base58 address: {value}")]
    Address { field: &'static str, value: String },

    #[error("{field} must be an http(s) url, got {value}")]
    Url { field: &'static str, value: String },

    #[error("{field} out of range: {value} (allowed {min}..={max})")]
    Range {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("{0}")]
    Inconsistent(String),

    #[error("unsupported settings version {0}")]
    Version(u64),

    #[error("malformed settings document: {0}")]
    Malformed(String),
}

/// Failures talking to the external points ledger service.
#[derive(Debug, Error)]
pub enum PointsError {
    #[error("points service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("points service rejected {endpoint} ({status}): {message}")]
    Rejected {
        endpoint: &'static str,
        status: u16,
        message: String,
    },

    #[error("insufficient points: need {needed}, have {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}
