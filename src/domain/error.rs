//! Domain error types.

/// Top-level error type for futdata.
///
/// Data absence (unknown trading day, no dominant contract, empty single-day
/// query) is never an error; it surfaces as `Ok(None)` from the operation.
#[derive(Debug, thiserror::Error)]
pub enum FutdataError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("duplicate registration of {key}")]
    DuplicateRegistration { key: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("deadline exceeded during {operation}")]
    DeadlineExceeded { operation: String },

    #[error("cache error: {reason}")]
    Cache { reason: String },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FutdataError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        FutdataError::InvalidArgument {
            reason: reason.into(),
        }
    }
}

impl From<&FutdataError> for std::process::ExitCode {
    fn from(err: &FutdataError) -> Self {
        let code: u8 = match err {
            FutdataError::Io(_) => 1,
            FutdataError::ConfigParse { .. }
            | FutdataError::ConfigMissing { .. }
            | FutdataError::ConfigInvalid { .. } => 2,
            FutdataError::Database { .. } | FutdataError::DatabaseQuery { .. } => 3,
            FutdataError::InvalidArgument { .. } | FutdataError::DuplicateRegistration { .. } => 4,
            FutdataError::Cache { .. } | FutdataError::Serialization(_) => 5,
            FutdataError::DeadlineExceeded { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
