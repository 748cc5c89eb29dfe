use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents every fault the harvester distinguishes. It uses the
/// `thiserror` crate for ergonomic error handling and automatic conversion
/// from underlying library errors.
///
/// # Error Conversion
///
/// - `sqlx::Error` → `AppError::DatabaseError`
/// - `serde_json::Error` → `AppError::SerializationError`
///
/// # Taxonomy
///
/// - Transient I/O faults inside a batch surface as [`AppError::BatchFailed`].
/// - A single entity that cannot be cast surfaces as [`AppError::CastFailed`]
///   and aborts its batch.
/// - Cooperative cancellation is [`AppError::Cancelled`] and is never
///   reported as a failed run.
///
/// # Examples
///
/// ```
/// use sos_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::Generic("Something went wrong".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// Wraps all errors from SQLx, including connection failures, query
    /// errors and row decoding failures.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// JSON serialization or deserialization failed.
    ///
    /// Occurs when verbatim or processed documents are written to or read
    /// from a document column.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The source database returned an error that is not a driver error.
    #[error("Source error: {0}")]
    SourceError(String),

    /// A destination store (verbatim collection, search index) rejected a write.
    #[error("Store error: {0}")]
    StoreError(String),

    /// One harvest batch failed. Sibling batches are not affected.
    #[error("Harvest batch {batch_index} failed: {message}")]
    BatchFailed { batch_index: usize, message: String },

    /// A single raw record could not be cast into its verbatim or processed form.
    #[error("Failed to cast sighting {sighting_id}: {message}")]
    CastFailed { sighting_id: i32, message: String },

    /// A harvest run finished with a failed status.
    #[error("{0}")]
    HarvestFailed(String),

    /// The run was cancelled through its cancellation token.
    #[error("Harvest cancelled")]
    Cancelled,

    /// Configuration file error.
    ///
    /// Occurs when reading or parsing the configuration file fails, or when a
    /// value is out of range.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic application error for cases not covered by specific variants.
    ///
    /// Use this sparingly - prefer creating specific error variants
    /// for better error handling and debugging.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::DatabaseError(e) => {
                if e.to_string().contains("connection") {
                    "Cannot connect to database. Is PostgreSQL running?\n   Check DATABASE_URL."
                        .to_string()
                } else {
                    format!("Database error: {}", e)
                }
            }
            AppError::BatchFailed {
                batch_index,
                message,
            } => {
                format!(
                    "Harvest batch {} failed: {}\n   Other batches were completed; re-run the harvest to retry.",
                    batch_index, message
                )
            }
            AppError::CastFailed {
                sighting_id,
                message,
            } => {
                format!(
                    "Sighting {} could not be converted: {}\n   This usually means the source row is malformed.",
                    sighting_id, message
                )
            }
            AppError::Cancelled => "Harvest was cancelled.".to_string(),
            AppError::ConfigError(msg) => {
                format!(
                    "Configuration error: {}\n   Check your configuration file.",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use sos_core::error::AppError;
    ///
    /// let err = AppError::SourceError("deadlock victim".to_string());
    /// assert!(err.is_retryable());
    ///
    /// let err = AppError::CastFailed { sighting_id: 7, message: "bad date".to_string() };
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::DatabaseError(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ),
            AppError::SourceError(_) | AppError::StoreError(_) | AppError::BatchFailed { .. } => {
                true
            }
            _ => false,
        }
    }

    /// Returns true if this error represents cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }
}
