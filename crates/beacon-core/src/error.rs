use thiserror::Error;

/// Broad classification of an [`AppError`].
///
/// The class decides how an error propagates: connectivity failures abort the
/// process, validation failures drop one dataset or end as a usage message,
/// data format failures skip one dataset during a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Platform or store unreachable, timed out, or the run was cancelled.
    Connectivity,
    /// Missing descriptor field, unknown assembly, missing criteria or parameter.
    Validation,
    /// A downloaded file could not be read or parsed.
    DataFormat,
    /// Local failures that fit none of the above (I/O, serialization).
    Internal,
}

/// Application-wide error types.
///
/// This enum represents all possible errors that can occur in Galaxy Beacon.
/// It uses the `thiserror` crate for ergonomic error handling and automatic conversion
/// from underlying library errors.
///
/// # Error Conversion
///
/// Most errors automatically convert from their source types using the `#[from]` attribute:
/// - `sqlx::Error` → `AppError::DatabaseError`
/// - `serde_json::Error` → `AppError::SerializationError`
/// - `std::io::Error` → `AppError::Io`
///
/// # Examples
///
/// ```no_run
/// use beacon_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::MissingParameter("database-url".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// Wraps all errors from SQLx, including connection failures and query errors.
    /// Losing the store is the one failure a rebuild never survives.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// Document store rejected an operation for a reason other than the driver.
    #[error("Store error: {0}")]
    StoreError(String),

    /// HTTP request to the workflow platform failed.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// Network or connection error.
    ///
    /// This error occurs when a network request fails due to connectivity issues,
    /// DNS resolution failures, or the remote server being unreachable.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    ///
    /// This error occurs when a request takes longer than the configured timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The overall deadline of the run passed before the call could start.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// The run was cancelled (e.g. Ctrl-C).
    #[error("Operation cancelled")]
    Cancelled,

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A platform dataset descriptor lacks a required field.
    #[error("key \"{0}\" not defined")]
    MissingField(String),

    /// A platform dataset descriptor carries an unusable value.
    #[error("invalid value \"{value}\" for \"{field}\"")]
    InvalidField { field: String, value: String },

    /// Reference assembly is not one of the recognized human genome families.
    #[error("unknown reference \"{0}\"")]
    UnknownAssembly(String),

    /// A required connection parameter or criteria field was not supplied.
    #[error("Missing value -> {0}")]
    MissingParameter(String),

    /// Criteria were supplied but cannot be used for the chosen query kind.
    #[error("Invalid criteria: {0}")]
    InvalidCriteria(String),

    /// Settings file could not be parsed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A downloaded variant file could not be parsed.
    #[error("Cannot read {path}: {reason}")]
    DataFormat { path: String, reason: String },

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Local filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic application error for cases not covered by specific variants.
    ///
    /// Use this sparingly - prefer creating specific error variants
    /// for better error handling and debugging.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns the taxonomy class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::DatabaseError(_)
            | AppError::StoreError(_)
            | AppError::ClientError(_)
            | AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::DeadlineExceeded
            | AppError::Cancelled
            | AppError::RateLimitExceeded => ErrorClass::Connectivity,
            AppError::InvalidUrl(_)
            | AppError::MissingField(_)
            | AppError::InvalidField { .. }
            | AppError::UnknownAssembly(_)
            | AppError::MissingParameter(_)
            | AppError::InvalidCriteria(_)
            | AppError::InvalidConfig(_) => ErrorClass::Validation,
            AppError::DataFormat { .. } => ErrorClass::DataFormat,
            AppError::SerializationError(_) | AppError::Io(_) | AppError::Generic(_) => {
                ErrorClass::Internal
            }
        }
    }

    /// Process exit code for this error: 2 for connectivity, 1 otherwise.
    ///
    /// # Examples
    ///
    /// ```
    /// use beacon_core::error::AppError;
    ///
    /// assert_eq!(AppError::Timeout(30).exit_code(), 2);
    /// assert_eq!(AppError::MissingParameter("geneId".into()).exit_code(), 1);
    /// ```
    pub fn exit_code(&self) -> u8 {
        match self.class() {
            ErrorClass::Connectivity => 2,
            _ => 1,
        }
    }

    /// Returns true if this error must stop a rebuild even when it happened
    /// while importing a single dataset.
    ///
    /// Download and parse failures are isolated to their dataset; losing the
    /// store, running out of time, being cancelled, or failing to write local
    /// files is not.
    pub fn aborts_rebuild(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseError(_)
                | AppError::StoreError(_)
                | AppError::DeadlineExceeded
                | AppError::Cancelled
                | AppError::Io(_)
        )
    }

    /// Returns true if a failure while reading one catalog entry should only
    /// drop that entry.
    ///
    /// An HTTP error status for a single dataset or owner is local to it.
    /// Transport failures, timeouts, cancellation and the deadline are not.
    ///
    /// # Examples
    ///
    /// ```
    /// use beacon_core::error::AppError;
    ///
    /// assert!(AppError::ClientError("HTTP 404 from /api/datasets/x".into()).drops_entry());
    /// assert!(!AppError::NetworkError("connection refused".into()).drops_entry());
    /// ```
    pub fn drops_entry(&self) -> bool {
        matches!(self, AppError::ClientError(_)) || self.class() != ErrorClass::Connectivity
    }

    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::DatabaseError(e) => {
                if e.to_string().contains("connection") {
                    "Cannot connect to the beacon database. Is PostgreSQL running?\n   Check DATABASE_URL.".to_string()
                } else {
                    format!("Database error: {}", e)
                }
            }
            AppError::ClientError(msg) => {
                if msg.contains("401") || msg.contains("403") {
                    format!(
                        "Galaxy rejected the API key: {}\n   The key must belong to an admin user.",
                        msg
                    )
                } else if msg.contains("connect") {
                    format!(
                        "Cannot connect to Galaxy: {}\n   Check the Galaxy URL and your network.",
                        msg
                    )
                } else {
                    format!("Galaxy API error: {}", msg)
                }
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!(
                    "Request timed out after {} seconds.\n   Raise --timeout or try again later.",
                    secs
                )
            }
            AppError::DeadlineExceeded => {
                "The run exceeded its deadline.\n   The store may be partially rebuilt; run rebuild again.".to_string()
            }
            AppError::Cancelled => {
                "Cancelled.\n   The store may be partially rebuilt; run rebuild again.".to_string()
            }
            AppError::MissingParameter(name) => {
                format!(
                    "Missing value -> {}. Use -h or --help for usage details.",
                    name
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
    /// use beacon_core::error::AppError;
    ///
    /// // Network errors are retryable
    /// let err = AppError::NetworkError("connection reset".to_string());
    /// assert!(err.is_retryable());
    ///
    /// // Missing descriptor fields are NOT retryable
    /// let err = AppError::MissingField("uuid".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded
        )
    }
}
