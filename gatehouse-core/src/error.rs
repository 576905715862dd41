use thiserror::Error;

/// Classification hook for [`crate::retry::with_retries`]: an error reports
/// whether retrying the operation has any chance of a different outcome.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Failure of a storage backend, as distinct from any policy outcome.
///
/// The engine wraps this type rather than exposing backend-specific errors,
/// so callers can always tell "backend unavailable" apart from a deny. The
/// transient variants are the ones [`crate::retry::with_retries`] will retry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or dropped the connection.
    #[error("storage unavailable: {0}")]
    Unavailable(anyhow::Error),

    /// A statement or pool acquire exceeded its deadline.
    #[error("storage timeout during {operation}")]
    Timeout { operation: &'static str },

    /// The backend aborted the transaction (serialization failure, deadlock
    /// victim). Safe to retry from the top of the operation.
    #[error("storage conflict during {operation}")]
    Conflict { operation: &'static str },

    /// A stored record failed to decode into the expected shape.
    #[error("corrupt record: {0}")]
    Corrupt(anyhow::Error),

    /// Anything else.
    #[error("storage error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl StoreError {
    pub fn unavailable(err: impl Into<anyhow::Error>) -> Self {
        Self::Unavailable(err.into())
    }

    pub fn timeout(operation: &'static str) -> Self {
        Self::Timeout { operation }
    }

    pub fn conflict(operation: &'static str) -> Self {
        Self::Conflict { operation }
    }

    pub fn corrupt(err: impl Into<anyhow::Error>) -> Self {
        Self::Corrupt(err.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(anyhow::anyhow!(msg.into()))
    }

    /// Whether a retry has any chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Timeout { .. } | Self::Conflict { .. }
        )
    }

    /// Whether retrying is pointless.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}
