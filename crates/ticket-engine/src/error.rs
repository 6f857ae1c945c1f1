use thiserror::Error;

/// Ticket engine errors
#[derive(Error, Debug)]
pub enum TicketEngineError {
    /// Store coordinates handed to routing were not finite numbers
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    /// Request payload failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider filled up between candidate selection and commit
    #[error("Assignment conflict: provider {0} is at capacity")]
    AssignmentConflict(uuid::Uuid),

    /// Requested status change is not allowed from the current state
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Classifier could not produce a result
    #[error("Classification failed: {0}")]
    Classification(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored JSON could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TicketEngineError {
    /// Create a new InvalidLocation error
    pub fn invalid_location<S: Into<String>>(msg: S) -> Self {
        Self::InvalidLocation(msg.into())
    }

    /// Create a new InvalidInput error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new InvalidTransition error
    pub fn invalid_transition<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTransition(msg.into())
    }

    /// Create a new Classification error
    pub fn classification<S: Into<String>>(msg: S) -> Self {
        Self::Classification(msg.into())
    }

    /// Create a new Config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new NotFound error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error came from the repository layer
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Serialization(_) | Self::Internal(_)
        )
    }
}

/// Result type for ticket engine operations
pub type Result<T> = std::result::Result<T, TicketEngineError>;
