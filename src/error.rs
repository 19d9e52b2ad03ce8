use thiserror::Error;

/// Main error type for the signal engine
#[derive(Error, Debug)]
pub enum SharplineError {
    // Data access errors
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    // Malformed records, signals or games
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Registry lookups
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Processor {strategy} failed on game {game_id}: {reason}")]
    ProcessorFailure {
        strategy: String,
        game_id: String,
        reason: String,
    },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl SharplineError {
    /// Build a processor failure with game/strategy context
    pub fn processor_failure(
        strategy: impl Into<String>,
        game_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ProcessorFailure {
            strategy: strategy.into(),
            game_id: game_id.into(),
            reason: reason.into(),
        }
    }

    /// True when the error came from a missing or unreachable data source
    pub fn is_data_unavailable(&self) -> bool {
        matches!(self, Self::DataUnavailable(_) | Self::Database(_) | Self::Io(_))
    }

    /// Errors that skip a single unit of work instead of aborting the run
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DataUnavailable(_)
                | Self::Database(_)
                | Self::Io(_)
                | Self::InvalidInput(_)
                | Self::UnknownStrategy(_)
                | Self::ProcessorFailure { .. }
        )
    }

    /// Short machine-readable label, used in run error entries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataUnavailable(_) | Self::Database(_) | Self::Io(_) => "data_unavailable",
            Self::InvalidInput(_) => "invalid_input",
            Self::UnknownStrategy(_) => "unknown_strategy",
            Self::ProcessorFailure { .. } => "processor_failure",
            Self::Config(_) | Self::Validation(_) => "config",
            Self::Json(_) => "json",
            Self::Cancelled => "cancelled",
            Self::Internal(_) | Self::Other(_) => "internal",
        }
    }
}

/// Result type alias for SharplineError
pub type Result<T> = std::result::Result<T, SharplineError>;
