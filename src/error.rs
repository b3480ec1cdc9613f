use thiserror::Error;

/// Errors surfaced by the pick'em core.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("season not found: {0}")]
    SeasonNotFound(String),

    #[error("week {week} not found for season {season}")]
    WeekNotFound { season: String, week: i32 },

    #[error("game not found: {0}")]
    GameNotFound(String),

    #[error("member not found: {0}")]
    MemberNotFound(String),

    #[error("season {0} has no weeks")]
    SeasonHasNoWeeks(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("sports data provider is not configured")]
    ProviderNotConfigured,

    #[error("season {0} is missing a sports data key")]
    SeasonKeyMissing(String),

    #[error("sports data unavailable: {0}")]
    Upstream(String),

    // The sqlx error stays in the source chain so it is logged but never
    // rendered to callers.
    #[error("database error during {context}")]
    Database {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("corrupt {context}: {message}")]
    Corrupt {
        context: &'static str,
        message: String,
    },
}

/// Coarse classification callers use to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadInput,
    Unavailable,
    Internal,
}

impl PoolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::SeasonNotFound(_)
            | PoolError::WeekNotFound { .. }
            | PoolError::GameNotFound(_)
            | PoolError::MemberNotFound(_) => ErrorKind::NotFound,
            PoolError::Validation(_) => ErrorKind::BadInput,
            PoolError::Upstream(_) => ErrorKind::Unavailable,
            PoolError::SeasonHasNoWeeks(_)
            | PoolError::ProviderNotConfigured
            | PoolError::SeasonKeyMissing(_)
            | PoolError::Database { .. }
            | PoolError::Corrupt { .. } => ErrorKind::Internal,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PoolError::Validation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Result type alias for PoolError
pub type Result<T> = std::result::Result<T, PoolError>;

/// Attaches an operation label to sqlx failures.
pub trait DbContext<T> {
    fn db_context(self, context: &'static str) -> Result<T>;
}

impl<T> DbContext<T> for std::result::Result<T, sqlx::Error> {
    fn db_context(self, context: &'static str) -> Result<T> {
        self.map_err(|source| PoolError::Database { context, source })
    }
}
