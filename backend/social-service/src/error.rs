/// Error types for social-service
///
/// Every failure the core can produce is a typed, recoverable outcome. The
/// category returned by [`AppError::kind`] is what callers branch on; the
/// HTTP layer maps categories to status codes.
use thiserror::Error;

/// Coarse error category surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    Validation,
    Unauthenticated,
    Internal,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("You are already following this user")]
    AlreadyFollowing,

    #[error("You are not following this user")]
    NotFollowing,

    #[error("You cannot follow or unfollow yourself")]
    SelfFollow,

    #[error("You already liked this item")]
    AlreadyLiked,

    #[error("You have not liked this item")]
    NotLiked,

    #[error("Item already saved")]
    AlreadySaved,

    #[error("Item not saved")]
    NotSaved,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(resource: &'static str) -> Self {
        AppError::NotFound { resource }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::AlreadyFollowing
            | AppError::NotFollowing
            | AppError::AlreadyLiked
            | AppError::NotLiked
            | AppError::AlreadySaved
            | AppError::NotSaved => ErrorKind::Conflict,
            AppError::SelfFollow | AppError::Validation(_) => ErrorKind::Validation,
            AppError::Unauthenticated => ErrorKind::Unauthenticated,
            AppError::Database(_) | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Log error with a level matching its category
    pub fn log(&self) {
        match self.kind() {
            ErrorKind::NotFound | ErrorKind::Validation | ErrorKind::Conflict => {
                tracing::debug!(error = %self, "Client error");
            }
            ErrorKind::Forbidden | ErrorKind::Unauthenticated => {
                tracing::warn!(error = %self, "Authorization failure");
            }
            ErrorKind::Internal => {
                tracing::error!(error = ?self, "Server error");
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Result type alias for service operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_toggles_are_conflicts() {
        for err in [
            AppError::AlreadyFollowing,
            AppError::NotFollowing,
            AppError::AlreadyLiked,
            AppError::NotLiked,
            AppError::AlreadySaved,
            AppError::NotSaved,
        ] {
            assert_eq!(err.kind(), ErrorKind::Conflict, "{err}");
        }
    }

    #[test]
    fn self_follow_is_validation() {
        assert_eq!(AppError::SelfFollow.kind(), ErrorKind::Validation);
        assert_eq!(
            AppError::not_found("Post").to_string(),
            "Post not found"
        );
    }
}
