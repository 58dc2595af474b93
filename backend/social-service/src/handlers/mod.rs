/// HTTP handlers for social-service
///
/// - users: registration, profiles, privacy, follow graph, search
/// - posts / reels / stories: content CRUD, feeds, likes and saves
/// - comments: threads and comment likes
/// - messages: conversations and messages
///
/// Core errors are translated to HTTP status codes here.
pub mod comments;
pub mod messages;
pub mod posts;
pub mod reels;
pub mod stories;
pub mod users;

use actix_web::{error::ResponseError, http::StatusCode, web, HttpResponse};
use serde::Serialize;

use crate::error::{AppError, ErrorKind};

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        self.log();
        let status = self.status_code();
        // Database details stay in the logs
        let error_msg = match self.kind() {
            ErrorKind::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        HttpResponse::build(status).json(serde_json::json!({
            "error": error_msg,
            "status": status.as_u16(),
        }))
    }
}

/// Body of like/unlike responses
#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub like_count: i64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

pub(crate) fn ok_message(message: &'static str) -> HttpResponse {
    HttpResponse::Ok().json(MessageResponse { message })
}

/// Register every `/api/v1` route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(users::scope())
            .service(posts::scope())
            .service(reels::scope())
            .service(stories::scope())
            .service(comments::scope())
            .service(messages::scope()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(AppError::not_found("Post").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::forbidden("no").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::AlreadyLiked.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::SelfFollow.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Unauthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
