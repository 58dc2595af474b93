/// HTTP request utilities for social-service
///
/// The gateway authenticates callers and forwards the account id in the
/// `X-User-Id` header. These extractors read it.
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::error::AppError;

pub const VIEWER_HEADER: &str = "X-User-Id";

/// Parse the viewer header. Absent means anonymous; present but not a UUID is an error.
fn viewer_from_headers(req: &HttpRequest) -> Result<Option<Uuid>, AppError> {
    let Some(value) = req.headers().get(VIEWER_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .map(Some)
        .ok_or(AppError::Unauthenticated)
}

/// Possibly anonymous caller
#[derive(Debug, Clone, Copy)]
pub struct Viewer(pub Option<Uuid>);

impl FromRequest for Viewer {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(viewer_from_headers(req).map(Viewer))
    }
}

/// Caller that must be identified; anonymous requests get 401
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Uuid);

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(match viewer_from_headers(req) {
            Ok(Some(id)) => Ok(AuthenticatedUser(id)),
            Ok(None) => Err(AppError::Unauthenticated),
            Err(err) => Err(err),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[actix_rt::test]
    async fn missing_header_is_anonymous() {
        let req = TestRequest::default().to_http_request();
        let viewer = Viewer::extract(&req).await.unwrap();
        assert!(viewer.0.is_none());
        assert!(AuthenticatedUser::extract(&req).await.is_err());
    }

    #[actix_rt::test]
    async fn malformed_header_is_rejected() {
        let req = TestRequest::default()
            .insert_header((VIEWER_HEADER, "not-a-uuid"))
            .to_http_request();
        assert!(matches!(
            Viewer::extract(&req).await,
            Err(AppError::Unauthenticated)
        ));
    }

    #[actix_rt::test]
    async fn valid_header_identifies_viewer() {
        let id = Uuid::new_v4();
        let req = TestRequest::default()
            .insert_header((VIEWER_HEADER, id.to_string()))
            .to_http_request();
        assert_eq!(AuthenticatedUser::extract(&req).await.unwrap().0, id);
    }
}
