/// Comment handlers
use actix_web::{web, HttpResponse, Scope};
use uuid::Uuid;

use super::LikeResponse;
use crate::domain::{CommentInput, EngagementTarget, TargetKind};
use crate::error::AppResult;
use crate::middleware::{AuthenticatedUser, Viewer};
use crate::services::SocialCore;

pub fn scope() -> Scope {
    web::scope("/comments")
        .route("/content/{id}", web::post().to(create_comment))
        .route("/content/{id}", web::get().to(list_comments))
        .route("/{id}/reply", web::post().to(reply))
        .route("/{id}", web::put().to(update_comment))
        .route("/{id}", web::delete().to(delete_comment))
        .route("/{id}/like", web::post().to(like_comment))
        .route("/{id}/unlike", web::post().to(unlike_comment))
}

pub async fn create_comment(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    req: web::Json<CommentInput>,
) -> AppResult<HttpResponse> {
    let comment = core
        .comments
        .create(user.0, path.into_inner(), req.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(comment))
}

/// Top-level comments with their replies
pub async fn list_comments(
    core: web::Data<SocialCore>,
    viewer: Viewer,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let threads = core.comments.list(viewer.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(threads))
}

pub async fn reply(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    req: web::Json<CommentInput>,
) -> AppResult<HttpResponse> {
    let comment = core
        .comments
        .reply(user.0, path.into_inner(), req.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(comment))
}

pub async fn update_comment(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    req: web::Json<CommentInput>,
) -> AppResult<HttpResponse> {
    let comment = core
        .comments
        .update(user.0, path.into_inner(), req.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(comment))
}

pub async fn delete_comment(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    core.comments.delete(user.0, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn like_comment(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let like_count = core
        .ledger
        .like(user.0, EngagementTarget::new(TargetKind::Comment, path.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(LikeResponse { like_count }))
}

pub async fn unlike_comment(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let like_count = core
        .ledger
        .unlike(user.0, EngagementTarget::new(TargetKind::Comment, path.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(LikeResponse { like_count }))
}
