/// Post handlers - CRUD, feeds, likes, saves and archiving
use actix_web::{web, HttpResponse, Scope};
use serde::Deserialize;
use uuid::Uuid;

use super::{ok_message, LikeResponse};
use crate::domain::{ContentKind, ContentUpdate, EngagementTarget, NewPost, TargetKind};
use crate::error::AppResult;
use crate::middleware::{AuthenticatedUser, Viewer};
use crate::services::SocialCore;

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    #[serde(default = "default_archived")]
    pub archived: bool,
}

fn default_archived() -> bool {
    true
}

pub fn scope() -> Scope {
    web::scope("/posts")
        .route("", web::post().to(create_post))
        .route("/feed", web::get().to(home_feed))
        .route("/explore", web::get().to(explore_feed))
        .route("/{id}", web::get().to(get_post))
        .route("/{id}", web::put().to(update_post))
        .route("/{id}", web::delete().to(delete_post))
        .route("/{id}/like", web::post().to(like_post))
        .route("/{id}/unlike", web::post().to(unlike_post))
        .route("/{id}/save", web::post().to(save_post))
        .route("/{id}/unsave", web::post().to(unsave_post))
        .route("/{id}/archive", web::post().to(archive_post))
}

/// Posts from the viewer and followed accounts, newest first
pub async fn home_feed(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
    let feed = core.feed.home_feed(user.0).await?;
    Ok(HttpResponse::Ok().json(feed))
}

pub async fn explore_feed(
    core: web::Data<SocialCore>,
    viewer: Viewer,
) -> AppResult<HttpResponse> {
    let feed = core.feed.explore_feed(viewer.0).await?;
    Ok(HttpResponse::Ok().json(feed))
}

pub async fn create_post(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    req: web::Json<NewPost>,
) -> AppResult<HttpResponse> {
    let post = core.content.create_post(user.0, req.into_inner()).await?;
    Ok(HttpResponse::Created().json(post))
}

pub async fn get_post(
    core: web::Data<SocialCore>,
    viewer: Viewer,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let post = core.content.get_post(viewer.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

pub async fn update_post(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    req: web::Json<ContentUpdate>,
) -> AppResult<HttpResponse> {
    let post = core
        .content
        .update_post(user.0, path.into_inner(), req.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(post))
}

pub async fn delete_post(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    core.content
        .delete(user.0, ContentKind::Post, path.into_inner())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn like_post(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let like_count = core
        .ledger
        .like(user.0, EngagementTarget::new(TargetKind::Post, path.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(LikeResponse { like_count }))
}

pub async fn unlike_post(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let like_count = core
        .ledger
        .unlike(user.0, EngagementTarget::new(TargetKind::Post, path.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(LikeResponse { like_count }))
}

pub async fn save_post(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    core.ledger.save(user.0, path.into_inner()).await?;
    Ok(ok_message("Post saved"))
}

pub async fn unsave_post(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    core.ledger.unsave(user.0, path.into_inner()).await?;
    Ok(ok_message("Post removed from saved"))
}

/// Archive (default) or restore an owned post
pub async fn archive_post(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    req: Option<web::Json<ArchiveRequest>>,
) -> AppResult<HttpResponse> {
    let archived = req.map(|r| r.archived).unwrap_or_else(default_archived);
    let post = core
        .content
        .archive(user.0, ContentKind::Post, path.into_inner(), archived)
        .await?;
    Ok(HttpResponse::Ok().json(post))
}
