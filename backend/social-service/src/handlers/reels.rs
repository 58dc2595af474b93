/// Reel handlers
use actix_web::{web, HttpResponse, Scope};
use uuid::Uuid;

use super::LikeResponse;
use crate::domain::{ContentKind, ContentUpdate, EngagementTarget, NewReel, TargetKind};
use crate::error::AppResult;
use crate::middleware::{AuthenticatedUser, Viewer};
use crate::services::SocialCore;

pub fn scope() -> Scope {
    web::scope("/reels")
        .route("", web::post().to(create_reel))
        .route("/feed", web::get().to(reels_feed))
        .route("/{id}", web::get().to(get_reel))
        .route("/{id}", web::put().to(update_reel))
        .route("/{id}", web::delete().to(delete_reel))
        .route("/{id}/like", web::post().to(like_reel))
        .route("/{id}/unlike", web::post().to(unlike_reel))
        .route("/{id}/view", web::post().to(view_reel))
}

pub async fn reels_feed(
    core: web::Data<SocialCore>,
    viewer: Viewer,
) -> AppResult<HttpResponse> {
    let feed = core.feed.reels_feed(viewer.0).await?;
    Ok(HttpResponse::Ok().json(feed))
}

pub async fn create_reel(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    req: web::Json<NewReel>,
) -> AppResult<HttpResponse> {
    let reel = core.content.create_reel(user.0, req.into_inner()).await?;
    Ok(HttpResponse::Created().json(reel))
}

/// Fetching a reel counts as a view
pub async fn get_reel(
    core: web::Data<SocialCore>,
    viewer: Viewer,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let reel = core.content.get_reel(viewer.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(reel))
}

pub async fn update_reel(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    req: web::Json<ContentUpdate>,
) -> AppResult<HttpResponse> {
    let reel = core
        .content
        .update_reel(user.0, path.into_inner(), req.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(reel))
}

pub async fn delete_reel(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    core.content
        .delete(user.0, ContentKind::Reel, path.into_inner())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn like_reel(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let like_count = core
        .ledger
        .like(user.0, EngagementTarget::new(TargetKind::Reel, path.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(LikeResponse { like_count }))
}

pub async fn unlike_reel(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let like_count = core
        .ledger
        .unlike(user.0, EngagementTarget::new(TargetKind::Reel, path.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(LikeResponse { like_count }))
}

pub async fn view_reel(
    core: web::Data<SocialCore>,
    viewer: Viewer,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let views = core
        .ledger
        .record_reel_view(viewer.0, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "views": views })))
}
