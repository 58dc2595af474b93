/// Story handlers
use actix_web::{web, HttpResponse, Scope};
use uuid::Uuid;

use crate::domain::{ContentKind, NewStory};
use crate::error::AppResult;
use crate::middleware::{AuthenticatedUser, Viewer};
use crate::services::SocialCore;

pub fn scope() -> Scope {
    web::scope("/stories")
        .route("", web::post().to(create_story))
        .route("/feed", web::get().to(story_tray))
        .route("/{id}", web::get().to(get_story))
        .route("/{id}", web::delete().to(delete_story))
}

/// Active stories grouped by owner
pub async fn story_tray(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
    let tray = core.feed.story_tray(user.0).await?;
    Ok(HttpResponse::Ok().json(tray))
}

pub async fn create_story(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    req: web::Json<NewStory>,
) -> AppResult<HttpResponse> {
    let story = core.content.create_story(user.0, req.into_inner()).await?;
    Ok(HttpResponse::Created().json(story))
}

pub async fn get_story(
    core: web::Data<SocialCore>,
    viewer: Viewer,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let story = core.content.get_story(viewer.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(story))
}

pub async fn delete_story(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    core.content
        .delete(user.0, ContentKind::Story, path.into_inner())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
