/// User handlers - registration, profiles, follow graph and search
use actix_web::{web, HttpResponse, Scope};
use serde::Deserialize;
use uuid::Uuid;

use super::ok_message;
use crate::domain::{NewAccount, ProfileUpdate};
use crate::error::AppResult;
use crate::middleware::{AuthenticatedUser, Viewer};
use crate::services::SocialCore;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PrivacyRequest {
    pub is_private: bool,
}

pub fn scope() -> Scope {
    // Fixed segments before `/{username}`
    web::scope("/users")
        .route("", web::post().to(register))
        .route("/search", web::get().to(search))
        .route("/suggestions", web::get().to(suggestions))
        .route("/saved-posts", web::get().to(saved_posts))
        .route("/profile", web::put().to(update_profile))
        .route("/privacy", web::put().to(set_privacy))
        .route("/{username}", web::get().to(get_profile))
        .route("/{username}/posts", web::get().to(profile_posts))
        .route("/{username}/reels", web::get().to(profile_reels))
        .route("/{username}/stories", web::get().to(profile_stories))
        .route("/{id}/follow", web::post().to(follow))
        .route("/{id}/unfollow", web::post().to(unfollow))
        .route("/{id}/followers", web::get().to(followers))
        .route("/{id}/following", web::get().to(following))
}

/// Register a new account
pub async fn register(
    core: web::Data<SocialCore>,
    req: web::Json<NewAccount>,
) -> AppResult<HttpResponse> {
    let account = core.accounts.register(req.into_inner()).await?;
    Ok(HttpResponse::Created().json(account))
}

pub async fn search(
    core: web::Data<SocialCore>,
    query: web::Query<SearchQuery>,
) -> AppResult<HttpResponse> {
    let results = core
        .accounts
        .search(query.q.as_deref().unwrap_or_default())
        .await?;
    Ok(HttpResponse::Ok().json(results))
}

pub async fn suggestions(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
    let suggestions = core.relationships.suggestions(user.0).await?;
    Ok(HttpResponse::Ok().json(suggestions))
}

pub async fn saved_posts(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
    let saved = core.feed.saved_posts(user.0).await?;
    Ok(HttpResponse::Ok().json(saved))
}

pub async fn update_profile(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    req: web::Json<ProfileUpdate>,
) -> AppResult<HttpResponse> {
    let account = core.accounts.update_profile(user.0, req.into_inner()).await?;
    Ok(HttpResponse::Ok().json(account))
}

pub async fn set_privacy(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    req: web::Json<PrivacyRequest>,
) -> AppResult<HttpResponse> {
    core.accounts.set_privacy(user.0, req.is_private).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "is_private": req.is_private })))
}

pub async fn get_profile(
    core: web::Data<SocialCore>,
    viewer: Viewer,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let profile = core.accounts.profile(viewer.0, &path).await?;
    Ok(HttpResponse::Ok().json(profile))
}

pub async fn profile_posts(
    core: web::Data<SocialCore>,
    viewer: Viewer,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let posts = core.feed.profile_posts(viewer.0, &path).await?;
    Ok(HttpResponse::Ok().json(posts))
}

pub async fn profile_reels(
    core: web::Data<SocialCore>,
    viewer: Viewer,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let reels = core.feed.profile_reels(viewer.0, &path).await?;
    Ok(HttpResponse::Ok().json(reels))
}

pub async fn profile_stories(
    core: web::Data<SocialCore>,
    viewer: Viewer,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let stories = core.feed.profile_stories(viewer.0, &path).await?;
    Ok(HttpResponse::Ok().json(stories))
}

pub async fn follow(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    core.relationships.follow(user.0, path.into_inner()).await?;
    Ok(ok_message("Followed"))
}

pub async fn unfollow(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    core.relationships.unfollow(user.0, path.into_inner()).await?;
    Ok(ok_message("Unfollowed"))
}

pub async fn followers(
    core: web::Data<SocialCore>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let followers = core.relationships.followers(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(followers))
}

pub async fn following(
    core: web::Data<SocialCore>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let following = core.relationships.following(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(following))
}
