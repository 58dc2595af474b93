/// Messaging handlers
///
/// Every endpoint here requires an identified caller.
use actix_web::{web, HttpResponse, Scope};
use uuid::Uuid;

use crate::domain::{MessageInput, NewGroup};
use crate::error::AppResult;
use crate::middleware::AuthenticatedUser;
use crate::services::SocialCore;

pub fn scope() -> Scope {
    web::scope("/messages")
        .route("/conversations", web::get().to(list_conversations))
        .route("/conversations/group", web::post().to(create_group))
        .route("/conversations/user/{user_id}", web::post().to(open_direct))
        .route("/conversations/{id}", web::get().to(get_conversation))
        .route("/conversations/{id}/messages", web::post().to(send_message))
        .route("/messages/{id}", web::delete().to(delete_message))
        .route("/messages/{id}/read", web::post().to(mark_read))
}

/// Inbox, most recently updated first
pub async fn list_conversations(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
    let conversations = core.feed.conversation_list(user.0).await?;
    Ok(HttpResponse::Ok().json(conversations))
}

pub async fn create_group(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    req: web::Json<NewGroup>,
) -> AppResult<HttpResponse> {
    let conversation = core.messaging.create_group(user.0, req.into_inner()).await?;
    Ok(HttpResponse::Created().json(conversation))
}

pub async fn open_direct(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let conversation = core.messaging.open_direct(user.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(conversation))
}

pub async fn get_conversation(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let detail = core
        .messaging
        .conversation_detail(user.0, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(detail))
}

pub async fn send_message(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    req: web::Json<MessageInput>,
) -> AppResult<HttpResponse> {
    let message = core
        .messaging
        .send(user.0, path.into_inner(), req.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(message))
}

pub async fn delete_message(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let message = core.messaging.delete_message(user.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(message))
}

pub async fn mark_read(
    core: web::Data<SocialCore>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let recorded = core.ledger.mark_read(user.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "recorded": recorded })))
}
