//! HTTP-level tests against the full router wired to the in-memory store

use actix_web::{http::StatusCode, test, web, App};
use serde_json::{json, Value};
use uuid::Uuid;

use social_service::config::FeedConfig;
use social_service::domain::NewAccount;
use social_service::handlers;
use social_service::middleware::VIEWER_HEADER;
use social_service::repository::{ContentStore, Stores};
use social_service::SocialCore;

fn core() -> web::Data<SocialCore> {
    web::Data::new(SocialCore::new(Stores::in_memory(), FeedConfig::default()))
}

macro_rules! app {
    ($core:expr) => {
        test::init_service(
            App::new()
                .app_data($core.clone())
                .configure(handlers::configure),
        )
        .await
    };
}

async fn account(core: &SocialCore, name: &str, is_private: bool) -> Uuid {
    core.accounts
        .register(NewAccount {
            username: name.into(),
            email: format!("{name}@example.com"),
            full_name: name.into(),
            is_private,
        })
        .await
        .unwrap()
        .id
}

fn as_user(req: test::TestRequest, user: Uuid) -> test::TestRequest {
    req.insert_header((VIEWER_HEADER, user.to_string()))
}

fn new_post() -> Value {
    json!({ "caption": "sunset", "images": ["https://cdn.example.com/1.jpg"] })
}

#[actix_web::test]
async fn test_register_and_duplicate_username() {
    let core = core();
    let app = app!(core);

    let body = json!({ "username": "alice", "email": "alice@example.com", "full_name": "Alice" });
    let req = test::TestRequest::post()
        .uri("/api/v1/users")
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    assert_eq!(created["username"], "alice");
    assert!(created.get("email").is_none());

    let req = test::TestRequest::post()
        .uri("/api/v1/users")
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_identity_is_required_for_writes() {
    let core = core();
    let app = app!(core);

    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .set_json(new_post())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], 401);

    let req = test::TestRequest::get()
        .uri("/api/v1/posts/explore")
        .insert_header((VIEWER_HEADER, "not-a-uuid"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_private_post_needs_follow() {
    let core = core();
    let app = app!(core);
    let owner = account(&core, "private_owner", true).await;
    let viewer = account(&core, "viewer", false).await;

    let req = as_user(test::TestRequest::post().uri("/api/v1/posts"), owner)
        .set_json(new_post())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let post: Value = test::read_body_json(resp).await;
    let uri = format!("/api/v1/posts/{}", post["id"].as_str().unwrap());

    let req = test::TestRequest::get().uri(&uri).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = as_user(test::TestRequest::get().uri(&uri), viewer).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = as_user(
        test::TestRequest::post().uri(&format!("/api/v1/users/{owner}/follow")),
        viewer,
    )
    .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = as_user(test::TestRequest::get().uri(&uri), viewer).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let seen: Value = test::read_body_json(resp).await;
    assert_eq!(seen["owner"]["username"], "private_owner");
    assert_eq!(seen["is_liked"], false);
}

#[actix_web::test]
async fn test_follow_conflicts() {
    let core = core();
    let app = app!(core);
    let a = account(&core, "alice", false).await;
    let b = account(&core, "bob", false).await;

    let follow = format!("/api/v1/users/{b}/follow");
    let req = as_user(test::TestRequest::post().uri(&follow), a).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    let req = as_user(test::TestRequest::post().uri(&follow), a).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

    let req = as_user(
        test::TestRequest::post().uri(&format!("/api/v1/users/{a}/follow")),
        a,
    )
    .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/users/{b}/followers"))
        .to_request();
    let followers: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(followers.as_array().unwrap().len(), 1);
    assert_eq!(followers[0]["username"], "alice");

    let req = as_user(test::TestRequest::get().uri("/api/v1/users/bob"), a).to_request();
    let profile: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(profile["followers_count"], 1);
    assert_eq!(profile["is_following"], true);
}

#[actix_web::test]
async fn test_like_twice_conflicts_and_unlike_restores_count() {
    let core = core();
    let app = app!(core);
    let owner = account(&core, "owner", false).await;
    let fan = account(&core, "fan", false).await;
    let post = core
        .content
        .create_post(owner, serde_json::from_value(new_post()).unwrap())
        .await
        .unwrap();
    let like = format!("/api/v1/posts/{}/like", post.id);
    let unlike = format!("/api/v1/posts/{}/unlike", post.id);

    let req = as_user(test::TestRequest::post().uri(&like), fan).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["like_count"], 1);

    let req = as_user(test::TestRequest::post().uri(&like), fan).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

    let req = as_user(test::TestRequest::post().uri(&unlike), fan).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["like_count"], 0);

    let req = as_user(test::TestRequest::post().uri(&unlike), fan).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn test_unknown_resources_are_not_found() {
    let core = core();
    let app = app!(core);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/posts/{}", Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], 404);

    let req = test::TestRequest::get()
        .uri("/api/v1/users/nobody")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_feeds_split_circle_from_explore() {
    let core = core();
    let app = app!(core);
    let me = account(&core, "me", false).await;
    let friend = account(&core, "friend", false).await;
    let stranger = account(&core, "stranger", false).await;
    core.relationships.follow(me, friend).await.unwrap();

    for owner in [me, friend, stranger] {
        core.content
            .create_post(owner, serde_json::from_value(new_post()).unwrap())
            .await
            .unwrap();
    }

    let req = as_user(test::TestRequest::get().uri("/api/v1/posts/feed"), me).to_request();
    let home: Value = test::call_and_read_body_json(&app, req).await;
    let home_owners: Vec<&str> = home
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["owner"]["username"].as_str().unwrap())
        .collect();
    assert_eq!(home_owners.len(), 2);
    assert!(!home_owners.contains(&"stranger"));

    let req = as_user(test::TestRequest::get().uri("/api/v1/posts/explore"), me).to_request();
    let explore: Value = test::call_and_read_body_json(&app, req).await;
    let explore = explore.as_array().unwrap();
    assert_eq!(explore.len(), 1);
    assert_eq!(explore[0]["owner"]["username"], "stranger");

    let req = test::TestRequest::get().uri("/api/v1/posts/explore").to_request();
    let anonymous: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(anonymous.as_array().unwrap().len(), 3);
}

#[actix_web::test]
async fn test_story_view_recorded_once() {
    let core = core();
    let app = app!(core);
    let owner = account(&core, "storyteller", false).await;
    let viewer = account(&core, "watcher", false).await;
    let story = core
        .content
        .create_story(
            owner,
            serde_json::from_value(json!({
                "media_url": "https://cdn.example.com/s.jpg",
                "media_type": "image"
            }))
            .unwrap(),
        )
        .await
        .unwrap();
    let uri = format!("/api/v1/stories/{}", story.id);

    for _ in 0..2 {
        let req = as_user(test::TestRequest::get().uri(&uri), viewer).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    let stored = core.stores.content.get_content(story.id).await.unwrap().unwrap();
    assert_eq!(stored.story_viewers().len(), 1);
    assert!(stored.viewed_by(viewer));

    core.relationships.follow(viewer, owner).await.unwrap();
    let req = as_user(test::TestRequest::get().uri("/api/v1/stories/feed"), viewer).to_request();
    let tray: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(tray[0]["owner"]["username"], "storyteller");
    assert_eq!(tray[0]["all_viewed"], true);
}

#[actix_web::test]
async fn test_direct_messaging_flow() {
    let core = core();
    let app = app!(core);
    let a = account(&core, "alice", false).await;
    let b = account(&core, "bob", false).await;
    let eve = account(&core, "eve", false).await;

    let open = format!("/api/v1/messages/conversations/user/{b}");
    let req = as_user(test::TestRequest::post().uri(&open), a).to_request();
    let first: Value = test::call_and_read_body_json(&app, req).await;
    let req = as_user(
        test::TestRequest::post().uri(&format!("/api/v1/messages/conversations/user/{a}")),
        b,
    )
    .to_request();
    let second: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(first["id"], second["id"]);
    let conversation = first["id"].as_str().unwrap().to_string();

    let req = as_user(
        test::TestRequest::post()
            .uri(&format!("/api/v1/messages/conversations/{conversation}/messages")),
        a,
    )
    .set_json(json!({ "text": "hi bob" }))
    .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    let req = as_user(test::TestRequest::get().uri("/api/v1/messages/conversations"), b).to_request();
    let inbox: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(inbox[0]["unread_count"], 1);
    assert_eq!(inbox[0]["last_message"]["text"], "hi bob");

    let detail_uri = format!("/api/v1/messages/conversations/{conversation}");
    let req = as_user(test::TestRequest::get().uri(&detail_uri), b).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = as_user(test::TestRequest::get().uri("/api/v1/messages/conversations"), b).to_request();
    let inbox: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(inbox[0]["unread_count"], 0);

    let req = as_user(test::TestRequest::get().uri(&detail_uri), eve).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
}
