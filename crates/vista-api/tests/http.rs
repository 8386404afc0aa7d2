use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use vista_api::auth::{AppState, AppStateInner};
use vista_api::media::MemoryStore;
use vista_api::routes::build_router;
use vista_db::Database;

fn app() -> Router {
    let state: AppState = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        jwt_secret: "test-secret".into(),
        media: Arc::new(MemoryStore::default()),
    });
    build_router(state)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn form(uri: &str, token: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn register(app: &Router, username: &str) -> String {
    let body = json!({
        "username": username,
        "email": format!("{}@example.com", username),
        "password": "correct horse",
    });
    let (status, json) = send(app, json_post("/auth/register", body)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", json);
    json["token"].as_str().unwrap().to_string()
}

async fn upload_png(app: &Router, token: &str) -> String {
    let req = Request::post("/media")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "image/png")
        .body(Body::from(vec![0x89, b'P', b'N', b'G']))
        .unwrap();
    let (status, json) = send(app, req).await;
    assert_eq!(status, StatusCode::CREATED, "{}", json);
    json["media_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public_and_the_rest_needs_a_token() {
    let app = app();
    let resp = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (status, json) = send(&app, Request::get("/feed").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);

    let (status, _) = send(&app, get("/feed", "not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_and_login() {
    let app = app();
    register(&app, "alice").await;

    let again = json!({"username": "alice", "email": "other@example.com", "password": "correct horse"});
    let (status, json) = send(&app, json_post("/auth/register", again)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "username is already taken");

    let short = json!({"username": "bob", "email": "bob@example.com", "password": "short"});
    let (status, _) = send(&app, json_post("/auth/register", short)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bad_handle = json!({"username": "no spaces", "email": "x@example.com", "password": "correct horse"});
    let (status, _) = send(&app, json_post("/auth/register", bad_handle)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let login = json!({"username": "alice", "password": "correct horse"});
    let (status, json) = send(&app, json_post("/auth/login", login)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["username"], "alice");

    let wrong = json!({"username": "alice", "password": "wrong password"});
    let (status, _) = send(&app, json_post("/auth/login", wrong)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn media_upload_validates_and_serves() {
    let app = app();
    let token = register(&app, "alice").await;

    let media_id = upload_png(&app, &token).await;
    let resp = app
        .clone()
        .oneshot(Request::get(format!("/media/{}", media_id)).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], &[0x89, b'P', b'N', b'G']);

    let req = Request::post("/media")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/pdf")
        .body(Body::from("%PDF"))
        .unwrap();
    let (status, json) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json["success"], false);

    let (status, _) = send(&app, get("/media/not-a-uuid", &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn like_toggle_round_trip() {
    let app = app();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    let media_id = upload_png(&app, &alice).await;
    let (status, json) = send(&app, form("/posts", &alice, &format!("media_id={}&caption=hi", media_id))).await;
    assert_eq!(status, StatusCode::CREATED);
    let post_id = json["post"]["id"].as_str().unwrap().to_string();

    let body = format!("post_id={}", post_id);
    let (_, json) = send(&app, form("/ajax/like-post", &bob, &body)).await;
    assert_eq!(json, json!({"success": true, "liked": true, "likes_count": 1}));
    let (_, json) = send(&app, form("/ajax/like-post", &bob, &body)).await;
    assert_eq!(json, json!({"success": true, "liked": false, "likes_count": 0}));

    let (_, json) = send(&app, get("/notifications", &alice)).await;
    assert_eq!(json["unread_count"], 1);
    assert_eq!(json["notifications"][0]["kind"], "like");

    let (status, json) = send(&app, form("/ajax/like-post", &bob, "post_id=missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json, json!({"success": false, "error": "post not found"}));
}

#[tokio::test]
async fn group_lifecycle_over_http() {
    let app = app();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let carol = register(&app, "carol").await;

    let (status, json) = send(
        &app,
        form("/ajax/create-group", &alice, "group_name=trip&participants=bob&participants=carol"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    let group = json["conversation_id"].as_str().unwrap().to_string();

    let (status, json) = send(
        &app,
        form("/ajax/remove-group-member", &bob, &format!("conversation_id={}&username=carol", group)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["success"], false);

    let (status, _) = send(
        &app,
        form("/ajax/remove-group-member", &alice, &format!("conversation_id={}&username=bob", group)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        form("/ajax/send-message", &bob, &format!("conversation_id={}&text=hello", group)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, json) = send(&app, form("/ajax/leave-group", &alice, &format!("conversation_id={}", group))).await;
    assert_eq!(json, json!({"success": true, "deleted": false}));

    let (_, json) = send(&app, get(&format!("/conversations/{}", group), &carol)).await;
    assert_eq!(json["conversation"]["admin"]["username"], "carol");
    let texts: Vec<_> = json["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(texts, vec!["bob was removed from the group", "alice left the group"]);

    let (_, json) = send(&app, form("/ajax/leave-group", &carol, &format!("conversation_id={}", group))).await;
    assert_eq!(json, json!({"success": true, "deleted": true}));

    let (status, _) = send(&app, get(&format!("/conversations/{}", group), &carol)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn direct_conversation_and_unread_flags() {
    let app = app();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    let (_, json) = send(&app, form("/ajax/create-conversation", &alice, "participants=bob")).await;
    let conv = json["conversation_id"].as_str().unwrap().to_string();
    let (_, json) = send(&app, form("/ajax/create-conversation", &bob, "participants=alice")).await;
    assert_eq!(json["conversation_id"], conv.as_str());

    let (status, _) = send(&app, form("/ajax/create-conversation", &alice, "participants=nobody")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, json) = send(
        &app,
        form("/ajax/send-message", &alice, &format!("conversation_id={}&text=hey", conv)),
    )
    .await;
    assert_eq!(json["message"]["text"], "hey");

    let (_, json) = send(&app, get("/conversations", &bob)).await;
    assert_eq!(json["conversations"][0]["has_unread"], true);
    send(&app, get(&format!("/conversations/{}", conv), &bob)).await;
    let (_, json) = send(&app, get("/conversations", &bob)).await;
    assert_eq!(json["conversations"][0]["has_unread"], false);
}
