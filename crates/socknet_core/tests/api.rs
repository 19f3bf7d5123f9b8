/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::io::Cursor;
use uuid::Uuid;

use common::{admin_header, body_json, TestApp, HOST};

fn new_post(title: &str, visibility: &str) -> Value {
    json!({ "title": title, "content": format!("{title} body"), "visibility": visibility })
}

async fn create_post(app: &TestApp, auth: &str, title: &str, visibility: &str) -> String {
    let (status, body) = app.post("/api/posts", auth, new_post(title, visibility)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["posts"]["id"].as_str().unwrap().to_string()
}

async fn befriend(app: &TestApp, a: (&Uuid, &str), b: (&Uuid, &str)) {
    let (status, _) = app
        .post(
            &format!("/api/author/{}/friends", a.0),
            a.1,
            json!({ "action": "follow", "friend": { "id": b.0.to_string() } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app
        .post(
            &format!("/api/author/{}/friends", b.0),
            b.1,
            json!({ "action": "accept_friend_request", "friend": { "id": a.0.to_string(), "is_local": true } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn health_endpoints_carry_request_id_and_security_headers() {
    let app = TestApp::new();
    let resp = app
        .raw(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("x-request-id").is_some());
    assert_eq!(resp.headers().get("x-content-type-options").unwrap(), "nosniff");

    let resp = app
        .raw(
            Request::builder()
                .uri("/readyz")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("x-request-id").unwrap(), "abc-123");
}

#[tokio::test]
async fn api_requires_basic_auth() {
    let app = TestApp::new();
    let (status, _) = app.call(Method::GET, "/api/posts", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let resp = app
        .raw(
            Request::builder()
                .uri("/api/posts")
                .header(header::AUTHORIZATION, socknet_core::auth::basic_header("ghost", "nope"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().get(header::WWW_AUTHENTICATE).is_some());
}

#[tokio::test]
async fn registration_then_admin_approval() {
    let app = TestApp::new();
    let (status, _) = app
        .call(
            Method::POST,
            "/register",
            None,
            Some(json!({ "username": "dana", "password": "pw1", "confirm_password": "pw1" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .call(
            Method::POST,
            "/register",
            None,
            Some(json!({ "username": "erin", "password": "a", "confirm_password": "b" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let dana = socknet_core::auth::basic_header("dana", "pw1");
    let (status, _) = app.get("/api/posts", &dana).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/admin/users", "Bearer wrong").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app.get("/admin/users", &admin_header()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"][0]["username"], "dana");
    assert_eq!(body["users"][0]["approved"], false);

    let (status, body) = app
        .post("/admin/users/approve", &admin_header(), json!({ "usernames": ["dana"] }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["approved"][0]["username"], "dana");

    let (status, _) = app.get("/api/posts", &dana).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn public_posts_are_paged() {
    let app = TestApp::new();
    let (_, auth) = app.author("user1");
    for i in 0..12 {
        create_post(&app, &auth, &format!("post {i}"), "PUBLIC").await;
    }
    create_post(&app, &auth, "secret", "PRIVATE").await;

    let (status, body) = app.get("/api/posts", &auth).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "posts");
    assert_eq!(body["count"], 12);
    assert_eq!(body["size"], 10);
    assert_eq!(body["posts"].as_array().unwrap().len(), 10);
    assert_eq!(body["posts"][0]["title"], "post 11");
    assert_eq!(body["next"], format!("{HOST}/posts?page=2&size=10"));
    assert!(body.get("previous").is_none());

    let (_, body) = app.get("/api/posts?page=99&size=5", &auth).await;
    assert_eq!(body["posts"].as_array().unwrap().len(), 2);
    assert!(body.get("next").is_none());

    let (_, body) = app.get("/api/posts?page=abc", &auth).await;
    assert_eq!(body["posts"][0]["title"], "post 11");

    let post = &body["posts"][0];
    assert_eq!(post["description"], "No description provided.");
    assert_eq!(post["contentType"], "text/plain");
    assert_eq!(post["categories"], "N/A");
    assert_eq!(post["author"]["displayName"], "user1");
    assert_eq!(post["author"]["host"], HOST);
}

#[tokio::test]
async fn missing_post_uses_legacy_error_key() {
    let app = TestApp::new();
    let (_, auth) = app.author("user1");
    let (status, body) = app.get(&format!("/api/posts/{}", Uuid::new_v4()), &auth).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "Error": "Post does not exist" }));
    let (status, _) = app.get("/api/posts/not-a-uuid", &auth).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_the_owner_edits_or_deletes() {
    let app = TestApp::new();
    let (_, owner) = app.author("owner");
    let (_, other) = app.author("other");
    let id = create_post(&app, &owner, "mine", "PUBLIC").await;

    let (status, _) = app
        .call(Method::PUT, &format!("/api/posts/{id}"), Some(&other), Some(new_post("hijack", "PUBLIC")))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(Method::PUT, &format!("/api/posts/{id}"), Some(&owner), Some(new_post("edited", "FRIENDS")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["posts"]["title"], "edited");
    assert_eq!(body["posts"]["visibility"], "FRIENDS");

    let (status, _) = app.call(Method::DELETE, &format!("/api/posts/{id}"), Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Method::DELETE, &format!("/api/posts/{id}"), Some(&owner), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&format!("/api/posts/{id}"), &owner).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn friendship_through_the_action_endpoint() {
    let app = TestApp::new();
    let (a, a_auth) = app.author("user1");
    let (b, b_auth) = app.author("user2");

    let (status, _) = app
        .post(
            &format!("/api/author/{}/friends", a.id),
            &b_auth,
            json!({ "action": "follow", "friend": { "id": b.id.to_string() } }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(
            &format!("/api/author/{}/friends", a.id),
            &a_auth,
            json!({ "action": "poke", "friend": { "id": b.id.to_string() } }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            &format!("/api/author/{}/friends", a.id),
            &a_auth,
            json!({ "action": "follow", "friend": { "id": b.id.to_string() } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get(&format!("/api/author/{}/friendrequests", b.id), &b_auth).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["requests"][0]["id"], a.id.to_string());
    let (status, _) = app.get(&format!("/api/author/{}/friendrequests", b.id), &a_auth).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(
            &format!("/api/author/{}/friends", b.id),
            &b_auth,
            json!({ "action": "accept_friend_request", "friend": { "id": a.id.to_string() } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pending"], 0);

    let (status, _) = app
        .post(
            &format!("/api/author/{}/friends", b.id),
            &b_auth,
            json!({ "action": "accept_friend_request", "friend": { "id": a.id.to_string() } }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = app.get(&format!("/api/friends/{}", a.id), &a_auth).await;
    assert_eq!(body, json!({ "query": "friends", "authors": [b.id.to_string()] }));

    let (_, body) = app.get(&format!("/api/friends/{}/{}", a.id, b.id), &a_auth).await;
    assert_eq!(body["friends"], true);
    assert_eq!(body["authors"], json!([a.id.to_string(), b.id.to_string()]));

    let (_, body) = app.get(&format!("/api/author/{}", a.id), &b_auth).await;
    assert_eq!(body["displayName"], "user1");
    assert_eq!(body["friends"][0]["id"], b.id.to_string());

    let (status, _) = app
        .post(
            &format!("/api/author/{}/friends", b.id),
            &b_auth,
            json!({ "action": "unfriend", "friend": { "id": a.id.to_string() } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.get(&format!("/api/friends/{}/{}", b.id, a.id), &a_auth).await;
    assert_eq!(body["friends"], false);
    let (_, body) = app.get(&format!("/api/author/{}/friendrequests", b.id), &b_auth).await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn friends_query_returns_the_intersection() {
    let app = TestApp::new();
    let (a, a_auth) = app.author("user1");
    let (b, b_auth) = app.author("user2");
    let (c, _) = app.author("user3");
    befriend(&app, (&b.id, &b_auth), (&a.id, &a_auth)).await;

    let stranger = Uuid::new_v4().to_string();
    let (status, body) = app
        .post(
            &format!("/api/friends/{}", a.id),
            &a_auth,
            json!({
                "query": "friends",
                "author": a.id.to_string(),
                "authors": [stranger, b.id.to_string(), c.id.to_string(), "garbage"]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["author"], a.id.to_string());
    assert_eq!(body["authors"], json!([b.id.to_string()]));

    let (status, _) = app
        .post(
            &format!("/api/friends/{}", a.id),
            &a_auth,
            json!({ "query": "enemies", "author": a.id.to_string(), "authors": [] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/friends/not-a-uuid",
            &a_auth,
            json!({ "query": "friends", "author": "x", "authors": [] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = Uuid::new_v4();
    let (status, _) = app
        .post(
            &format!("/api/friends/{missing}"),
            &a_auth,
            json!({ "query": "friends", "author": missing.to_string(), "authors": [] }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    for author in ["x".to_string(), c.id.to_string()] {
        let (status, _) = app
            .post(
                &format!("/api/friends/{}", a.id),
                &a_auth,
                json!({ "query": "friends", "author": author, "authors": [b.id.to_string()] }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, _) = app
        .get(&format!("/api/friends/{}/{}", Uuid::new_v4(), Uuid::new_v4()), &a_auth)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn friends_only_posts_and_comments() {
    let app = TestApp::new();
    let (owner, owner_auth) = app.author("owner");
    let (friend, friend_auth) = app.author("friend");
    let (_, stranger_auth) = app.author("stranger");
    befriend(&app, (&friend.id, &friend_auth), (&owner.id, &owner_auth)).await;
    let id = create_post(&app, &owner_auth, "friends only", "FRIENDS").await;

    let (status, _) = app.get(&format!("/api/posts/{id}"), &stranger_auth).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get(&format!("/api/posts/{id}"), &friend_auth).await;
    assert_eq!(status, StatusCode::OK);

    let comment = |text: &str| {
        json!({
            "query": "addComment",
            "post": format!("{HOST}/posts/{id}"),
            "comment": {
                "guid": Uuid::new_v4().to_string(),
                "comment": text,
                "contentType": "text/plain",
                "author": { "id": "ignored", "host": HOST, "displayName": "ignored" }
            }
        })
    };
    let (status, body) = app
        .post(&format!("/api/posts/{id}/comments"), &stranger_auth, comment("let me in"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    for text in ["first", "second"] {
        let (status, body) = app
            .post(&format!("/api/posts/{id}/comments"), &friend_auth, comment(text))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "query": "addComment", "success": true, "message": "Comment Added" }));
    }

    let (_, body) = app.get(&format!("/api/posts/{id}/comments?size=1"), &owner_auth).await;
    assert_eq!(body["query"], "comments");
    assert_eq!(body["count"], 2);
    assert_eq!(body["comments"][0]["comment"], "first");
    assert_eq!(body["comments"][0]["author"]["id"], friend.id.to_string());
    assert_eq!(body["next"], format!("{HOST}/posts/{id}/comments?page=2&size=1"));

    let (_, body) = app.get("/api/author/posts", &stranger_auth).await;
    assert_eq!(body["count"], 0);
    let (_, body) = app.get(&format!("/api/author/{}/posts", owner.id), &friend_auth).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["posts"][0]["count"], 2);
}

fn tiny_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(1, 1, image::Rgb([0, 0, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

#[tokio::test]
async fn images_are_validated_and_served() {
    let app = TestApp::new();
    let (_, owner) = app.author("owner");
    let (_, other) = app.author("other");
    let id = create_post(&app, &owner, "with picture", "PUBLIC").await;

    let upload = |auth: &str, bytes: Vec<u8>, ct: &str| {
        Request::builder()
            .method(Method::POST)
            .uri(format!("/api/posts/{id}/image"))
            .header(header::AUTHORIZATION, auth)
            .header(header::CONTENT_TYPE, ct)
            .body(Body::from(bytes))
            .unwrap()
    };

    let resp = app.raw(upload(&owner, b"not an image".to_vec(), "image/png")).await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let resp = app.raw(upload(&other, tiny_png(), "image/png")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let png = tiny_png();
    let resp = app.raw(upload(&owner, png.clone(), "application/octet-stream")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp).await;
    let image_id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["type"], "image/png");

    let resp = app
        .raw(
            Request::builder()
                .uri(format!("/api/images/{image_id}"))
                .header(header::AUTHORIZATION, &other)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "image/png");
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), png.as_slice());

    let (_, body) = app.get(&format!("/api/posts/{id}"), &other).await;
    assert!(body["posts"]["image"].as_str().unwrap().starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn local_friend_request_endpoint() {
    let app = TestApp::new();
    let (a, a_auth) = app.author("user1");
    let (b, b_auth) = app.author("user2");

    let request = |host: &str| {
        json!({
            "query": "friendrequest",
            "author": { "id": b.id.to_string(), "host": HOST, "displayName": "user2" },
            "friend": { "id": a.id.to_string(), "host": host, "displayName": "user1", "url": format!("{HOST}/author/{}", a.id) }
        })
    };

    let (status, _) = app.post("/api/friendrequest", &a_auth, request("http://unknown.example")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut wrong_query = request(HOST);
    wrong_query["query"] = json!("friends");
    let (status, _) = app.post("/api/friendrequest", &a_auth, wrong_query).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.post("/api/friendrequest", &a_auth, request(HOST)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, body) = app.get(&format!("/api/author/{}/friendrequests", b.id), &b_auth).await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn friend_requests_only_come_from_their_sender() {
    let app = TestApp::new();
    let (a, a_auth) = app.author("user1");
    let (b, b_auth) = app.author("user2");
    let node = app.node("http://peer.example", "peer", "peer-password");
    let node_auth = socknet_core::auth::basic_header("peer", "peer-password");

    let forged = json!({
        "query": "friendrequest",
        "author": { "id": a.id.to_string(), "host": HOST, "displayName": "user1" },
        "friend": { "id": b.id.to_string(), "host": HOST, "displayName": "user2" }
    });
    let (status, _) = app.post("/api/friendrequest", &a_auth, forged.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.post("/api/friendrequest", &node_auth, forged).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = app.get(&format!("/api/author/{}/friendrequests", a.id), &a_auth).await;
    assert_eq!(body["count"], 0);
    let (status, _) = app
        .post(
            &format!("/api/author/{}/friends", a.id),
            &a_auth,
            json!({ "action": "accept_friend_request", "friend": { "id": b.id.to_string(), "is_local": true } }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (_, body) = app.get(&format!("/api/friends/{}/{}", a.id, b.id), &b_auth).await;
    assert_eq!(body["friends"], false);

    let remote = Uuid::new_v4();
    let outbound = json!({
        "query": "friendrequest",
        "author": { "id": remote.to_string(), "host": node.url, "displayName": "remote" },
        "friend": { "id": b.id.to_string(), "host": HOST, "displayName": "user2" }
    });
    let (status, _) = app.post("/api/friendrequest", &a_auth, outbound).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, body) = app.get(&format!("/api/friends/{}/{}", b.id, remote), &b_auth).await;
    assert_eq!(body["friends"], false);
}

#[tokio::test]
async fn admin_manages_nodes_and_authors() {
    let app = TestApp::new();
    let (author, auth) = app.author("doomed");
    create_post(&app, &auth, "last words", "PUBLIC").await;

    let (status, body) = app
        .post(
            "/admin/nodes",
            &admin_header(),
            json!({ "name": "peer", "url": "http://peer.example/api/", "username": "peer", "password": "pw" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["url"], "http://peer.example/api");
    let node_id = body["id"].as_i64().unwrap();

    let (_, body) = app.get("/admin/nodes", &admin_header()).await;
    assert_eq!(body["nodes"].as_array().unwrap().len(), 1);
    assert!(body["nodes"][0].get("password_hash").is_none());

    let (status, _) = app
        .call(Method::DELETE, &format!("/admin/nodes/{node_id}"), Some(&admin_header()), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .call(Method::DELETE, &format!("/admin/nodes/{node_id}"), Some(&admin_header()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(Method::DELETE, &format!("/admin/authors/{}", author.id), Some(&admin_header()), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get("/api/posts", &auth).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authors_edit_their_own_profile() {
    let app = TestApp::new();
    let (a, a_auth) = app.author("user1");
    let (_, b_auth) = app.author("user2");

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/author/{}", a.id),
            Some(&a_auth),
            Some(json!({ "displayName": "Ada", "github": "https://github.com/ada" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["displayName"], "Ada");
    assert_eq!(body["github"], "https://github.com/ada");

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/author/{}", a.id),
            Some(&b_auth),
            Some(json!({ "displayName": "Mallory" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .call(Method::PUT, &format!("/api/author/{}", a.id), Some(&a_auth), Some(json!({ "displayName": " " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.get("/api/authors", &b_auth).await;
    assert_eq!(status, StatusCode::OK);
    let names = body["authors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["displayName"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Ada".to_string(), "user2".to_string()]);
    assert_eq!(body["authors"][0]["host"], HOST);
}

#[tokio::test]
async fn admin_deletes_users() {
    let app = TestApp::new();
    let (_, auth) = app.author("leaving");
    let (status, _) = app
        .call(Method::DELETE, "/admin/users/leaving", Some(&admin_header()), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get("/api/authors", &auth).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app
        .call(Method::DELETE, "/admin/users/leaving", Some(&admin_header()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
