/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use socknet_core::accounts::hash_password;
use socknet_core::api::{router, AppState};
use socknet_core::auth::basic_header;
use socknet_core::config::ServerConfig;
use socknet_core::social_db::{AuthorRow, NodeRow};
use tempfile::TempDir;
use tower::ServiceExt;

pub const HOST: &str = "http://socknet.test/api";
pub const ADMIN_TOKEN: &str = "test-admin-token";

pub struct TestApp {
    _dir: TempDir,
    pub state: AppState,
    app: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ServerConfig {
            public_url: HOST.to_string(),
            db_path: Some(dir.path().join("socknet.db")),
            admin_token: Some(ADMIN_TOKEN.to_string()),
            retry_attempts: 1,
            http_timeout_secs: 5,
            ..ServerConfig::default()
        };
        let state = AppState::new(cfg).unwrap();
        let app = router(state.clone());
        Self { _dir: dir, state, app }
    }

    /// An approved user with an author, plus the Authorization header to act as it.
    pub fn author(&self, username: &str) -> (AuthorRow, String) {
        let db = &self.state.db;
        assert!(db.create_user(username, &hash_password("password").unwrap(), false).unwrap());
        db.set_user_active(username, true).unwrap();
        let author = db.create_author(username, username).unwrap();
        (author, basic_header(username, "password"))
    }

    /// A peer node at `url` that authenticates to us as `username`/`password`.
    pub fn node(&self, url: &str, username: &str, password: &str) -> NodeRow {
        self.state
            .db
            .upsert_node(username, url, username, &hash_password(password).unwrap(), "us", "secret")
            .unwrap()
    }

    pub async fn raw(&self, req: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(req).await.unwrap()
    }

    pub async fn call(&self, method: Method, uri: &str, auth: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let req = match body {
            Some(v) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = self.raw(req).await;
        let status = resp.status();
        (status, body_json(resp).await)
    }

    pub async fn get(&self, uri: &str, auth: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(auth), None).await
    }

    pub async fn post(&self, uri: &str, auth: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(auth), Some(body)).await
    }
}

pub async fn body_json(resp: Response<Body>) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}

pub fn admin_header() -> String {
    format!("Bearer {ADMIN_TOKEN}")
}
