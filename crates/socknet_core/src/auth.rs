/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::accounts::verify_password;
use crate::api::AppState;
use crate::error::{SocialError, SocialResult};
use crate::social_db::{AuthorRow, NodeRow, SocialDb};
use crate::visibility::Viewer;

/// Header a peer node sets to name the foreign author it is browsing for.
pub const REQUEST_USER_HEADER: &str = "X-Request-User-ID";

#[derive(Debug, Clone)]
pub enum Caller {
    Local { username: String, author: Option<AuthorRow> },
    Node { node: NodeRow, on_behalf_of: Option<Uuid> },
}

impl Caller {
    pub fn viewer(&self) -> Viewer {
        match self {
            Caller::Local { author: Some(a), .. } => Viewer::LocalAuthor(a.id),
            Caller::Local { author: None, .. } => Viewer::Anonymous,
            Caller::Node { on_behalf_of: Some(id), .. } => Viewer::ForeignAuthor(*id),
            Caller::Node { node, .. } => Viewer::Node(node.id),
        }
    }

    pub fn author(&self) -> Option<&AuthorRow> {
        match self {
            Caller::Local { author, .. } => author.as_ref(),
            Caller::Node { .. } => None,
        }
    }

    /// The local author making the call, for routes only local authors may use.
    pub fn require_author(&self) -> SocialResult<&AuthorRow> {
        self.author().ok_or(SocialError::Forbidden)
    }

    pub fn node(&self) -> Option<&NodeRow> {
        match self {
            Caller::Node { node, .. } => Some(node),
            Caller::Local { .. } => None,
        }
    }

    pub fn is_author(&self, id: Uuid) -> bool {
        self.author().is_some_and(|a| a.id == id)
    }
}

/// Extractor for every `/api` route: HTTP Basic as an active local user or as a peer node.
pub struct Authenticated(pub Caller);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = SocialError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (username, password) = basic_credentials(&parts.headers).ok_or(SocialError::Unauthorized)?;
        let on_behalf_of = parts
            .headers
            .get(REQUEST_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok());
        let caller = state
            .db
            .blocking(move |db| authenticate(db, &username, &password, on_behalf_of))
            .await?;
        match caller {
            Some(c) => Ok(Authenticated(c)),
            None => Err(SocialError::Unauthorized),
        }
    }
}

/// Extractor for `/admin` routes: `Authorization: Bearer <admin_token>`.
pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = SocialError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.cfg.admin_token.as_deref() else {
            return Err(SocialError::Forbidden);
        };
        let Some(token) = bearer_token(&parts.headers) else {
            return Err(SocialError::Forbidden);
        };
        if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
            warn!("admin token rejected");
            return Err(SocialError::Forbidden);
        }
        Ok(AdminAuth)
    }
}

pub fn authenticate(
    db: &SocialDb,
    username: &str,
    password: &str,
    on_behalf_of: Option<Uuid>,
) -> SocialResult<Option<Caller>> {
    if let Some(user) = db.get_user(username)? {
        if user.is_active && verify_password(&user.password_hash, password) {
            let author = db.get_author_by_username(username)?;
            return Ok(Some(Caller::Local {
                username: user.username,
                author,
            }));
        }
    }
    for node in db.get_nodes_by_username(username)? {
        if verify_password(&node.password_hash, password) {
            let on_behalf_of = match on_behalf_of {
                Some(id) => hosted_author(db, &node, id)?,
                None => None,
            };
            return Ok(Some(Caller::Node { node, on_behalf_of }));
        }
    }
    debug!(username = %username, "basic auth rejected");
    Ok(None)
}

/// A node may only browse for a foreign author it hosts. Anything else
/// leaves the call as the node itself.
fn hosted_author(db: &SocialDb, node: &NodeRow, id: Uuid) -> SocialResult<Option<Uuid>> {
    match db.get_foreign_author(id)? {
        Some(foreign) if foreign.node_id == node.id => Ok(Some(foreign.id)),
        _ => {
            debug!(node = %node.url, author = %id, "request user header ignored");
            Ok(None)
        }
    }
}

pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let v = headers.get("Authorization")?.to_str().ok()?.trim();
    let encoded = v.strip_prefix("Basic ").or_else(|| v.strip_prefix("basic "))?;
    let decoded = B64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    if user.is_empty() {
        return None;
    }
    Some((user.to_string(), pass.to_string()))
}

pub fn basic_header(username: &str, password: &str) -> String {
    format!("Basic {}", B64.encode(format!("{username}:{password}")))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let v = headers.get("Authorization")?.to_str().ok()?.trim().to_string();
    let v = v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer "))?;
    let v = v.trim();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

/// Compares digests so the running time does not depend on where the inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let da = Sha256::digest(a);
    let db = Sha256::digest(b);
    da.iter().zip(db.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
