/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Talking to peer nodes: outgoing friend requests, pulling their posts and
//! comments, and routing inbound friend requests to the right side.

use anyhow::{Context, Result};
use futures_util::future::join_all;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use socknet_protocol::{
    AuthorRef, CommentDoc, FriendRequest, PostDoc, RemoteNodeFeed, QUERY_FRIEND_REQUEST,
};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{basic_header, Caller};
use crate::config::ServerConfig;
use crate::error::{SocialError, SocialResult};
use crate::friendship::{InboundOutcome, Party};
use crate::http_retry::send_with_retry;
use crate::render::{foreign_author_ref, local_author_ref};
use crate::social_db::{normalize_url, NodeRow, SocialDb};

#[derive(Clone)]
pub struct NodeClient {
    http: reqwest::Client,
    attempts: u32,
}

impl NodeClient {
    pub fn new(cfg: &ServerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .connect_timeout(Duration::from_secs(cfg.http_connect_timeout_secs))
            .user_agent(concat!("socknet/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("http client init")?;
        Ok(Self {
            http,
            attempts: cfg.retry_attempts,
        })
    }

    fn get(&self, node: &NodeRow, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.get(url).header(ACCEPT, "application/json");
        if !node.foreign_username.is_empty() {
            req = req.header(AUTHORIZATION, basic_header(&node.foreign_username, &node.foreign_password));
        }
        req
    }

    pub async fn send_friend_request(&self, node: &NodeRow, req: &FriendRequest) -> SocialResult<()> {
        let url = format!("{}/friendrequest", node.url.trim_end_matches('/'));
        let resp = send_with_retry(
            || {
                let mut b = self
                    .http
                    .post(&url)
                    .header(CONTENT_TYPE, "application/json")
                    .json(req);
                if !node.foreign_username.is_empty() {
                    b = b.header(AUTHORIZATION, basic_header(&node.foreign_username, &node.foreign_password));
                }
                b
            },
            self.attempts,
        )
        .await
        .map_err(|e| SocialError::Remote(format!("{}: {e}", node.url)))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(node = %node.url, %status, "friend request rejected: {text}");
            return Err(SocialError::Remote(format!("{} answered {status}", node.url)));
        }
        info!(node = %node.url, receiver = %req.author.id, sender = %req.friend.id, "friend request delivered");
        Ok(())
    }

    /// Pulls `/posts/` from every node at once. A failing node yields an
    /// error entry and never hides the others.
    pub async fn fetch_remote_posts(&self, nodes: &[NodeRow]) -> Vec<RemoteNodeFeed> {
        let tasks = nodes.iter().map(|node| async move {
            match self.fetch_node_posts(node).await {
                Ok(posts) => RemoteNodeFeed {
                    node_id: node.id,
                    node: node.url.clone(),
                    posts,
                    error: None,
                },
                Err(e) => {
                    warn!(node = %node.url, "remote posts fetch failed: {e:#}");
                    RemoteNodeFeed {
                        node_id: node.id,
                        node: node.url.clone(),
                        posts: Vec::new(),
                        error: Some(format!("{e:#}")),
                    }
                }
            }
        });
        join_all(tasks).await
    }

    async fn fetch_node_posts(&self, node: &NodeRow) -> Result<Vec<PostDoc>> {
        let url = format!("{}/posts/", node.url.trim_end_matches('/'));
        let body = self.get_json(node, &url).await?;
        Ok(parse_entries(&body, "posts"))
    }

    pub async fn fetch_remote_comments(&self, node: &NodeRow, post_id: &str) -> SocialResult<Vec<CommentDoc>> {
        let url = format!("{}/posts/{}/comments", node.url.trim_end_matches('/'), post_id);
        let body = self
            .get_json(node, &url)
            .await
            .map_err(|e| SocialError::Remote(format!("{e:#}")))?;
        Ok(parse_entries(&body, "comments"))
    }

    async fn get_json(&self, node: &NodeRow, url: &str) -> Result<Value> {
        let resp = send_with_retry(|| self.get(node, url), self.attempts).await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("{url} answered {status}");
        }
        resp.json::<Value>().await.with_context(|| format!("decode {url}"))
    }
}

/// Entries under `key` that decode; the rest are logged and dropped.
fn parse_entries<T: serde::de::DeserializeOwned>(body: &Value, key: &str) -> Vec<T> {
    let Some(items) = body.get(key).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<T>(item.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!("skipping invalid remote {key} entry: {e}");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendRequestOutcome {
    Local,
    Inbound(InboundOutcome),
    Forwarded,
}

/// Where a party of a friend request lives.
enum Side {
    Local,
    Remote(NodeRow),
}

fn side_of(db: &SocialDb, local_host: &str, host: &str) -> SocialResult<Side> {
    if normalize_url(host) == normalize_url(local_host) {
        return Ok(Side::Local);
    }
    match db.get_node_by_url(host)? {
        Some(node) => Ok(Side::Remote(node)),
        None => Err(SocialError::UnknownHost(host.to_string())),
    }
}

fn parse_uuid(s: &str) -> SocialResult<Uuid> {
    Uuid::parse_str(s.trim()).map_err(|_| SocialError::BadRequest(format!("invalid uuid: {s}")))
}

/// Handles `POST /api/friendrequest`. `friend` is the sender, `author` the receiver.
/// Only the sender itself may ask: a local sender must be the caller, a foreign
/// sender must come through the node that hosts it.
pub async fn route_friend_request(
    db: &SocialDb,
    client: &NodeClient,
    local_host: &str,
    caller: &Caller,
    req: &FriendRequest,
) -> SocialResult<FriendRequestOutcome> {
    if req.query != QUERY_FRIEND_REQUEST {
        return Err(SocialError::BadRequest("query must be friendrequest".to_string()));
    }
    let receiver = parse_uuid(&req.author.id)?;
    let sender = parse_uuid(&req.friend.id)?;
    let (receiver_side, sender_side) = {
        let local_host = local_host.to_string();
        let receiver_host = req.author.host.clone();
        let sender_host = req.friend.host.clone();
        db.blocking(move |db| -> SocialResult<_> {
            Ok((side_of(db, &local_host, &receiver_host)?, side_of(db, &local_host, &sender_host)?))
        })
        .await?
    };

    match (receiver_side, sender_side) {
        (Side::Local, Side::Local) => {
            if !caller.is_author(sender) {
                warn!(%receiver, %sender, "friend request on behalf of another author refused");
                return Err(SocialError::Forbidden);
            }
            db.blocking(move |db| db.receive_local_friend_request(receiver, sender)).await?;
            info!(%receiver, %sender, "local friend request");
            Ok(FriendRequestOutcome::Local)
        }
        (Side::Local, Side::Remote(node)) => {
            if !caller.node().is_some_and(|n| n.id == node.id) {
                warn!(%receiver, %sender, node = %node.url, "friend request not sent by the sender's node");
                return Err(SocialError::Forbidden);
            }
            let node_url = node.url.clone();
            let friend = req.friend.clone();
            let outcome = db
                .blocking(move |db| {
                    if !db.author_exists(receiver)? {
                        return Err(SocialError::NotFound("author"));
                    }
                    ensure_hosted_by(db, sender, node.id)?;
                    db.upsert_foreign_author(
                        sender,
                        node.id,
                        &friend.display_name,
                        &friend.host,
                        friend.url.as_deref().unwrap_or(""),
                    )?;
                    db.receive_foreign_friend_request(receiver, sender)
                })
                .await?;
            info!(%receiver, %sender, node = %node_url, ?outcome, "inbound friend request");
            Ok(FriendRequestOutcome::Inbound(outcome))
        }
        (Side::Remote(node), Side::Local) => {
            if !caller.is_author(sender) {
                warn!(%receiver, %sender, "outbound friend request on behalf of another author refused");
                return Err(SocialError::Forbidden);
            }
            client.send_friend_request(&node, req).await?;
            let author = req.author.clone();
            db.blocking(move |db| {
                db.upsert_foreign_author(
                    receiver,
                    node.id,
                    &author.display_name,
                    &author.host,
                    author.url.as_deref().unwrap_or(""),
                )?;
                db.follow(sender, Party::Foreign(receiver))
            })
            .await?;
            Ok(FriendRequestOutcome::Forwarded)
        }
        (Side::Remote(_), Side::Remote(_)) => Err(SocialError::BadRequest(
            "neither author is hosted here".to_string(),
        )),
    }
}

/// A foreign id must not name a local author nor an author cached for another node.
pub(crate) fn ensure_hosted_by(db: &SocialDb, id: Uuid, node_id: i64) -> SocialResult<()> {
    if db.author_exists(id)? {
        return Err(SocialError::Forbidden);
    }
    match db.get_foreign_author(id)? {
        Some(cached) if cached.node_id != node_id => Err(SocialError::Forbidden),
        _ => Ok(()),
    }
}

/// The request `me` sends to a foreign author's node, built from what we cached about it.
fn outgoing_request(db: &SocialDb, local_host: &str, me: Uuid, other: Uuid) -> SocialResult<(NodeRow, FriendRequest)> {
    let author = db.get_author(me)?.ok_or(SocialError::NotFound("author"))?;
    let foreign = db.get_foreign_author(other)?.ok_or(SocialError::NotFound("foreign author"))?;
    let node = db.get_node(foreign.node_id)?.ok_or(SocialError::UnknownHost(foreign.host.clone()))?;
    let mut receiver: AuthorRef = foreign_author_ref(&foreign);
    receiver.url = None;
    receiver.github = None;
    let mut sender = local_author_ref(local_host, &author);
    sender.github = None;
    Ok((node, FriendRequest::new(receiver, sender)))
}

/// Following a foreign author asks its node for friendship first; the follow
/// is recorded only once the node accepted the request.
pub async fn follow_foreign(
    db: &SocialDb,
    client: &NodeClient,
    local_host: &str,
    me: Uuid,
    other: Uuid,
) -> SocialResult<()> {
    let host = local_host.to_string();
    let (node, req) = db.blocking(move |db| outgoing_request(db, &host, me, other)).await?;
    client.send_friend_request(&node, &req).await?;
    db.blocking(move |db| db.follow(me, Party::Foreign(other))).await
}

/// Accepts locally, then tells the other node so its side reconciles into a
/// friendship too. A failed notice is logged; the local friendship stands.
pub async fn accept_foreign(
    db: &SocialDb,
    client: &NodeClient,
    local_host: &str,
    me: Uuid,
    other: Uuid,
) -> SocialResult<()> {
    db.blocking(move |db| db.accept_friend_request(me, Party::Foreign(other))).await?;
    let host = local_host.to_string();
    match db.blocking(move |db| outgoing_request(db, &host, me, other)).await {
        Ok((node, req)) => {
            if let Err(e) = client.send_friend_request(&node, &req).await {
                warn!(%me, %other, "reciprocal friend request failed: {e}");
            }
        }
        Err(e) => warn!(%me, %other, "cannot build reciprocal friend request: {e}"),
    }
    Ok(())
}
