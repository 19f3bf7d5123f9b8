/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! JSON documents exchanged between socknet nodes and their clients.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const QUERY_FRIENDS: &str = "friends";
pub const QUERY_FRIEND_REQUEST: &str = "friendrequest";
pub const QUERY_POSTS: &str = "posts";
pub const QUERY_COMMENTS: &str = "comments";
pub const QUERY_ADD_COMMENT: &str = "addComment";

pub const CONTENT_TYPE_PLAIN: &str = "text/plain";
pub const CONTENT_TYPE_MARKDOWN: &str = "text/x-markdown";

pub const NO_DESCRIPTION: &str = "No description provided.";
pub const NO_CATEGORIES: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    Public,
    Foaf,
    Friends,
    Private,
    #[serde(rename = "SERVERONLY")]
    ServerOnly,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "PUBLIC",
            Visibility::Foaf => "FOAF",
            Visibility::Friends => "FRIENDS",
            Visibility::Private => "PRIVATE",
            Visibility::ServerOnly => "SERVERONLY",
        }
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Public
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PUBLIC" => Ok(Visibility::Public),
            "FOAF" => Ok(Visibility::Foaf),
            "FRIENDS" => Ok(Visibility::Friends),
            "PRIVATE" => Ok(Visibility::Private),
            "SERVERONLY" => Ok(Visibility::ServerOnly),
            other => Err(format!("unknown visibility: {other}")),
        }
    }
}

/// An author as it travels between nodes. `url` and `github` are optional because
/// the receiving side of a friend request is sent without them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub id: String,
    pub host: String,
    #[serde(rename = "displayName", alias = "display_name", default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequest {
    pub query: String,
    /// The author receiving the request.
    pub author: AuthorRef,
    /// The author sending the request.
    pub friend: AuthorRef,
}

impl FriendRequest {
    pub fn new(author: AuthorRef, friend: AuthorRef) -> Self {
        Self {
            query: QUERY_FRIEND_REQUEST.to_string(),
            author,
            friend,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendsQuery {
    pub query: String,
    pub author: String,
    #[serde(default)]
    pub authors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendsQueryResponse {
    pub query: String,
    pub author: String,
    pub authors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendListResponse {
    pub query: String,
    pub authors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendCheckResponse {
    pub query: String,
    pub authors: Vec<String>,
    pub friends: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentDoc {
    pub guid: String,
    pub comment: String,
    #[serde(rename = "contentType", default = "default_content_type")]
    pub content_type: String,
    #[serde(alias = "pubDate", default)]
    pub published: String,
    pub author: AuthorRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDoc {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "contentType", default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub content: String,
    pub author: AuthorRef,
    #[serde(default)]
    pub categories: serde_json::Value,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default)]
    pub comments: Vec<CommentDoc>,
    #[serde(default)]
    pub published: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Paged listing envelope shared by post and comment collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostsPage {
    pub query: String,
    pub count: u64,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    pub posts: Vec<PostDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentsPage {
    pub query: String,
    pub count: u64,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    pub comments: Vec<CommentDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinglePostResponse {
    pub query: String,
    pub posts: PostDoc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCommentRequest {
    pub query: String,
    #[serde(default)]
    pub post: String,
    pub comment: CommentDoc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCommentResponse {
    pub query: String,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDoc {
    pub id: String,
    pub host: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub url: String,
    #[serde(default)]
    pub github: String,
    pub friends: Vec<AuthorRef>,
}

/// Profile fields an author may change; absent fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(rename = "displayName", alias = "display_name", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub github: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendActionKind {
    Follow,
    Unfollow,
    Unfriend,
    AcceptFriendRequest,
    DeclineFriendRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendActionTarget {
    pub id: String,
    #[serde(default = "default_true")]
    pub is_local: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendAction {
    pub action: FriendActionKind,
    pub friend: FriendActionTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRequestsResponse {
    pub count: u64,
    pub requests: Vec<AuthorRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub content: String,
    #[serde(default)]
    pub markdown: bool,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveUsersRequest {
    pub usernames: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRegistration {
    pub name: String,
    pub url: String,
    /// Credentials the peer presents when calling us.
    pub username: String,
    pub password: String,
    /// Credentials we present when calling the peer.
    #[serde(default)]
    pub foreign_username: String,
    #[serde(default)]
    pub foreign_password: String,
}

/// Posts pulled from one peer node; `error` is set instead when the node failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteNodeFeed {
    pub node_id: i64,
    pub node: String,
    #[serde(default)]
    pub posts: Vec<PostDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePostsResponse {
    pub query: String,
    pub nodes: Vec<RemoteNodeFeed>,
}

fn default_content_type() -> String {
    CONTENT_TYPE_PLAIN.to_string()
}

fn default_true() -> bool {
    true
}
