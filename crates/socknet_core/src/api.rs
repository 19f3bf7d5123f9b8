/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::{from_fn, from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use socknet_protocol::{
    AddCommentRequest, AddCommentResponse, ApproveUsersRequest, AuthorRef, CommentDoc, CommentsPage, FriendAction,
    FriendActionKind, FriendCheckResponse, FriendListResponse, FriendRequest, FriendsQuery, FriendsQueryResponse,
    NewPost, NodeRegistration, PendingRequestsResponse, PostsPage, ProfileDoc, ProfileUpdate, RegisterRequest,
    RemotePostsResponse, SinglePostResponse, CONTENT_TYPE_MARKDOWN, QUERY_ADD_COMMENT, QUERY_COMMENTS,
    QUERY_FRIENDS, QUERY_FRIEND_REQUEST, QUERY_POSTS,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::accounts;
use crate::auth::{AdminAuth, Authenticated, Caller};
use crate::config::ServerConfig;
use crate::error::{SocialError, SocialResult};
use crate::federation::{self, NodeClient};
use crate::friendship::Party;
use crate::images;
use crate::render::{comment_doc, foreign_author_ref, local_author_ref, post_doc};
use crate::social_db::{normalize_url, now_ms, AuthorRow, CollectionPage, CommentRow, PageRequest, PostRow, PostUpdate, SocialDb};
use crate::visibility::Viewer;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<ServerConfig>,
    pub db: SocialDb,
    pub client: NodeClient,
}

impl AppState {
    pub fn new(cfg: ServerConfig) -> Result<Self> {
        let db = SocialDb::open(cfg.db_path()?)?;
        let client = NodeClient::new(&cfg)?;
        Ok(Self {
            cfg: Arc::new(cfg),
            db,
            client,
        })
    }

    fn host(&self) -> &str {
        &self.cfg.public_url
    }
}

pub fn router(state: AppState) -> Router {
    let max_body = state.cfg.max_body_bytes;
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/register", post(register))
        .route("/api/posts", get(list_public_posts).post(create_post))
        .route("/api/posts/", get(list_public_posts))
        .route("/api/posts/:id", get(get_post).put(update_post).delete(delete_post))
        .route("/api/posts/:id/comments", get(list_comments).post(add_comment))
        .route("/api/posts/:id/image", post(upload_image))
        .route("/api/images/:id", get(get_image))
        .route("/api/author/posts", get(visible_posts))
        .route("/api/authors", get(list_authors))
        .route("/api/author/:id", get(author_profile).put(update_profile))
        .route("/api/author/:id/posts", get(author_posts))
        .route("/api/author/:id/friendrequests", get(friend_requests))
        .route("/api/author/:id/friends", post(friend_action))
        .route("/api/friends/:id", get(friend_list).post(friends_query))
        .route("/api/friends/:a/:b", get(friend_check))
        .route("/api/friendrequest", post(friend_request))
        .route("/api/remote/posts", get(remote_posts))
        .route("/api/remote/posts/:node/:post/comments", get(remote_comments))
        .route("/admin/users", get(admin_list_users))
        .route("/admin/users/approve", post(admin_approve_users))
        .route("/admin/users/:username", axum::routing::delete(admin_delete_user))
        .route("/admin/nodes", get(admin_list_nodes).post(admin_add_node))
        .route("/admin/nodes/:id", axum::routing::delete(admin_remove_node))
        .route("/admin/authors/:id", axum::routing::delete(admin_delete_author))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
            let request_id = req
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("req");
            info_span!("http", method = %req.method(), uri = %req.uri(), request_id = %request_id)
        }))
        .layer(from_fn_with_state(state.clone(), add_security_headers))
        .layer(from_fn(ensure_request_id))
        .with_state(state)
}

static REQ_ID: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> String {
    let id = REQ_ID.fetch_add(1, Ordering::Relaxed);
    format!("req-{id}")
}

async fn ensure_request_id(mut req: Request<Body>, next: Next) -> Response {
    let headers = req.headers_mut();
    if headers.get("x-request-id").is_none() {
        let request_id = next_request_id();
        headers.insert(
            "x-request-id",
            HeaderValue::from_str(&request_id).unwrap_or_else(|_| HeaderValue::from_static("req")),
        );
    }
    next.run(req).await
}

async fn add_security_headers(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("req"));
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    headers.insert("X-Request-Id", request_id);
    headers.entry("X-Content-Type-Options").or_insert(HeaderValue::from_static("nosniff"));
    headers.entry("X-Frame-Options").or_insert(HeaderValue::from_static("DENY"));
    headers.entry("Referrer-Policy").or_insert(HeaderValue::from_static("no-referrer"));
    if state.cfg.hsts_max_age_secs > 0 {
        let value = format!("max-age={}; includeSubDomains", state.cfg.hsts_max_age_secs);
        headers.insert(
            "Strict-Transport-Security",
            HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("max-age=0")),
        );
    }
    resp
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<AppState>) -> Response {
    match state.db.blocking(|db| db.health_check()).await {
        Ok(()) => (StatusCode::OK, "ready").into_response(),
        Err(e) => {
            tracing::error!("readiness check failed: {e:#}");
            (StatusCode::SERVICE_UNAVAILABLE, "db unavailable").into_response()
        }
    }
}

/// Runs `f` on the blocking pool. Handlers keep their sqlite work in here.
async fn blocking<T, F>(state: &AppState, f: F) -> SocialResult<T>
where
    F: FnOnce(&AppState) -> SocialResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| SocialError::Internal(e.into()))?
}

async fn register(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> SocialResult<Response> {
    let username = req.username.trim().to_string();
    blocking(&state, move |s| accounts::register(&s.db, &req)).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "username": username, "active": false })),
    )
        .into_response())
}

// ---- paging ----

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    page: Option<String>,
    size: Option<String>,
}

impl PageQuery {
    fn request(&self, default_size: u32) -> PageRequest {
        PageRequest::new(self.page.as_deref(), self.size.as_deref(), default_size)
    }
}

fn page_links<T>(host: &str, path: &str, page: &CollectionPage<T>) -> (Option<String>, Option<String>) {
    let link = |p: u32| format!("{host}{path}?page={p}&size={}", page.size);
    let next = page.has_next().then(|| link(page.page + 1));
    let previous = page.has_previous().then(|| link(page.page - 1));
    (next, previous)
}

fn parse_id(s: &str) -> SocialResult<Uuid> {
    Uuid::parse_str(s.trim()).map_err(|_| SocialError::BadRequest(format!("invalid uuid: {s}")))
}

// ---- posts ----

/// Renders a page of posts, each with the first page of its comments.
fn render_posts(state: &AppState, page: CollectionPage<PostRow>, path: &str) -> SocialResult<PostsPage> {
    let (next, previous) = page_links(state.host(), path, &page);
    let mut authors: HashMap<Uuid, AuthorRow> = HashMap::new();
    let mut posts = Vec::with_capacity(page.items.len());
    for post in &page.items {
        if !authors.contains_key(&post.author_id) {
            match state.db.get_author(post.author_id)? {
                Some(a) => {
                    authors.insert(a.id, a);
                }
                None => continue,
            }
        }
        let Some(author) = authors.get(&post.author_id) else {
            continue;
        };
        posts.push(render_post(state, post, author)?);
    }
    Ok(PostsPage {
        query: QUERY_POSTS.to_string(),
        count: page.total,
        size: page.size as u64,
        next,
        previous,
        posts,
    })
}

fn render_post(state: &AppState, post: &PostRow, author: &AuthorRow) -> SocialResult<socknet_protocol::PostDoc> {
    let size = state.cfg.comments_page_size;
    let comments = state.db.list_comments(post.id, PageRequest { page: 1, size })?;
    let image = match post.image_id {
        Some(id) => state.db.get_image(id)?,
        None => None,
    };
    Ok(post_doc(
        state.host(),
        post,
        author,
        &comments.items,
        comments.total,
        size,
        image.as_ref(),
    ))
}

async fn list_public_posts(
    State(state): State<AppState>,
    Authenticated(_caller): Authenticated,
    Query(q): Query<PageQuery>,
) -> SocialResult<Json<PostsPage>> {
    let page = blocking(&state, move |s| {
        let page = s
            .db
            .list_posts(None, &Viewer::Anonymous.filter(), q.request(s.cfg.posts_page_size))?;
        render_posts(s, page, "/posts")
    })
    .await?;
    Ok(Json(page))
}

async fn visible_posts(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Query(q): Query<PageQuery>,
) -> SocialResult<Json<PostsPage>> {
    let page = blocking(&state, move |s| {
        let page = s
            .db
            .list_posts(None, &caller.viewer().filter(), q.request(s.cfg.posts_page_size))?;
        render_posts(s, page, "/author/posts")
    })
    .await?;
    Ok(Json(page))
}

async fn author_posts(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
    Query(q): Query<PageQuery>,
) -> SocialResult<Json<PostsPage>> {
    let id = parse_id(&id)?;
    let page = blocking(&state, move |s| {
        if !s.db.author_exists(id)? {
            return Err(SocialError::NotFound("author"));
        }
        let page = s
            .db
            .list_posts(Some(id), &caller.viewer().filter(), q.request(s.cfg.posts_page_size))?;
        render_posts(s, page, &format!("/author/{id}/posts"))
    })
    .await?;
    Ok(Json(page))
}

fn validate_new_post(body: &NewPost) -> SocialResult<PostUpdate> {
    if body.title.trim().is_empty() {
        return Err(SocialError::BadRequest("title required".to_string()));
    }
    if body.content.trim().is_empty() {
        return Err(SocialError::BadRequest("content required".to_string()));
    }
    Ok(PostUpdate {
        title: body.title.trim().to_string(),
        description: body.description.trim().to_string(),
        content: body.content.clone(),
        markdown: body.markdown,
        visibility: body.visibility,
    })
}

async fn create_post(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Json(body): Json<NewPost>,
) -> SocialResult<Response> {
    let author = caller.require_author()?.clone();
    let update = validate_new_post(&body)?;
    let doc = blocking(&state, move |s| {
        let post = s.db.create_post(author.id, &update)?;
        info!(post = %post.id, author = %author.id, visibility = %post.visibility, "post created");
        render_post(s, &post, &author)
    })
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(SinglePostResponse {
            query: QUERY_POSTS.to_string(),
            posts: doc,
        }),
    )
        .into_response())
}

/// The post if it exists and the caller may read it.
fn readable_post(state: &AppState, caller: &Caller, id: &str) -> SocialResult<PostRow> {
    let id = Uuid::parse_str(id.trim()).map_err(|_| SocialError::PostNotFound)?;
    let post = state.db.get_post(id)?.ok_or(SocialError::PostNotFound)?;
    if !state.db.can_view(caller.viewer(), post.id)? {
        return Err(SocialError::Forbidden);
    }
    Ok(post)
}

fn owned_post(state: &AppState, caller: &Caller, id: &str) -> SocialResult<PostRow> {
    let id = Uuid::parse_str(id.trim()).map_err(|_| SocialError::PostNotFound)?;
    let post = state.db.get_post(id)?.ok_or(SocialError::PostNotFound)?;
    if !caller.is_author(post.author_id) {
        return Err(SocialError::Forbidden);
    }
    Ok(post)
}

async fn get_post(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
) -> SocialResult<Json<SinglePostResponse>> {
    let doc = blocking(&state, move |s| {
        let post = readable_post(s, &caller, &id)?;
        let author = s.db.get_author(post.author_id)?.ok_or(SocialError::PostNotFound)?;
        render_post(s, &post, &author)
    })
    .await?;
    Ok(Json(SinglePostResponse {
        query: QUERY_POSTS.to_string(),
        posts: doc,
    }))
}

async fn update_post(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
    Json(body): Json<NewPost>,
) -> SocialResult<Json<SinglePostResponse>> {
    let update = validate_new_post(&body)?;
    let doc = blocking(&state, move |s| {
        let post = owned_post(s, &caller, &id)?;
        s.db.update_post(post.id, &update)?;
        let post = s.db.get_post(post.id)?.ok_or(SocialError::PostNotFound)?;
        render_post(s, &post, caller.require_author()?)
    })
    .await?;
    Ok(Json(SinglePostResponse {
        query: QUERY_POSTS.to_string(),
        posts: doc,
    }))
}

async fn delete_post(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
) -> SocialResult<StatusCode> {
    blocking(&state, move |s| {
        let post = owned_post(s, &caller, &id)?;
        s.db.delete_post(post.id)?;
        info!(post = %post.id, "post deleted");
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- comments ----

async fn list_comments(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
    Query(q): Query<PageQuery>,
) -> SocialResult<Json<CommentsPage>> {
    let page = blocking(&state, move |s| {
        let post = readable_post(s, &caller, &id)?;
        let page = s.db.list_comments(post.id, q.request(s.cfg.comments_page_size))?;
        let (next, previous) = page_links(s.host(), &format!("/posts/{}/comments", post.id), &page);
        Ok(CommentsPage {
            query: QUERY_COMMENTS.to_string(),
            count: page.total,
            size: page.size as u64,
            next,
            previous,
            comments: page.items.iter().map(comment_doc).collect(),
        })
    })
    .await?;
    Ok(Json(page))
}

fn comment_rejected() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(AddCommentResponse {
            query: QUERY_ADD_COMMENT.to_string(),
            success: false,
            message: "Comment not allowed".to_string(),
        }),
    )
        .into_response()
}

/// Who a comment is stored under. A node may only comment for a foreign
/// author living on its own host.
fn comment_author(state: &AppState, caller: &Caller, doc: &CommentDoc) -> SocialResult<(Uuid, String, String, String)> {
    match caller {
        Caller::Local { author: Some(a), .. } => Ok((
            a.id,
            a.display_name.clone(),
            state.host().to_string(),
            crate::render::author_url(state.host(), &a.id),
        )),
        Caller::Local { author: None, .. } => Err(SocialError::Forbidden),
        Caller::Node { node, .. } => {
            let foreign_id = parse_id(&doc.author.id)?;
            if !state.db.is_known_host(&doc.author.host)? {
                return Err(SocialError::UnknownHost(doc.author.host.clone()));
            }
            if normalize_url(&doc.author.host) != node.url {
                warn!(node = %node.url, host = %doc.author.host, "comment for an author of another host refused");
                return Err(SocialError::Forbidden);
            }
            federation::ensure_hosted_by(&state.db, foreign_id, node.id)?;
            let url = doc.author.url.clone().unwrap_or_default();
            state
                .db
                .upsert_foreign_author(foreign_id, node.id, &doc.author.display_name, &doc.author.host, &url)?;
            Ok((foreign_id, doc.author.display_name.clone(), doc.author.host.clone(), url))
        }
    }
}

async fn add_comment(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
    Json(body): Json<AddCommentRequest>,
) -> SocialResult<Response> {
    if body.query != QUERY_ADD_COMMENT {
        return Err(SocialError::BadRequest("query must be addComment".to_string()));
    }
    let doc = body.comment;
    blocking(&state, move |s| {
        let post = match readable_post(s, &caller, &id) {
            Ok(p) => p,
            Err(SocialError::Forbidden) => return Ok(comment_rejected()),
            Err(e) => return Err(e),
        };
        if doc.comment.trim().is_empty() {
            return Err(SocialError::BadRequest("comment required".to_string()));
        }
        if let Caller::Local { author: None, .. } = &caller {
            return Ok(comment_rejected());
        }
        let (author_id, display_name, host, url) = comment_author(s, &caller, &doc)?;
        let comment = CommentRow {
            id: Uuid::parse_str(doc.guid.trim()).unwrap_or_else(|_| Uuid::new_v4()),
            post_id: post.id,
            author_id,
            author_display_name: display_name,
            author_host: host,
            author_url: url,
            content: doc.comment.clone(),
            markdown: doc.content_type == CONTENT_TYPE_MARKDOWN,
            created_at_ms: now_ms(),
        };
        s.db.add_comment(&comment)?;
        info!(post = %post.id, comment = %comment.id, author = %comment.author_id, "comment added");
        Ok(Json(AddCommentResponse {
            query: QUERY_ADD_COMMENT.to_string(),
            success: true,
            message: "Comment Added".to_string(),
        })
        .into_response())
    })
    .await
}

// ---- images ----

async fn upload_image(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> SocialResult<Response> {
    let declared = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let (post_id, image) = blocking(&state, move |s| {
        let post = owned_post(s, &caller, &id)?;
        let image = images::attach_post_image(&s.db, post.author_id, post.id, body.to_vec(), declared.as_deref())?;
        Ok((post.id, image))
    })
    .await?;
    info!(post = %post_id, image = %image.id, image_type = %image.image_type, "image attached");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": image.id.to_string(), "post": post_id.to_string(), "type": image.image_type })),
    )
        .into_response())
}

async fn get_image(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
) -> SocialResult<Response> {
    let id = parse_id(&id)?;
    let image = blocking(&state, move |s| {
        let image = s.db.get_image(id)?.ok_or(SocialError::NotFound("image"))?;
        let visible = match image.post_id {
            Some(post_id) => s.db.can_view(caller.viewer(), post_id)?,
            None => caller.is_author(image.author_id),
        };
        if !visible {
            return Err(SocialError::Forbidden);
        }
        Ok(image)
    })
    .await?;
    let content_type =
        HeaderValue::from_str(&image.image_type).unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    Ok(([(header::CONTENT_TYPE, content_type)], image.bytes).into_response())
}

// ---- authors & friends ----

fn friend_refs(state: &AppState, me: Uuid) -> SocialResult<Vec<AuthorRef>> {
    let mut out = Vec::new();
    for party in state.db.all_friends(me)? {
        match party {
            Party::Local(id) => {
                if let Some(a) = state.db.get_author(id)? {
                    out.push(local_author_ref(state.host(), &a));
                }
            }
            Party::Foreign(id) => match state.db.get_foreign_author(id)? {
                Some(f) => out.push(foreign_author_ref(&f)),
                None => out.push(AuthorRef {
                    id: id.to_string(),
                    host: String::new(),
                    display_name: String::new(),
                    url: None,
                    github: None,
                }),
            },
        }
    }
    Ok(out)
}

fn party_ref(state: &AppState, party: Party) -> SocialResult<Option<AuthorRef>> {
    Ok(match party {
        Party::Local(id) => state.db.get_author(id)?.map(|a| local_author_ref(state.host(), &a)),
        Party::Foreign(id) => state.db.get_foreign_author(id)?.map(|f| foreign_author_ref(&f)),
    })
}

fn profile_doc(state: &AppState, author: &AuthorRow) -> SocialResult<ProfileDoc> {
    let me = local_author_ref(state.host(), author);
    Ok(ProfileDoc {
        id: me.id,
        host: me.host,
        display_name: me.display_name,
        url: me.url.unwrap_or_default(),
        github: author.github_url.clone(),
        friends: friend_refs(state, author.id)?,
    })
}

async fn list_authors(
    State(state): State<AppState>,
    Authenticated(_caller): Authenticated,
) -> SocialResult<Json<Value>> {
    let authors = blocking(&state, |s| {
        Ok(s.db
            .list_authors()?
            .iter()
            .map(|a| local_author_ref(s.host(), a))
            .collect::<Vec<_>>())
    })
    .await?;
    Ok(Json(json!({ "query": "authors", "authors": authors })))
}

async fn author_profile(
    State(state): State<AppState>,
    Authenticated(_caller): Authenticated,
    Path(id): Path<String>,
) -> SocialResult<Json<ProfileDoc>> {
    let id = parse_id(&id)?;
    let doc = blocking(&state, move |s| {
        let author = s.db.get_author(id)?.ok_or(SocialError::NotFound("author"))?;
        profile_doc(s, &author)
    })
    .await?;
    Ok(Json(doc))
}

async fn update_profile(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
    Json(body): Json<ProfileUpdate>,
) -> SocialResult<Json<ProfileDoc>> {
    let id = parse_id(&id)?;
    let author = caller.require_author()?;
    if author.id != id {
        return Err(SocialError::Forbidden);
    }
    let display_name = match body.display_name.as_deref().map(str::trim) {
        Some("") => return Err(SocialError::BadRequest("displayName cannot be empty".to_string())),
        Some(name) => name.to_string(),
        None => author.display_name.clone(),
    };
    let github = body
        .github
        .as_deref()
        .map(|g| g.trim().to_string())
        .unwrap_or_else(|| author.github_url.clone());
    let doc = blocking(&state, move |s| {
        s.db.update_author_profile(id, &display_name, &github)?;
        let author = s.db.get_author(id)?.ok_or(SocialError::NotFound("author"))?;
        profile_doc(s, &author)
    })
    .await?;
    info!(author = %id, "profile updated");
    Ok(Json(doc))
}

async fn friend_requests(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
) -> SocialResult<Json<PendingRequestsResponse>> {
    let id = parse_id(&id)?;
    if !caller.is_author(id) {
        return Err(SocialError::Forbidden);
    }
    let requests = blocking(&state, move |s| {
        let pending = s.db.pending_friend_requests(id)?;
        let mut requests = Vec::with_capacity(pending.len());
        for party in pending {
            if let Some(r) = party_ref(s, party)? {
                requests.push(r);
            }
        }
        Ok(requests)
    })
    .await?;
    Ok(Json(PendingRequestsResponse {
        count: requests.len() as u64,
        requests,
    }))
}

async fn friend_action(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> SocialResult<Json<Value>> {
    let me = parse_id(&id)?;
    if !caller.is_author(me) {
        return Err(SocialError::Forbidden);
    }
    let action: FriendAction =
        serde_json::from_value(body).map_err(|e| SocialError::BadRequest(format!("invalid action: {e}")))?;
    let other = Party::new(parse_id(&action.friend.id)?, action.friend.is_local);
    let db = &state.db;
    match (action.action, other) {
        (FriendActionKind::Follow, Party::Foreign(o)) => {
            federation::follow_foreign(db, &state.client, state.host(), me, o).await?
        }
        (FriendActionKind::AcceptFriendRequest, Party::Foreign(o)) => {
            federation::accept_foreign(db, &state.client, state.host(), me, o).await?
        }
        (kind, _) => {
            db.blocking(move |db| match kind {
                FriendActionKind::Follow => db.follow(me, other),
                FriendActionKind::Unfollow => db.unfollow(me, other),
                FriendActionKind::Unfriend => db.delete_friend(me, other),
                FriendActionKind::AcceptFriendRequest => db.accept_friend_request(me, other),
                FriendActionKind::DeclineFriendRequest => db.decline_friend_request(me, other),
            })
            .await?
        }
    }
    info!(author = %me, other = %other.id(), action = ?action.action, "friend action");
    let pending = db.blocking(move |db| db.pending_friend_request_count(me)).await?;
    Ok(Json(json!({ "success": true, "pending": pending })))
}

async fn friend_list(
    State(state): State<AppState>,
    Authenticated(_caller): Authenticated,
    Path(id): Path<String>,
) -> SocialResult<Json<FriendListResponse>> {
    let id = parse_id(&id)?;
    let friends = state
        .db
        .blocking(move |db| {
            if !db.author_exists(id)? {
                return Err(SocialError::NotFound("author"));
            }
            db.all_friend_ids(id)
        })
        .await?;
    Ok(Json(FriendListResponse {
        query: QUERY_FRIENDS.to_string(),
        authors: friends.into_iter().map(|u| u.to_string()).collect(),
    }))
}

async fn friends_query(
    State(state): State<AppState>,
    Authenticated(_caller): Authenticated,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> SocialResult<Json<FriendsQueryResponse>> {
    let query: FriendsQuery =
        serde_json::from_value(body).map_err(|e| SocialError::BadRequest(format!("invalid query: {e}")))?;
    if query.query != QUERY_FRIENDS {
        return Err(SocialError::BadRequest("query must be friends".to_string()));
    }
    let id = parse_id(&id)?;
    if parse_id(&query.author)? != id {
        return Err(SocialError::BadRequest("author does not match the path".to_string()));
    }
    let friends = state
        .db
        .blocking(move |db| {
            if !db.author_exists(id)? {
                return Err(SocialError::NotFound("author"));
            }
            db.all_friend_ids(id)
        })
        .await?;
    let authors = query
        .authors
        .iter()
        .filter(|a| Uuid::parse_str(a.trim()).is_ok_and(|u| friends.contains(&u)))
        .cloned()
        .collect();
    Ok(Json(FriendsQueryResponse {
        query: QUERY_FRIENDS.to_string(),
        author: id.to_string(),
        authors,
    }))
}

async fn friend_check(
    State(state): State<AppState>,
    Authenticated(_caller): Authenticated,
    Path((a, b)): Path<(String, String)>,
) -> SocialResult<Json<FriendCheckResponse>> {
    let a_id = parse_id(&a)?;
    let b_id = parse_id(&b)?;
    let friends = state
        .db
        .blocking(move |db| {
            if db.author_exists(a_id)? {
                db.is_friend(a_id, b_id)
            } else if db.author_exists(b_id)? {
                db.is_friend(b_id, a_id)
            } else {
                Err(SocialError::NotFound("author"))
            }
        })
        .await?;
    Ok(Json(FriendCheckResponse {
        query: QUERY_FRIENDS.to_string(),
        authors: vec![a, b],
        friends,
    }))
}

async fn friend_request(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Json(body): Json<Value>,
) -> SocialResult<Json<Value>> {
    let req: FriendRequest =
        serde_json::from_value(body).map_err(|e| SocialError::BadRequest(format!("invalid friend request: {e}")))?;
    let outcome = federation::route_friend_request(&state.db, &state.client, state.host(), &caller, &req).await?;
    tracing::debug!(?outcome, "friend request handled");
    Ok(Json(json!({
        "query": QUERY_FRIEND_REQUEST,
        "success": true,
        "message": "Friend request sent",
    })))
}

// ---- remote ----

async fn remote_posts(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
) -> SocialResult<Json<RemotePostsResponse>> {
    caller.require_author()?;
    let local = normalize_url(state.host());
    let nodes = state
        .db
        .blocking(move |db| db.list_nodes())
        .await?
        .into_iter()
        .filter(|n| n.url != local)
        .collect::<Vec<_>>();
    let feeds = state.client.fetch_remote_posts(&nodes).await;
    Ok(Json(RemotePostsResponse {
        query: QUERY_POSTS.to_string(),
        nodes: feeds,
    }))
}

async fn remote_comments(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path((node_id, post_id)): Path<(i64, String)>,
) -> SocialResult<Json<CommentsPage>> {
    caller.require_author()?;
    let post_id = parse_id(&post_id)?;
    let node = state
        .db
        .blocking(move |db| db.get_node(node_id))
        .await?
        .ok_or(SocialError::NotFound("node"))?;
    let comments = state.client.fetch_remote_comments(&node, &post_id.to_string()).await?;
    Ok(Json(CommentsPage {
        query: QUERY_COMMENTS.to_string(),
        count: comments.len() as u64,
        size: comments.len() as u64,
        next: None,
        previous: None,
        comments,
    }))
}

// ---- admin ----

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn admin_list_users(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Query(q): Query<ListQuery>,
) -> SocialResult<Json<Value>> {
    let rows = blocking(&state, move |s| Ok(s.db.list_users(q.limit.unwrap_or(200), q.offset.unwrap_or(0))?)).await?;
    let users = rows
        .into_iter()
        .map(|(u, approved)| {
            json!({
                "username": u.username,
                "is_active": u.is_active,
                "is_superuser": u.is_superuser,
                "approved": approved,
            })
        })
        .collect::<Vec<_>>();
    Ok(Json(json!({ "users": users })))
}

async fn admin_approve_users(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Json(req): Json<ApproveUsersRequest>,
) -> SocialResult<Json<Value>> {
    let authors = blocking(&state, move |s| accounts::approve_users(&s.db, &req.usernames)).await?;
    let approved = authors
        .iter()
        .map(|a| json!({ "username": a.username, "id": a.id.to_string() }))
        .collect::<Vec<_>>();
    Ok(Json(json!({ "approved": approved })))
}

async fn admin_delete_user(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(username): Path<String>,
) -> SocialResult<StatusCode> {
    let name = username.clone();
    if !blocking(&state, move |s| Ok(s.db.delete_user(&name)?)).await? {
        return Err(SocialError::NotFound("user"));
    }
    info!(username = %username, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn admin_list_nodes(State(state): State<AppState>, _admin: AdminAuth) -> SocialResult<Json<Value>> {
    let nodes = blocking(&state, |s| Ok(s.db.list_nodes()?))
        .await?
        .into_iter()
        .map(|n| {
            json!({
                "id": n.id,
                "name": n.name,
                "url": n.url,
                "username": n.username,
                "foreign_username": n.foreign_username,
            })
        })
        .collect::<Vec<_>>();
    Ok(Json(json!({ "nodes": nodes })))
}

async fn admin_add_node(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Json(reg): Json<NodeRegistration>,
) -> SocialResult<Response> {
    let node = blocking(&state, move |s| accounts::register_node(&s.db, &reg)).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": node.id, "name": node.name, "url": node.url })),
    )
        .into_response())
}

async fn admin_remove_node(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(id): Path<i64>,
) -> SocialResult<StatusCode> {
    if !blocking(&state, move |s| Ok(s.db.remove_node(id)?)).await? {
        return Err(SocialError::NotFound("node"));
    }
    info!(node = id, "node removed");
    Ok(StatusCode::NO_CONTENT)
}

async fn admin_delete_author(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(id): Path<String>,
) -> SocialResult<StatusCode> {
    let id = parse_id(&id)?;
    if !blocking(&state, move |s| Ok(s.db.delete_author(id)?)).await? {
        return Err(SocialError::NotFound("author"));
    }
    info!(author = %id, "author deleted");
    Ok(StatusCode::NO_CONTENT)
}
