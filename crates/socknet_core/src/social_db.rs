/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use rusqlite::types::{Type, Value};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use socknet_protocol::Visibility;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::visibility::VisibilityFilter;

#[derive(Clone)]
pub struct SocialDb {
    path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub username: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct AuthorRow {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub github_url: String,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct NodeRow {
    pub id: i64,
    pub name: String,
    pub url: String,
    /// Credentials the peer uses when calling us; the password is stored hashed.
    pub username: String,
    pub password_hash: String,
    /// Credentials we use when calling the peer.
    pub foreign_username: String,
    pub foreign_password: String,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct ForeignAuthorRow {
    pub id: Uuid,
    pub node_id: i64,
    pub display_name: String,
    pub host: String,
    pub url: String,
    pub updated_at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct PostRow {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub description: String,
    pub content: String,
    pub markdown: bool,
    pub visibility: Visibility,
    pub image_id: Option<Uuid>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub author_display_name: String,
    pub author_host: String,
    pub author_url: String,
    pub content: String,
    pub markdown: bool,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct ImageRow {
    pub id: Uuid,
    pub author_id: Uuid,
    pub post_id: Option<Uuid>,
    pub image_type: String,
    pub bytes: Vec<u8>,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct PostUpdate {
    pub title: String,
    pub description: String,
    pub content: String,
    pub markdown: bool,
    pub visibility: Visibility,
}

/// Page selection with the forgiving semantics clients rely on: pages are
/// 1-based, anything unparsable is page 1 and anything past the end is the last page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub const MAX_SIZE: u32 = 100;

    pub fn new(page: Option<&str>, size: Option<&str>, default_size: u32) -> Self {
        let page = page
            .and_then(|p| p.trim().parse::<u32>().ok())
            .filter(|p| *p > 0)
            .unwrap_or(1);
        let size = size
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(default_size)
            .clamp(1, Self::MAX_SIZE);
        Self { page, size }
    }
}

#[derive(Debug, Clone)]
pub struct CollectionPage<T> {
    pub total: u64,
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub num_pages: u32,
}

impl<T> CollectionPage<T> {
    pub fn has_next(&self) -> bool {
        self.page < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

fn resolve_page(total: u64, req: PageRequest) -> (u32, u32, i64) {
    let size = req.size.max(1) as u64;
    let num_pages = ((total + size - 1) / size).max(1) as u32;
    let page = req.page.clamp(1, num_pages);
    let offset = (page as i64 - 1) * size as i64;
    (page, num_pages, offset)
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Following = 0,
    Friend = 1,
    Ignored = 2,
    PendingIncoming = 3,
}

impl SocialDb {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&path).with_context(|| format!("open db: {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS users (
              username TEXT PRIMARY KEY,
              password_hash TEXT NOT NULL,
              is_active INTEGER NOT NULL DEFAULT 0,
              is_superuser INTEGER NOT NULL DEFAULT 0,
              created_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS authors (
              id TEXT PRIMARY KEY,
              username TEXT NOT NULL UNIQUE,
              display_name TEXT NOT NULL,
              github_url TEXT NOT NULL DEFAULT '',
              created_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS nodes (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              name TEXT NOT NULL,
              url TEXT NOT NULL UNIQUE,
              username TEXT NOT NULL,
              password_hash TEXT NOT NULL,
              foreign_username TEXT NOT NULL DEFAULT '',
              foreign_password TEXT NOT NULL DEFAULT '',
              created_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_nodes_username ON nodes(username);

            CREATE TABLE IF NOT EXISTS foreign_authors (
              id TEXT PRIMARY KEY,
              node_id INTEGER NOT NULL,
              display_name TEXT NOT NULL,
              host TEXT NOT NULL,
              url TEXT NOT NULL DEFAULT '',
              updated_at_ms INTEGER NOT NULL
            );

            -- author_id is always a local author; other_id may be local or foreign.
            CREATE TABLE IF NOT EXISTS relations (
              author_id TEXT NOT NULL,
              other_id TEXT NOT NULL,
              other_is_local INTEGER NOT NULL,
              kind INTEGER NOT NULL,
              created_at_ms INTEGER NOT NULL,
              PRIMARY KEY(author_id, other_id, kind)
            );
            CREATE INDEX IF NOT EXISTS idx_relations_other ON relations(other_id, kind);

            CREATE TABLE IF NOT EXISTS posts (
              id TEXT PRIMARY KEY,
              author_id TEXT NOT NULL,
              title TEXT NOT NULL,
              description TEXT NOT NULL DEFAULT '',
              content TEXT NOT NULL,
              markdown INTEGER NOT NULL DEFAULT 0,
              visibility TEXT NOT NULL,
              image_id TEXT NULL,
              created_at_ms INTEGER NOT NULL,
              updated_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at_ms DESC);
            CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id, created_at_ms DESC);

            CREATE TABLE IF NOT EXISTS comments (
              id TEXT PRIMARY KEY,
              post_id TEXT NOT NULL,
              author_id TEXT NOT NULL,
              author_display_name TEXT NOT NULL,
              author_host TEXT NOT NULL,
              author_url TEXT NOT NULL DEFAULT '',
              content TEXT NOT NULL,
              markdown INTEGER NOT NULL DEFAULT 0,
              created_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, created_at_ms);

            CREATE TABLE IF NOT EXISTS images (
              id TEXT PRIMARY KEY,
              author_id TEXT NOT NULL,
              post_id TEXT NULL,
              image_type TEXT NOT NULL,
              bytes BLOB NOT NULL,
              created_at_ms INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self { path })
    }

    /// Runs `f` on the blocking pool so sqlite work stays off the async workers.
    pub async fn blocking<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&SocialDb) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<anyhow::Error> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| E::from(anyhow::Error::new(e).context("db task")))?
    }

    pub(crate) fn conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)
            .with_context(|| format!("open db: {}", self.path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    pub fn health_check(&self) -> Result<()> {
        let conn = self.conn()?;
        let _: i64 = conn.query_row("SELECT 1", [], |r| r.get(0))?;
        Ok(())
    }

    // ---- users ----

    /// Returns false when the username is already taken.
    pub fn create_user(&self, username: &str, password_hash: &str, is_superuser: bool) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "INSERT OR IGNORE INTO users(username, password_hash, is_active, is_superuser, created_at_ms) VALUES (?1, ?2, 0, ?3, ?4)",
            params![username, password_hash, is_superuser, now_ms()],
        )?;
        Ok(n == 1)
    }

    pub fn get_user(&self, username: &str) -> Result<Option<UserRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT username, password_hash, is_active, is_superuser, created_at_ms FROM users WHERE username=?1",
            params![username],
            user_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_users(&self, limit: u32, offset: u32) -> Result<Vec<(UserRow, bool)>> {
        let conn = self.conn()?;
        let limit = limit.max(1).min(10_000) as i64;
        let offset = offset.min(100_000) as i64;
        let mut stmt = conn.prepare(
            r#"
            SELECT u.username, u.password_hash, u.is_active, u.is_superuser, u.created_at_ms,
                   EXISTS(SELECT 1 FROM authors a WHERE a.username = u.username)
            FROM users u ORDER BY u.username LIMIT ?1 OFFSET ?2
            "#,
        )?;
        let rows = stmt
            .query_map(params![limit, offset], |r| Ok((user_from_row(r)?, r.get::<_, bool>(5)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn set_user_active(&self, username: &str, active: bool) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE users SET is_active=?2 WHERE username=?1",
            params![username, active],
        )?;
        Ok(n == 1)
    }

    /// Removes the account and, through `delete_author`, whatever its author owned.
    pub fn delete_user(&self, username: &str) -> Result<bool> {
        if let Some(author) = self.get_author_by_username(username)? {
            return self.delete_author(author.id);
        }
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM users WHERE username=?1", params![username])?;
        Ok(n == 1)
    }

    // ---- authors ----

    pub fn list_authors(&self) -> Result<Vec<AuthorRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, username, display_name, github_url, created_at_ms FROM authors ORDER BY created_at_ms, username",
        )?;
        let rows = stmt
            .query_map([], author_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn create_author(&self, username: &str, display_name: &str) -> Result<AuthorRow> {
        let row = AuthorRow {
            id: Uuid::new_v4(),
            username: username.to_string(),
            display_name: display_name.to_string(),
            github_url: String::new(),
            created_at_ms: now_ms(),
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO authors(id, username, display_name, github_url, created_at_ms) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![row.id.to_string(), row.username, row.display_name, row.github_url, row.created_at_ms],
        )
        .with_context(|| format!("create author for {username}"))?;
        Ok(row)
    }

    pub fn get_author(&self, id: Uuid) -> Result<Option<AuthorRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, username, display_name, github_url, created_at_ms FROM authors WHERE id=?1",
            params![id.to_string()],
            author_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn get_author_by_username(&self, username: &str) -> Result<Option<AuthorRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, username, display_name, github_url, created_at_ms FROM authors WHERE username=?1",
            params![username],
            author_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn author_exists(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn()?;
        is_local_author(&conn, id)
    }

    pub fn update_author_profile(&self, id: Uuid, display_name: &str, github_url: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE authors SET display_name=?2, github_url=?3 WHERE id=?1",
            params![id.to_string(), display_name, github_url],
        )?;
        Ok(n == 1)
    }

    /// Removes an author together with its user account and everything it owns.
    pub fn delete_author(&self, id: Uuid) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let id_s = id.to_string();
        let username: Option<String> = tx
            .query_row("SELECT username FROM authors WHERE id=?1", params![id_s], |r| r.get(0))
            .optional()?;
        let Some(username) = username else {
            return Ok(false);
        };
        tx.execute("DELETE FROM relations WHERE author_id=?1 OR other_id=?1", params![id_s])?;
        tx.execute(
            "DELETE FROM comments WHERE author_id=?1 OR post_id IN (SELECT id FROM posts WHERE author_id=?1)",
            params![id_s],
        )?;
        tx.execute("DELETE FROM images WHERE author_id=?1", params![id_s])?;
        tx.execute("DELETE FROM posts WHERE author_id=?1", params![id_s])?;
        tx.execute("DELETE FROM authors WHERE id=?1", params![id_s])?;
        tx.execute("DELETE FROM users WHERE username=?1", params![username])?;
        tx.commit()?;
        Ok(true)
    }

    // ---- nodes ----

    pub fn upsert_node(
        &self,
        name: &str,
        url: &str,
        username: &str,
        password_hash: &str,
        foreign_username: &str,
        foreign_password: &str,
    ) -> Result<NodeRow> {
        let url = normalize_url(url);
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO nodes(name, url, username, password_hash, foreign_username, foreign_password, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(url) DO UPDATE SET
              name=excluded.name,
              username=excluded.username,
              password_hash=excluded.password_hash,
              foreign_username=excluded.foreign_username,
              foreign_password=excluded.foreign_password
            "#,
            params![name, url, username, password_hash, foreign_username, foreign_password, now_ms()],
        )?;
        let node = conn.query_row(
            &format!("SELECT {NODE_COLS} FROM nodes WHERE url=?1"),
            params![url],
            node_from_row,
        )?;
        Ok(node)
    }

    pub fn get_node(&self, id: i64) -> Result<Option<NodeRow>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {NODE_COLS} FROM nodes WHERE id=?1"),
            params![id],
            node_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn get_node_by_url(&self, url: &str) -> Result<Option<NodeRow>> {
        let conn = self.conn()?;
        get_node_by_url(&conn, url)
    }

    pub fn get_nodes_by_username(&self, username: &str) -> Result<Vec<NodeRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {NODE_COLS} FROM nodes WHERE username=?1"))?;
        let rows = stmt
            .query_map(params![username], node_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_nodes(&self) -> Result<Vec<NodeRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {NODE_COLS} FROM nodes ORDER BY id"))?;
        let rows = stmt
            .query_map([], node_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn remove_node(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM nodes WHERE id=?1", params![id])?;
        Ok(n == 1)
    }

    pub fn is_known_host(&self, host: &str) -> Result<bool> {
        Ok(self.get_node_by_url(host)?.is_some())
    }

    // ---- foreign authors ----

    pub fn upsert_foreign_author(
        &self,
        id: Uuid,
        node_id: i64,
        display_name: &str,
        host: &str,
        url: &str,
    ) -> Result<()> {
        let conn = self.conn()?;
        upsert_foreign_author(&conn, id, node_id, display_name, host, url)
    }

    pub fn get_foreign_author(&self, id: Uuid) -> Result<Option<ForeignAuthorRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, node_id, display_name, host, url, updated_at_ms FROM foreign_authors WHERE id=?1",
            params![id.to_string()],
            foreign_author_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    // ---- posts ----

    pub fn create_post(&self, author_id: Uuid, update: &PostUpdate) -> Result<PostRow> {
        let now = now_ms();
        let row = PostRow {
            id: Uuid::new_v4(),
            author_id,
            title: update.title.clone(),
            description: update.description.clone(),
            content: update.content.clone(),
            markdown: update.markdown,
            visibility: update.visibility,
            image_id: None,
            created_at_ms: now,
            updated_at_ms: now,
        };
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO posts(id, author_id, title, description, content, markdown, visibility, image_id, created_at_ms, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?8)
            "#,
            params![
                row.id.to_string(),
                author_id.to_string(),
                row.title,
                row.description,
                row.content,
                row.markdown,
                row.visibility.as_str(),
                now
            ],
        )?;
        Ok(row)
    }

    pub fn get_post(&self, id: Uuid) -> Result<Option<PostRow>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {POST_COLS} FROM posts p WHERE p.id=?1"),
            params![id.to_string()],
            post_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn update_post(&self, id: Uuid, update: &PostUpdate) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            r#"
            UPDATE posts SET title=?2, description=?3, content=?4, markdown=?5, visibility=?6, updated_at_ms=?7
            WHERE id=?1
            "#,
            params![
                id.to_string(),
                update.title,
                update.description,
                update.content,
                update.markdown,
                update.visibility.as_str(),
                now_ms()
            ],
        )?;
        Ok(n == 1)
    }

    pub fn delete_post(&self, id: Uuid) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let id_s = id.to_string();
        tx.execute("DELETE FROM comments WHERE post_id=?1", params![id_s])?;
        tx.execute("DELETE FROM images WHERE post_id=?1", params![id_s])?;
        let n = tx.execute("DELETE FROM posts WHERE id=?1", params![id_s])?;
        tx.commit()?;
        Ok(n == 1)
    }

    pub fn set_post_image(&self, post_id: Uuid, image_id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE posts SET image_id=?2 WHERE id=?1",
            params![post_id.to_string(), image_id.to_string()],
        )?;
        Ok(())
    }

    /// Newest first. `author` narrows to one author; `filter` decides what the viewer may see.
    pub fn list_posts(
        &self,
        author: Option<Uuid>,
        filter: &VisibilityFilter,
        page: PageRequest,
    ) -> Result<CollectionPage<PostRow>> {
        let conn = self.conn()?;
        let mut where_sql = format!("({})", filter.sql);
        let mut named: Vec<(&str, Value)> = filter.params.clone();
        if let Some(a) = author {
            where_sql.push_str(" AND p.author_id = :author");
            named.push((":author", Value::Text(a.to_string())));
        }

        let total: u64 = {
            let sql = format!("SELECT COUNT(*) FROM posts p WHERE {where_sql}");
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_row(as_named(&named).as_slice(), |r| r.get(0))?
        };
        let (page_no, num_pages, offset) = resolve_page(total, page);

        named.push((":limit", Value::Integer(page.size as i64)));
        named.push((":offset", Value::Integer(offset)));
        let sql = format!(
            "SELECT {POST_COLS} FROM posts p WHERE {where_sql} ORDER BY p.created_at_ms DESC, p.rowid DESC LIMIT :limit OFFSET :offset"
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(as_named(&named).as_slice(), post_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(CollectionPage {
            total,
            items,
            page: page_no,
            size: page.size,
            num_pages,
        })
    }

    pub fn post_visible(&self, post_id: Uuid, filter: &VisibilityFilter) -> Result<bool> {
        let conn = self.conn()?;
        let mut named: Vec<(&str, Value)> = filter.params.clone();
        named.push((":post", Value::Text(post_id.to_string())));
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM posts p WHERE p.id = :post AND ({}))",
            filter.sql
        );
        let mut stmt = conn.prepare(&sql)?;
        let visible: bool = stmt.query_row(as_named(&named).as_slice(), |r| r.get(0))?;
        Ok(visible)
    }

    // ---- comments ----

    pub fn add_comment(&self, comment: &CommentRow) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO comments(id, post_id, author_id, author_display_name, author_host, author_url, content, markdown, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO NOTHING
            "#,
            params![
                comment.id.to_string(),
                comment.post_id.to_string(),
                comment.author_id.to_string(),
                comment.author_display_name,
                comment.author_host,
                comment.author_url,
                comment.content,
                comment.markdown,
                comment.created_at_ms
            ],
        )?;
        Ok(())
    }

    /// Oldest first, the order a thread is read in.
    pub fn list_comments(&self, post_id: Uuid, page: PageRequest) -> Result<CollectionPage<CommentRow>> {
        let conn = self.conn()?;
        let post_s = post_id.to_string();
        let total: u64 = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE post_id=?1",
            params![post_s],
            |r| r.get(0),
        )?;
        let (page_no, num_pages, offset) = resolve_page(total, page);
        let mut stmt = conn.prepare(
            r#"
            SELECT id, post_id, author_id, author_display_name, author_host, author_url, content, markdown, created_at_ms
            FROM comments WHERE post_id=?1
            ORDER BY created_at_ms ASC, rowid ASC LIMIT ?2 OFFSET ?3
            "#,
        )?;
        let items = stmt
            .query_map(params![post_s, page.size as i64, offset], comment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(CollectionPage {
            total,
            items,
            page: page_no,
            size: page.size,
            num_pages,
        })
    }

    // ---- images ----

    pub fn insert_image(&self, image: &ImageRow) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO images(id, author_id, post_id, image_type, bytes, created_at_ms) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                image.id.to_string(),
                image.author_id.to_string(),
                image.post_id.map(|p| p.to_string()),
                image.image_type,
                image.bytes,
                image.created_at_ms
            ],
        )?;
        Ok(())
    }

    pub fn get_image(&self, id: Uuid) -> Result<Option<ImageRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, author_id, post_id, image_type, bytes, created_at_ms FROM images WHERE id=?1",
            params![id.to_string()],
            |r| {
                Ok(ImageRow {
                    id: uuid_col(r, 0)?,
                    author_id: uuid_col(r, 1)?,
                    post_id: opt_uuid_col(r, 2)?,
                    image_type: r.get(3)?,
                    bytes: r.get(4)?,
                    created_at_ms: r.get(5)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }
}

// ---- relation helpers shared with the friendship state machine ----

pub(crate) fn is_local_author(conn: &Connection, id: Uuid) -> Result<bool> {
    let found: Option<String> = conn
        .query_row("SELECT id FROM authors WHERE id=?1", params![id.to_string()], |r| r.get(0))
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn has_relation(conn: &Connection, author: Uuid, other: Uuid, kind: RelationKind) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM relations WHERE author_id=?1 AND other_id=?2 AND kind=?3",
            params![author.to_string(), other.to_string(), kind as u32],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn insert_relation(
    conn: &Connection,
    author: Uuid,
    other: Uuid,
    other_is_local: bool,
    kind: RelationKind,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO relations(author_id, other_id, other_is_local, kind, created_at_ms) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![author.to_string(), other.to_string(), other_is_local, kind as u32, now_ms()],
    )?;
    Ok(())
}

pub(crate) fn delete_relation(conn: &Connection, author: Uuid, other: Uuid, kind: RelationKind) -> Result<usize> {
    let n = conn.execute(
        "DELETE FROM relations WHERE author_id=?1 AND other_id=?2 AND kind=?3",
        params![author.to_string(), other.to_string(), kind as u32],
    )?;
    Ok(n)
}

/// Others that `author` holds a `kind` relation to, oldest first, with their locality.
pub(crate) fn relation_targets(conn: &Connection, author: Uuid, kind: RelationKind) -> Result<Vec<(Uuid, bool)>> {
    let mut stmt = conn.prepare(
        "SELECT other_id, other_is_local FROM relations WHERE author_id=?1 AND kind=?2 ORDER BY created_at_ms ASC, rowid ASC",
    )?;
    let rows = stmt
        .query_map(params![author.to_string(), kind as u32], |r| Ok((uuid_col(r, 0)?, r.get::<_, bool>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Local authors holding a `kind` relation towards `other`.
pub(crate) fn relation_sources(conn: &Connection, other: Uuid, kind: RelationKind) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT author_id FROM relations WHERE other_id=?1 AND kind=?2 ORDER BY created_at_ms ASC, rowid ASC",
    )?;
    let rows = stmt
        .query_map(params![other.to_string(), kind as u32], |r| uuid_col(r, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub(crate) fn get_node_by_url(conn: &Connection, url: &str) -> Result<Option<NodeRow>> {
    conn.query_row(
        &format!("SELECT {NODE_COLS} FROM nodes WHERE url=?1"),
        params![normalize_url(url)],
        node_from_row,
    )
    .optional()
    .map_err(Into::into)
}

pub(crate) fn upsert_foreign_author(
    conn: &Connection,
    id: Uuid,
    node_id: i64,
    display_name: &str,
    host: &str,
    url: &str,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO foreign_authors(id, node_id, display_name, host, url, updated_at_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(id) DO UPDATE SET
          node_id=excluded.node_id,
          display_name=(CASE WHEN excluded.display_name = '' THEN foreign_authors.display_name ELSE excluded.display_name END),
          host=excluded.host,
          url=(CASE WHEN excluded.url = '' THEN foreign_authors.url ELSE excluded.url END),
          updated_at_ms=excluded.updated_at_ms
        "#,
        params![id.to_string(), node_id, display_name, normalize_url(host), url, now_ms()],
    )?;
    Ok(())
}

/// Node urls are compared without a trailing slash, whichever way an operator typed them.
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

const NODE_COLS: &str =
    "id, name, url, username, password_hash, foreign_username, foreign_password, created_at_ms";

const POST_COLS: &str = "p.id, p.author_id, p.title, p.description, p.content, p.markdown, p.visibility, p.image_id, p.created_at_ms, p.updated_at_ms";

fn as_named<'a>(named: &'a [(&'a str, Value)]) -> Vec<(&'a str, &'a dyn ToSql)> {
    named.iter().map(|(k, v)| (*k, v as &dyn ToSql)).collect()
}

fn user_from_row(r: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        username: r.get(0)?,
        password_hash: r.get(1)?,
        is_active: r.get(2)?,
        is_superuser: r.get(3)?,
        created_at_ms: r.get(4)?,
    })
}

fn author_from_row(r: &Row<'_>) -> rusqlite::Result<AuthorRow> {
    Ok(AuthorRow {
        id: uuid_col(r, 0)?,
        username: r.get(1)?,
        display_name: r.get(2)?,
        github_url: r.get(3)?,
        created_at_ms: r.get(4)?,
    })
}

fn node_from_row(r: &Row<'_>) -> rusqlite::Result<NodeRow> {
    Ok(NodeRow {
        id: r.get(0)?,
        name: r.get(1)?,
        url: r.get(2)?,
        username: r.get(3)?,
        password_hash: r.get(4)?,
        foreign_username: r.get(5)?,
        foreign_password: r.get(6)?,
        created_at_ms: r.get(7)?,
    })
}

fn foreign_author_from_row(r: &Row<'_>) -> rusqlite::Result<ForeignAuthorRow> {
    Ok(ForeignAuthorRow {
        id: uuid_col(r, 0)?,
        node_id: r.get(1)?,
        display_name: r.get(2)?,
        host: r.get(3)?,
        url: r.get(4)?,
        updated_at_ms: r.get(5)?,
    })
}

fn post_from_row(r: &Row<'_>) -> rusqlite::Result<PostRow> {
    let visibility: String = r.get(6)?;
    let visibility = visibility
        .parse::<Visibility>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, e.into()))?;
    Ok(PostRow {
        id: uuid_col(r, 0)?,
        author_id: uuid_col(r, 1)?,
        title: r.get(2)?,
        description: r.get(3)?,
        content: r.get(4)?,
        markdown: r.get(5)?,
        visibility,
        image_id: opt_uuid_col(r, 7)?,
        created_at_ms: r.get(8)?,
        updated_at_ms: r.get(9)?,
    })
}

fn comment_from_row(r: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: uuid_col(r, 0)?,
        post_id: uuid_col(r, 1)?,
        author_id: uuid_col(r, 2)?,
        author_display_name: r.get(3)?,
        author_host: r.get(4)?,
        author_url: r.get(5)?,
        content: r.get(6)?,
        markdown: r.get(7)?,
        created_at_ms: r.get(8)?,
    })
}

fn uuid_col(r: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = r.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_uuid_col(r: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let s: Option<String> = r.get(idx)?;
    s.map(|s| {
        Uuid::parse_str(&s).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
