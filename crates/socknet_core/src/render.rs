/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use pulldown_cmark::{html, Parser};
use socknet_protocol::{
    AuthorRef, CommentDoc, PostDoc, CONTENT_TYPE_MARKDOWN, CONTENT_TYPE_PLAIN, NO_CATEGORIES, NO_DESCRIPTION,
};

use crate::images::data_uri;
use crate::social_db::{AuthorRow, CommentRow, ForeignAuthorRow, ImageRow, PostRow};

/// HTML for user text. Plain text is escaped; markdown is escaped first and
/// rendered afterwards, so raw HTML typed by a user never survives.
pub fn view_content(markdown: bool, text: &str) -> String {
    let safe = escape_html(text);
    if !markdown {
        return safe.replace('\n', "<br/>");
    }
    // Blockquotes need a literal '>'.
    let mark = safe.replace("&gt;", ">");
    let mut out = String::with_capacity(mark.len() * 2);
    html::push_html(&mut out, Parser::new(&mark));
    unescape_code_blocks(&out).replace('\n', "<br/>")
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Inside `<code>` the escaped user text got escaped a second time by the
/// markdown renderer; decode one level there.
fn unescape_code_blocks(rendered: &str) -> String {
    let mut depth: i32 = 0;
    let mut parts = Vec::new();
    for part in rendered.split('<') {
        let tag = part.replace(' ', "");
        if tag.starts_with("code>") {
            depth += 1;
        }
        if tag.starts_with("/code>") {
            depth -= 1;
        }
        if depth > 0 {
            parts.push(unescape_entities(part));
        } else {
            parts.push(part.to_string());
        }
    }
    parts.join("<")
}

fn unescape_entities(s: &str) -> String {
    const ENTITIES: [(&str, char); 7] = [
        ("&amp;", '&'),
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&quot;", '"'),
        ("&#x27;", '\''),
        ("&#39;", '\''),
        ("&#x2F;", '/'),
    ];
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    'outer: while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        for (entity, c) in ENTITIES {
            if let Some(tail) = rest.strip_prefix(entity) {
                out.push(c);
                rest = tail;
                continue 'outer;
            }
        }
        out.push('&');
        rest = &rest[1..];
    }
    out.push_str(rest);
    out
}

pub fn content_type(markdown: bool) -> &'static str {
    if markdown {
        CONTENT_TYPE_MARKDOWN
    } else {
        CONTENT_TYPE_PLAIN
    }
}

pub fn author_url(host: &str, id: &uuid::Uuid) -> String {
    format!("{}/author/{}", host.trim_end_matches('/'), id)
}

pub fn local_author_ref(host: &str, author: &AuthorRow) -> AuthorRef {
    AuthorRef {
        id: author.id.to_string(),
        host: host.to_string(),
        display_name: author.display_name.clone(),
        url: Some(author_url(host, &author.id)),
        github: Some(author.github_url.clone()),
    }
}

pub fn foreign_author_ref(author: &ForeignAuthorRow) -> AuthorRef {
    AuthorRef {
        id: author.id.to_string(),
        host: author.host.clone(),
        display_name: author.display_name.clone(),
        url: if author.url.is_empty() {
            Some(author_url(&author.host, &author.id))
        } else {
            Some(author.url.clone())
        },
        github: Some(String::new()),
    }
}

pub fn comment_doc(comment: &CommentRow) -> CommentDoc {
    CommentDoc {
        guid: comment.id.to_string(),
        comment: comment.content.clone(),
        content_type: content_type(comment.markdown).to_string(),
        published: ms_to_rfc3339(comment.created_at_ms).unwrap_or_default(),
        author: AuthorRef {
            id: comment.author_id.to_string(),
            host: comment.author_host.clone(),
            display_name: comment.author_display_name.clone(),
            url: if comment.author_url.is_empty() {
                Some(author_url(&comment.author_host, &comment.author_id))
            } else {
                Some(comment.author_url.clone())
            },
            github: Some(String::new()),
        },
    }
}

/// A post in the shape peers exchange. `comments` is the first page of the
/// thread; `total_comments` and `comment_page_size` describe the whole of it.
pub fn post_doc(
    host: &str,
    post: &PostRow,
    author: &AuthorRow,
    comments: &[CommentRow],
    total_comments: u64,
    comment_page_size: u32,
    image: Option<&ImageRow>,
) -> PostDoc {
    let host = host.trim_end_matches('/');
    let link = format!("{host}/posts/{}", post.id);
    let next = if total_comments > comments.len() as u64 {
        Some(format!("{host}/posts/{}/comments?page=2&size={comment_page_size}", post.id))
    } else {
        None
    };
    PostDoc {
        id: post.id.to_string(),
        title: post.title.clone(),
        source: link.clone(),
        origin: link,
        description: if post.description.trim().is_empty() {
            NO_DESCRIPTION.to_string()
        } else {
            post.description.clone()
        },
        content_type: content_type(post.markdown).to_string(),
        content: post.content.clone(),
        author: local_author_ref(host, author),
        categories: serde_json::Value::String(NO_CATEGORIES.to_string()),
        count: total_comments,
        size: comment_page_size as u64,
        next,
        comments: comments.iter().map(comment_doc).collect(),
        published: ms_to_rfc3339(post.created_at_ms).unwrap_or_default(),
        visibility: post.visibility,
        image: image.map(|i| data_uri(&i.image_type, &i.bytes)),
    }
}

pub fn ms_to_rfc3339(ms: i64) -> Option<String> {
    let secs = ms.checked_div(1000)?;
    let nanos = (ms.rem_euclid(1000) * 1_000_000) as u32;
    let dt = time::OffsetDateTime::from_unix_timestamp(secs).ok()? + time::Duration::nanoseconds(nanos as i64);
    dt.format(&time::format_description::well_known::Rfc3339).ok()
}
