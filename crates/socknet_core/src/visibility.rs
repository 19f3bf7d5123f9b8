/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use rusqlite::types::Value;
use uuid::Uuid;

use crate::error::SocialResult;
use crate::social_db::{RelationKind, SocialDb};

/// Who is asking to read a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    LocalAuthor(Uuid),
    ForeignAuthor(Uuid),
    /// A peer node browsing on behalf of its own users.
    Node(i64),
}

/// A SQL predicate over the `posts p` alias plus its named parameters.
#[derive(Debug, Clone)]
pub struct VisibilityFilter {
    pub sql: String,
    pub params: Vec<(&'static str, Value)>,
}

impl Viewer {
    pub fn filter(&self) -> VisibilityFilter {
        let friend = RelationKind::Friend as u32;
        let is_friend = format!(
            "EXISTS(SELECT 1 FROM relations r WHERE r.author_id = p.author_id AND r.other_id = :viewer AND r.kind = {friend})"
        );
        let is_foaf = format!(
            "EXISTS(SELECT 1 FROM relations r1 JOIN relations r2 ON r2.author_id = r1.other_id \
             WHERE r1.author_id = p.author_id AND r1.kind = {friend} AND r1.other_is_local = 1 \
             AND r2.other_id = :viewer AND r2.kind = {friend})"
        );
        match self {
            Viewer::Anonymous => VisibilityFilter {
                sql: "p.visibility = 'PUBLIC'".to_string(),
                params: Vec::new(),
            },
            Viewer::LocalAuthor(id) => VisibilityFilter {
                sql: format!(
                    "p.visibility IN ('PUBLIC', 'SERVERONLY') OR p.author_id = :viewer \
                     OR (p.visibility IN ('FRIENDS', 'FOAF') AND {is_friend}) \
                     OR (p.visibility = 'FOAF' AND {is_foaf})"
                ),
                params: vec![(":viewer", Value::Text(id.to_string()))],
            },
            Viewer::ForeignAuthor(id) => VisibilityFilter {
                sql: format!(
                    "p.visibility = 'PUBLIC' \
                     OR (p.visibility IN ('FRIENDS', 'FOAF') AND {is_friend}) \
                     OR (p.visibility = 'FOAF' AND {is_foaf})"
                ),
                params: vec![(":viewer", Value::Text(id.to_string()))],
            },
            Viewer::Node(_) => VisibilityFilter {
                sql: "p.visibility NOT IN ('SERVERONLY', 'PRIVATE')".to_string(),
                params: Vec::new(),
            },
        }
    }
}

impl SocialDb {
    pub fn can_view(&self, viewer: Viewer, post_id: Uuid) -> SocialResult<bool> {
        Ok(self.post_visible(post_id, &viewer.filter())?)
    }
}
