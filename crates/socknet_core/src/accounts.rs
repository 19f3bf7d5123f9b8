/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::anyhow;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use socknet_protocol::{NodeRegistration, RegisterRequest};
use tracing::info;

use crate::error::{SocialError, SocialResult};
use crate::social_db::{AuthorRow, NodeRow, SocialDb};

const MAX_USERNAME_LEN: usize = 150;
const MIN_PASSWORD_LEN: usize = 1;

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("hash password: {e}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_USERNAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'))
}

/// New accounts stay inactive until an administrator approves them.
pub fn register(db: &SocialDb, req: &RegisterRequest) -> SocialResult<()> {
    let username = req.username.trim();
    if !is_valid_username(username) {
        return Err(SocialError::BadRequest("invalid username".to_string()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(SocialError::BadRequest("password required".to_string()));
    }
    if req.password != req.confirm_password {
        return Err(SocialError::BadRequest("passwords do not match".to_string()));
    }
    let hash = hash_password(&req.password)?;
    if !db.create_user(username, &hash, false)? {
        return Err(SocialError::BadRequest("username already taken".to_string()));
    }
    info!(username = %username, "registered user, waiting for approval");
    Ok(())
}

/// Activates each user and gives it an author if it has none yet.
pub fn approve_users(db: &SocialDb, usernames: &[String]) -> SocialResult<Vec<AuthorRow>> {
    let mut out = Vec::with_capacity(usernames.len());
    for username in usernames {
        if db.get_user(username)?.is_none() {
            return Err(SocialError::NotFound("user"));
        }
        db.set_user_active(username, true)?;
        let author = match db.get_author_by_username(username)? {
            Some(a) => a,
            None => db.create_author(username, username)?,
        };
        info!(username = %username, author = %author.id, "approved user");
        out.push(author);
    }
    Ok(out)
}

pub fn register_node(db: &SocialDb, reg: &NodeRegistration) -> SocialResult<NodeRow> {
    let url = reg.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(SocialError::BadRequest("node url must be http(s)".to_string()));
    }
    if reg.username.trim().is_empty() || reg.password.is_empty() {
        return Err(SocialError::BadRequest("node credentials required".to_string()));
    }
    let hash = hash_password(&reg.password)?;
    let node = db.upsert_node(
        reg.name.trim(),
        url,
        reg.username.trim(),
        &hash,
        reg.foreign_username.trim(),
        &reg.foreign_password,
    )?;
    info!(node = %node.url, id = node.id, "registered node");
    Ok(node)
}
