/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use tracing::debug;
use uuid::Uuid;

use crate::error::{SocialError, SocialResult};
use crate::social_db::{now_ms, ImageRow, SocialDb};

/// Checks that `bytes` decode as an image and returns the mime type to store.
/// The sniffed format wins over what the client declared.
pub fn validate_image(bytes: &[u8], declared: Option<&str>, filename: Option<&str>) -> SocialResult<String> {
    if bytes.is_empty() {
        return Err(SocialError::UnsupportedMedia);
    }
    let format = image::guess_format(bytes).map_err(|_| SocialError::UnsupportedMedia)?;
    if let Err(e) = image::load_from_memory_with_format(bytes, format) {
        debug!("image decode failed: {e}");
        return Err(SocialError::UnsupportedMedia);
    }
    let sniffed = format.to_mime_type();
    if sniffed.starts_with("image/") {
        return Ok(sniffed.to_string());
    }
    let declared = declared
        .map(|s| s.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .filter(|s| s.starts_with("image/"))
        .or_else(|| {
            filename
                .and_then(|f| mime_guess::from_path(f).first())
                .map(|m| m.to_string())
                .filter(|m| m.starts_with("image/"))
        });
    declared.ok_or(SocialError::UnsupportedMedia)
}

pub fn data_uri(image_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", image_type, B64.encode(bytes))
}

/// Stores an uploaded image and links it to the post it illustrates.
pub fn attach_post_image(
    db: &SocialDb,
    author_id: Uuid,
    post_id: Uuid,
    bytes: Vec<u8>,
    declared: Option<&str>,
) -> SocialResult<ImageRow> {
    let image_type = validate_image(&bytes, declared, None)?;
    let row = ImageRow {
        id: Uuid::new_v4(),
        author_id,
        post_id: Some(post_id),
        image_type,
        bytes,
        created_at_ms: now_ms(),
    };
    db.insert_image(&row)?;
    db.set_post_image(post_id, row.id)?;
    Ok(row)
}
