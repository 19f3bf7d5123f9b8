/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

pub type SocialResult<T> = std::result::Result<T, SocialError>;

#[derive(Error, Debug)]
pub enum SocialError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unknown host: {0}")]
    UnknownHost(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("post does not exist")]
    PostNotFound,

    #[error("no pending friend request from {0}")]
    NoPendingRequest(String),

    #[error("an author cannot befriend itself")]
    SelfRelation,

    #[error("forbidden")]
    Forbidden,

    #[error("authentication required")]
    Unauthorized,

    #[error("unsupported media type")]
    UnsupportedMedia,

    #[error("remote node error: {0}")]
    Remote(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SocialError {
    pub fn status(&self) -> StatusCode {
        match self {
            SocialError::BadRequest(_) | SocialError::UnknownHost(_) | SocialError::SelfRelation => {
                StatusCode::BAD_REQUEST
            }
            SocialError::NotFound(_) | SocialError::PostNotFound => StatusCode::NOT_FOUND,
            SocialError::NoPendingRequest(_) => StatusCode::CONFLICT,
            SocialError::Forbidden => StatusCode::FORBIDDEN,
            SocialError::Unauthorized => StatusCode::UNAUTHORIZED,
            SocialError::UnsupportedMedia => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            SocialError::Remote(_) => StatusCode::BAD_GATEWAY,
            SocialError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for SocialError {
    fn from(e: rusqlite::Error) -> Self {
        SocialError::Internal(e.into())
    }
}

impl IntoResponse for SocialError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            // Peers match on the capitalised key for this one.
            SocialError::PostNotFound => serde_json::json!({ "Error": "Post does not exist" }),
            SocialError::Internal(e) => {
                error!("internal error: {e:#}");
                serde_json::json!({ "error": "internal error" })
            }
            other => serde_json::json!({ "error": other.to_string() }),
        };
        let mut resp = (status, axum::Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            resp.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"socknet\""),
            );
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(SocialError::UnknownHost("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(SocialError::PostNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(SocialError::NoPendingRequest("a".into()).status(), StatusCode::CONFLICT);
        assert_eq!(SocialError::Remote("down".into()).status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn unauthorized_carries_basic_challenge() {
        let resp = SocialError::Unauthorized.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().get(header::WWW_AUTHENTICATE).is_some());
    }
}
