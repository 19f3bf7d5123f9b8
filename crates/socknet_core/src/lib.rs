/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod accounts;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod federation;
pub mod friendship;
pub mod http_retry;
pub mod images;
pub mod render;
pub mod social_db;
pub mod visibility;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
