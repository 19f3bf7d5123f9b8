/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use socknet_protocol::NodeRegistration;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Base url of this node's API as peers register it, e.g. `https://node.example/api`.
    /// It is the `host` of every local author and the prefix of every link we hand out.
    #[serde(default = "default_public_url", alias = "base_url")]
    pub public_url: String,
    #[serde(default = "default_node_name")]
    pub node_name: String,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub admin_token: Option<String>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_http_connect_timeout_secs")]
    pub http_connect_timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_posts_page_size")]
    pub posts_page_size: u32,
    #[serde(default = "default_comments_page_size")]
    pub comments_page_size: u32,
    #[serde(default)]
    pub hsts_max_age_secs: u64,
    #[serde(default)]
    pub seed_nodes: Vec<NodeRegistration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: default_public_url(),
            node_name: default_node_name(),
            db_path: None,
            admin_token: None,
            max_body_bytes: default_max_body_bytes(),
            http_timeout_secs: default_http_timeout_secs(),
            http_connect_timeout_secs: default_http_connect_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            posts_page_size: default_posts_page_size(),
            comments_page_size: default_comments_page_size(),
            hsts_max_age_secs: 0,
            seed_nodes: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// `--config` path first, then `SOCKNET_CONFIG`, then the platform config dir.
    /// A missing file at the default location means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var("SOCKNET_CONFIG").ok().map(PathBuf::from);
        let (path, required) = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(p) => (Some(p), true),
            None => (default_config_path(), false),
        };
        let mut cfg = match path {
            Some(p) if p.exists() || required => {
                let text = std::fs::read_to_string(&p).with_context(|| format!("read config: {}", p.display()))?;
                let cfg: ServerConfig =
                    serde_json::from_str(&text).with_context(|| format!("parse config: {}", p.display()))?;
                info!(path = %p.display(), "loaded config");
                cfg
            }
            _ => ServerConfig::default(),
        };
        cfg.apply_env();
        cfg.normalize();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("SOCKNET_BIND") {
            match v.parse::<SocketAddr>() {
                Ok(addr) => self.bind = addr,
                Err(e) => warn!("SOCKNET_BIND invalid, keeping {}: {e}", self.bind),
            }
        }
        if let Ok(v) = std::env::var("SOCKNET_DB") {
            self.db_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SOCKNET_PUBLIC_URL") {
            self.public_url = v;
        }
        if let Some(v) = std::env::var("SOCKNET_ADMIN_TOKEN").ok().filter(|s| !s.trim().is_empty()) {
            self.admin_token = Some(v);
        }
    }

    fn normalize(&mut self) {
        self.public_url = self.public_url.trim().trim_end_matches('/').to_string();
        self.http_timeout_secs = self.http_timeout_secs.clamp(1, 120);
        self.http_connect_timeout_secs = self.http_connect_timeout_secs.clamp(1, 60);
        self.retry_attempts = self.retry_attempts.clamp(1, 5);
        self.posts_page_size = self.posts_page_size.clamp(1, 100);
        self.comments_page_size = self.comments_page_size.clamp(1, 100);
        if self.admin_token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            self.admin_token = None;
        }
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        if let Some(p) = &self.db_path {
            return Ok(p.clone());
        }
        let dir = default_data_dir()?;
        std::fs::create_dir_all(&dir).with_context(|| format!("create data dir: {}", dir.display()))?;
        Ok(dir.join("socknet.db"))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("net", "socknet", "Socknet")
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|p| p.config_dir().join("config.json"))
}

pub fn default_data_dir() -> Result<PathBuf> {
    let proj = project_dirs().context("unable to determine platform data dir")?;
    Ok(proj.data_local_dir().to_path_buf())
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_public_url() -> String {
    "http://127.0.0.1:8000/api".to_string()
}

fn default_node_name() -> String {
    "socknet".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_http_timeout_secs() -> u64 {
    20
}

fn default_http_connect_timeout_secs() -> u64 {
    5
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_posts_page_size() -> u32 {
    10
}

fn default_comments_page_size() -> u32 {
    5
}
