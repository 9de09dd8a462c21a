//! Microsoft Graph: the three SharePoint reads the dashboard needs.
//!
//! Every call carries the caller's delegated token, so Graph enforces the
//! user's own SharePoint permissions. Outcomes are returned as
//! `Result<T, GraphError>` so callers can branch on `Denied` / `NotFound`
//! without inspecting transport errors.

pub mod client;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::auth::credential::DelegatedCredential;

pub use client::GraphClient;

/// Graph page cap for list item reads.
pub const MAX_ITEMS_PER_PAGE: u32 = 100;

// ── Errors ───────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("access denied by Graph (status {status})")]
    Denied { status: u16, code: Option<String> },

    #[error("resource not found")]
    NotFound { code: Option<String> },

    #[error("Graph request failed with status {status}")]
    Unexpected { status: u16, code: Option<String> },

    #[error("Graph request failed: {0}")]
    Transport(String),
}

impl GraphError {
    /// Graph's own error code (`accessDenied`, `itemNotFound`, ...) when it sent one.
    pub fn graph_code(&self) -> Option<&str> {
        match self {
            GraphError::Denied { code, .. }
            | GraphError::NotFound { code }
            | GraphError::Unexpected { code, .. } => code.as_deref(),
            GraphError::Transport(_) => None,
        }
    }
}

// ── Resources ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

/// A list item as Graph returns it. `fields` holds the SharePoint columns
/// when requested with `$expand=fields`; every other property is passed
/// through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct ListItemsPage {
    pub items: Vec<ListItem>,
    /// Set when Graph has more items than the requested page size.
    pub next_link: Option<String>,
}

/// Query options for a list item read. Always expands `fields`; `top` never
/// exceeds [`MAX_ITEMS_PER_PAGE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemsQuery {
    top: u32,
}

impl ItemsQuery {
    pub fn with_top(top: u32) -> Self {
        Self {
            top: top.clamp(1, MAX_ITEMS_PER_PAGE),
        }
    }

    pub fn top(&self) -> u32 {
        self.top
    }

    pub fn expand(&self) -> &'static str {
        "fields"
    }
}

impl Default for ItemsQuery {
    fn default() -> Self {
        Self::with_top(MAX_ITEMS_PER_PAGE)
    }
}

// ── Client seams ─────────────────────────────────────────────

/// The SharePoint reads, scoped to whichever credential built the client.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    async fn get_site(&self, site_id: &str) -> Result<Site, GraphError>;

    async fn get_list(&self, site_id: &str, list_id: &str) -> Result<List, GraphError>;

    async fn get_list_items(
        &self,
        site_id: &str,
        list_id: &str,
        query: ItemsQuery,
    ) -> Result<ListItemsPage, GraphError>;
}

/// Builds a Graph client for one user's delegated credential.
///
/// Only delegated credentials are accepted; there is no constructor for an
/// application identity.
pub trait GraphClientFactory: Send + Sync {
    fn for_user(&self, credential: DelegatedCredential) -> Arc<dyn DirectoryApi>;
}

/// Production factory: reqwest clients against the configured Graph base URL.
pub struct HttpGraphClientFactory {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGraphClientFactory {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

impl GraphClientFactory for HttpGraphClientFactory {
    fn for_user(&self, credential: DelegatedCredential) -> Arc<dyn DirectoryApi> {
        Arc::new(GraphClient::new(
            self.http.clone(),
            self.base_url.clone(),
            Box::new(credential),
        ))
    }
}
