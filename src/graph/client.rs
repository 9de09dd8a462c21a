//! Graph HTTP client bound to one delegated credential.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::{DirectoryApi, GraphError, ItemsQuery, List, ListItem, ListItemsPage, Site};
use crate::auth::credential::TokenCredential;

pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    credential: Box<dyn TokenCredential>,
}

#[derive(Deserialize)]
struct Collection<T> {
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct GraphErrorBody {
    error: GraphErrorDetail,
}

#[derive(Deserialize)]
struct GraphErrorDetail {
    #[serde(default)]
    code: Option<String>,
}

impl GraphClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        credential: Box<dyn TokenCredential>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            credential,
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, GraphError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| GraphError::Transport(format!("invalid Graph base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| GraphError::Transport("Graph base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, GraphError> {
        let access = self.credential.token();
        let resp = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(access.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| GraphError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| GraphError::Transport(format!("invalid Graph response: {}", e)));
        }

        let code = resp
            .json::<GraphErrorBody>()
            .await
            .ok()
            .and_then(|b| b.error.code);
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GraphError::Denied {
                status: status.as_u16(),
                code,
            },
            StatusCode::NOT_FOUND => GraphError::NotFound { code },
            _ => GraphError::Unexpected {
                status: status.as_u16(),
                code,
            },
        })
    }
}

#[async_trait]
impl DirectoryApi for GraphClient {
    async fn get_site(&self, site_id: &str) -> Result<Site, GraphError> {
        let url = self.url(&["sites", site_id])?;
        self.get_json(url, &[]).await
    }

    async fn get_list(&self, site_id: &str, list_id: &str) -> Result<List, GraphError> {
        let url = self.url(&["sites", site_id, "lists", list_id])?;
        self.get_json(url, &[]).await
    }

    async fn get_list_items(
        &self,
        site_id: &str,
        list_id: &str,
        query: ItemsQuery,
    ) -> Result<ListItemsPage, GraphError> {
        let url = self.url(&["sites", site_id, "lists", list_id, "items"])?;
        let params = [
            ("$expand", query.expand().to_string()),
            ("$top", query.top().to_string()),
        ];
        let page: Collection<ListItem> = self.get_json(url, &params).await?;
        Ok(ListItemsPage {
            items: page.value,
            next_link: page.next_link,
        })
    }
}
