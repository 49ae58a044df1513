//! REST access to the content API
//!
//! [`ContentApi`] is the seam the page object talks to; [`ApiClient`] is the
//! blocking HTTP implementation built from a resolved [`Connection`].

use anyhow::{bail, Result};
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::Connection;
use crate::error::ApiError;
use crate::expand::Expand;

const USER_AGENT: &str = concat!("confluence-tool/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoints the content object depends on
pub trait ContentApi {
    /// Fetch one content record, asking the server to expand `expand`
    fn get_page(&self, id: &str, expand: &Expand) -> Result<Value>;

    /// List labels of a content record: `{"results": [{"name": ...}, ...]}`
    fn get_labels(&self, id: &str) -> Result<Value>;
}

/// Blocking client for `{baseurl}/rest/api`
pub struct ApiClient {
    client: Client,
    baseurl: String,
    username: Option<String>,
    password: Option<String>,
}

impl ApiClient {
    pub fn new(connection: &Connection) -> Result<Self> {
        let baseurl = match connection.baseurl.as_deref() {
            Some(url) if !url.trim().is_empty() => url.trim_end_matches('/').to_string(),
            _ => bail!(ApiError::MissingBaseUrl),
        };

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ApiError::Transport)?;

        Ok(Self {
            client,
            baseurl,
            username: connection.username.clone(),
            password: connection.password.clone(),
        })
    }

    pub fn baseurl(&self) -> &str {
        &self.baseurl
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/api{}", self.baseurl, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }

    fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = self.url(path);
        debug!(%url, ?query, "GET");

        let response = self
            .authorize(self.client.get(&url).query(query))
            .send()
            .map_err(ApiError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            bail!(ApiError::Status {
                method: "GET",
                url,
                status: status.as_u16(),
            });
        }

        Ok(response.json::<Value>().map_err(ApiError::Transport)?)
    }

    /// Run a CQL search and return the matching content records
    pub fn search(&self, cql: &str, expand: &Expand, limit: usize) -> Result<Vec<Value>> {
        let mut query = vec![("cql", cql.to_string()), ("limit", limit.to_string())];
        if !expand.is_empty() {
            query.push(("expand", expand.to_query()));
        }

        let mut result = self.get_json("/content/search", &query)?;
        match result.get_mut("results").map(Value::take) {
            Some(Value::Array(records)) => Ok(records),
            _ => Ok(Vec::new()),
        }
    }
}

impl ContentApi for ApiClient {
    fn get_page(&self, id: &str, expand: &Expand) -> Result<Value> {
        let mut query = Vec::new();
        if !expand.is_empty() {
            query.push(("expand", expand.to_query()));
        }
        self.get_json(&format!("/content/{}", id), &query)
    }

    fn get_labels(&self, id: &str) -> Result<Value> {
        self.get_json(&format!("/content/{}/label", id), &[])
    }
}
