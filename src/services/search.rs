use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::SearchResult;

const SERPER_URL: &str = "https://google.serper.dev/search";

/// Query plus result offset in, ordered organic results out.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, start: u32) -> anyhow::Result<Vec<SearchResult>>;
}

pub struct SerperClient {
    client: Client,
    api_key: String,
    url: String,
}

#[derive(Serialize)]
struct SerperQuery<'a> {
    q: &'a str,
    start: u32,
}

#[derive(Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SearchResult>,
}

impl SerperClient {
    pub fn new(api_key: String) -> Self {
        SerperClient::with_url(api_key, SERPER_URL)
    }

    pub fn with_url(api_key: String, url: &str) -> Self {
        SerperClient {
            client: Client::new(),
            api_key,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl SearchProvider for SerperClient {
    async fn search(&self, query: &str, start: u32) -> anyhow::Result<Vec<SearchResult>> {
        let response = self
            .client
            .post(&self.url)
            .header("X-API-KEY", &self.api_key)
            .json(&SerperQuery { q: query, start })
            .send()
            .await
            .context("No response from Serper")?
            .error_for_status()
            .context("Serper API failed")?;

        let body: SerperResponse = response
            .json()
            .await
            .context("Serper response is not valid json")?;

        Ok(body.organic)
    }
}
