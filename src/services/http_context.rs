use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use url::Url;

use super::{BrowserContext, ContextLauncher};

/// Browserless backend: fetches the document only, so sub-resources are never loaded.
pub struct HttpContext {
    client: Client,
}

pub struct HttpLauncher {
    navigation_timeout: Duration,
}

impl HttpLauncher {
    pub fn new(navigation_timeout: Duration) -> Self {
        HttpLauncher { navigation_timeout }
    }
}

#[async_trait]
impl ContextLauncher for HttpLauncher {
    async fn launch(&self) -> anyhow::Result<Box<dyn BrowserContext>> {
        let client = Client::builder()
            .timeout(self.navigation_timeout)
            .user_agent(fake_user_agent::get_rua())
            .cookie_store(true)
            .build()?;

        Ok(Box::new(HttpContext { client }))
    }
}

#[async_trait]
impl BrowserContext for HttpContext {
    async fn load(&mut self, url: &Url) -> anyhow::Result<String> {
        let res = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to load {}", url))?
            .error_for_status()?;

        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_lowercase();
        if !content_type.contains("html") && !content_type.starts_with("text/") {
            bail!("Non html content at {}: {}", url, content_type);
        }

        Ok(res.text().await?)
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        Ok(())
    }
}
