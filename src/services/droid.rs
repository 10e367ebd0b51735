use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thirtyfour::{
    extensions::cdp::ChromeDevTools, CapabilitiesHelper, ChromiumLikeCapabilities,
    DesiredCapabilities, PageLoadStrategy, WebDriver,
};
use url::Url;

use super::{BrowserContext, ContextLauncher};

// Sub-resources a page never needs for its text
const BLOCKED_RESOURCES: [&str; 12] = [
    "*.css", "*.woff", "*.woff2", "*.ttf", "*.otf", "*.png", "*.jpg", "*.jpeg", "*.gif",
    "*.webp", "*.svg", "*.ico",
];

fn blocked_urls() -> Value {
    json!({ "urls": BLOCKED_RESOURCES })
}

async fn prepare_session(
    driver: &WebDriver,
    navigation_timeout: Duration,
) -> anyhow::Result<()> {
    driver.set_page_load_timeout(navigation_timeout).await?;

    let dev_tools = ChromeDevTools::new(driver.handle.clone());
    dev_tools.execute_cdp("Network.enable").await?;
    dev_tools
        .execute_cdp_with_params("Network.setBlockedURLs", blocked_urls())
        .await?;
    Ok(())
}

/// A WebDriver-controlled Chrome session.
pub struct Droid {
    pub driver: WebDriver,
}

pub struct DroidLauncher {
    webdriver_url: String,
    headless: bool,
    navigation_timeout: Duration,
}

impl DroidLauncher {
    pub fn new(webdriver_url: &str, headless: bool, navigation_timeout: Duration) -> Self {
        DroidLauncher {
            webdriver_url: webdriver_url.to_string(),
            headless,
            navigation_timeout,
        }
    }
}

#[async_trait]
impl ContextLauncher for DroidLauncher {
    async fn launch(&self) -> anyhow::Result<Box<dyn BrowserContext>> {
        let mut caps = DesiredCapabilities::chrome();
        if self.headless {
            caps.set_headless()?;
        }
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-setuid-sandbox")?;
        caps.add_arg("--blink-settings=imagesEnabled=false")?;
        caps.add_arg(&format!("--user-agent={}", fake_user_agent::get_rua()))?;
        // Return once the DOM is ready, like "domcontentloaded"
        caps.set_page_load_strategy(PageLoadStrategy::Eager)?;

        let driver = WebDriver::new(self.webdriver_url.as_str(), caps).await?;
        if let Err(e) = prepare_session(&driver, self.navigation_timeout).await {
            let _ = driver.quit().await;
            return Err(e);
        }

        Ok(Box::new(Droid { driver }))
    }
}

#[async_trait]
impl BrowserContext for Droid {
    async fn load(&mut self, url: &Url) -> anyhow::Result<String> {
        self.driver.goto(url.as_str()).await?;
        let source = self.driver.source().await?;
        Ok(source)
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.driver.quit().await?;
        Ok(())
    }
}
