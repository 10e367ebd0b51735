use std::sync::Mutex;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tokio::sync::{Semaphore, SemaphorePermit};
use url::Url;

use super::PipelineError;

/// One reusable page-loading context (a browser session, or a plain http client).
#[async_trait]
pub trait BrowserContext: Send {
    /// Navigates to `url` and returns the document html.
    async fn load(&mut self, url: &Url) -> anyhow::Result<String>;

    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ContextLauncher: Send + Sync {
    async fn launch(&self) -> anyhow::Result<Box<dyn BrowserContext>>;
}

/// Fixed set of contexts. A load waits for a free context instead of opening a new one.
///
/// `close` shuts the contexts down in place. A pool dropped without it (a cancelled batch)
/// hands its contexts to a background task that closes them.
pub struct ContextPool {
    idle: Mutex<Vec<Box<dyn BrowserContext>>>,
    permits: Semaphore,
}

/// A context checked out of the pool. Goes back on drop, whatever happened meanwhile.
pub struct PooledContext<'a> {
    pool: &'a ContextPool,
    context: Option<Box<dyn BrowserContext>>,
    _permit: SemaphorePermit<'a>,
}

impl ContextPool {
    pub async fn launch(
        launcher: &dyn ContextLauncher,
        width: usize,
    ) -> Result<ContextPool, PipelineError> {
        let width = width.max(1);
        let mut contexts = Vec::with_capacity(width);

        for _ in 0..width {
            match launcher.launch().await {
                Ok(context) => contexts.push(context),
                Err(e) => {
                    log::error!("Failed to launch browser context: {:?}", e);
                    close_all(contexts).await;
                    return Err(PipelineError::Resource(format!(
                        "Failed to launch browser context: {:#}",
                        e
                    )));
                }
            }
        }

        log::info!("Launched browser pool with {} contexts", width);
        Ok(ContextPool {
            idle: Mutex::new(contexts),
            permits: Semaphore::new(width),
        })
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    pub async fn acquire(&self) -> anyhow::Result<PooledContext<'_>> {
        let permit = self
            .permits
            .acquire()
            .await
            .context("Browser pool is closed")?;

        let context = self
            .idle
            .lock()
            .map_err(|_| anyhow!("Browser pool lock poisoned"))?
            .pop()
            .ok_or(anyhow!("No idle browser context"))?;

        Ok(PooledContext {
            pool: self,
            context: Some(context),
            _permit: permit,
        })
    }

    pub async fn load(&self, url: &Url) -> anyhow::Result<String> {
        let mut context = self.acquire().await?;
        context.load(url).await
    }

    pub async fn close(self) {
        self.permits.close();
        close_all(self.take_idle()).await;
        log::info!("Closed browser pool");
    }

    fn take_idle(&self) -> Vec<Box<dyn BrowserContext>> {
        match self.idle.lock() {
            Ok(mut idle) => std::mem::take(&mut *idle),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Drop for ContextPool {
    fn drop(&mut self) {
        let contexts = self.take_idle();
        if contexts.is_empty() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                log::warn!(
                    "Browser pool dropped while open, closing {} contexts",
                    contexts.len()
                );
                runtime.spawn(close_all(contexts));
            }
            Err(_) => log::error!(
                "Browser pool dropped outside a runtime, leaking {} contexts",
                contexts.len()
            ),
        }
    }
}

impl PooledContext<'_> {
    pub async fn load(&mut self, url: &Url) -> anyhow::Result<String> {
        match self.context.as_mut() {
            Some(context) => context.load(url).await,
            None => Err(anyhow!("Browser context already released")),
        }
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            match self.pool.idle.lock() {
                Ok(mut idle) => idle.push(context),
                Err(_) => log::error!("Browser pool lock poisoned, dropping context"),
            }
        }
    }
}

async fn close_all(contexts: Vec<Box<dyn BrowserContext>>) {
    for context in contexts {
        if let Err(e) = context.close().await {
            log::error!("Failed to close browser context: {:?}", e);
        }
    }
}
