use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{redirect::Policy, Client};
use url::Url;

use crate::domain::UpfitterRecord;

const MAX_REDIRECTS: usize = 10;

/// Live check of a url. Never errors, unreachable is the answer for any failure.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn is_reachable(&self, url: &str) -> bool;
}

pub struct Sentinel {
    client: Client,
}

impl Sentinel {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .user_agent(fake_user_agent::get_rua())
            .build()?;

        Ok(Sentinel { client })
    }
}

#[async_trait]
impl ReachabilityProbe for Sentinel {
    async fn is_reachable(&self, url: &str) -> bool {
        let Some(url) = parse_http_url(url) else {
            return false;
        };

        match self.client.get(url.clone()).send().await {
            Ok(res) => {
                let status = res.status();
                status.is_success() || status.is_redirection()
            }
            Err(e) => {
                log::debug!("Url {} is unreachable: {:?}", url, e);
                false
            }
        }
    }
}

pub fn parse_http_url(url: &str) -> Option<Url> {
    let parsed = Url::parse(url.trim()).ok()?;
    match (parsed.scheme(), parsed.host_str()) {
        ("http" | "https", Some(host)) if !host.is_empty() => Some(parsed),
        _ => None,
    }
}

/// Drops the records whose company url does not answer, probing `concurrency` at a time.
/// Records without a url have nothing to probe and are kept.
pub async fn filter_reachable(
    probe: &dyn ReachabilityProbe,
    records: Vec<UpfitterRecord>,
    concurrency: usize,
) -> Vec<UpfitterRecord> {
    let total = records.len();
    let mut reachable = Vec::with_capacity(total);
    let mut pending = records.into_iter().peekable();

    while pending.peek().is_some() {
        let batch: Vec<UpfitterRecord> = pending.by_ref().take(concurrency.max(1)).collect();
        let checks = join_all(batch.iter().map(|record| async move {
            match record.company_url.as_deref() {
                Some(url) => probe.is_reachable(url).await,
                None => true,
            }
        }))
        .await;

        reachable.extend(
            batch
                .into_iter()
                .zip(checks)
                .filter_map(|(record, ok)| ok.then_some(record)),
        );
        log::info!("Probed {} / {} company urls", total - pending.len(), total);
    }

    log::info!(
        "Dropped {} of {} records with unreachable urls",
        total - reachable.len(),
        total
    );
    reachable
}
