use std::{num::NonZeroU32, time::Duration};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand::Rng;

use crate::configuration::PipelineSettings;

/// Sleeps for a duration drawn uniformly from `[min_ms, max_ms]`.
pub async fn delay(min_ms: u64, max_ms: u64) {
    let ms = match min_ms < max_ms {
        true => rand::thread_rng().gen_range(min_ms..=max_ms),
        false => min_ms,
    };
    delay_fixed(ms).await
}

pub async fn delay_fixed(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Spacing between external calls, shared by every city job of a batch.
///
/// `permit` waits on a token bucket common to all workers, `pause` adds the
/// jittered gap between consecutive calls of one job.
pub struct Pacer {
    limiter: Option<DefaultDirectRateLimiter>,
    min_delay_ms: u64,
    max_delay_ms: u64,
}

impl Pacer {
    pub fn new(requests_per_minute: u32, min_delay_ms: u64, max_delay_ms: u64) -> Self {
        let limiter = NonZeroU32::new(requests_per_minute)
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));

        Pacer {
            limiter,
            min_delay_ms,
            max_delay_ms,
        }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Pacer::new(
            settings.requests_per_minute,
            settings.min_delay_ms,
            settings.max_delay_ms,
        )
    }

    pub fn unthrottled() -> Self {
        Pacer::new(0, 0, 0)
    }

    pub async fn permit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    pub async fn pause(&self) {
        delay(self.min_delay_ms, self.max_delay_ms).await
    }
}
