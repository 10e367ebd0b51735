//! In-memory stand-ins for the external collaborators of a batch.
//!
//! Each fake is cheap to clone and shares its state between clones, so a test
//! can hand one copy to the pipeline and keep another to inspect the calls.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use url::Url;

use crate::{
    domain::{SearchResult, UpfitterRecord},
    services::{
        BrowserContext, ContextLauncher, LanguageModel, PersistenceSink, ReachabilityProbe,
        SearchProvider,
    },
};

struct Rule {
    needles: Vec<String>,
    replies: Vec<Option<String>>,
    served: usize,
}

/// Language model answering from a script of `needle -> reply` rules.
///
/// The first rule whose needles all appear in the prompt answers. A rule with
/// several replies serves them in order and repeats the last one. Prompts no
/// rule matches get an empty answer.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    rules: Arc<Mutex<Vec<Rule>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_when(self, needle: &str, reply: &str) -> Self {
        self.push(&[needle], vec![Some(reply.to_string())])
    }

    pub fn reply_when_all(self, needles: &[&str], reply: &str) -> Self {
        self.push(needles, vec![Some(reply.to_string())])
    }

    pub fn replies_when(self, needle: &str, replies: Vec<&str>) -> Self {
        self.push(
            &[needle],
            replies.into_iter().map(|r| Some(r.to_string())).collect(),
        )
    }

    /// Provider error for every matching prompt.
    pub fn fail_when(self, needle: &str) -> Self {
        self.push(&[needle], vec![None])
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn push(self, needles: &[&str], replies: Vec<Option<String>>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            needles: needles.iter().map(|n| n.to_string()).collect(),
            replies,
            served: 0,
        });
        self
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str, _system: Option<&str>) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let mut rules = self.rules.lock().unwrap();
        let Some(rule) = rules
            .iter_mut()
            .find(|rule| rule.needles.iter().all(|n| prompt.contains(n.as_str())))
        else {
            return Ok(String::new());
        };

        let index = rule.served.min(rule.replies.len().saturating_sub(1));
        rule.served += 1;

        match rule.replies.get(index).cloned().flatten() {
            Some(reply) => Ok(reply),
            None => Err(anyhow!("scripted provider failure")),
        }
    }
}

#[derive(Default)]
struct BrowserState {
    pages: HashMap<String, String>,
    failing: HashSet<String>,
    launch_limit: Option<usize>,
    launched: usize,
    open: usize,
    in_flight: usize,
    peak_in_flight: usize,
    loads: Vec<String>,
}

/// Launches in-memory contexts that serve canned html.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    state: Arc<Mutex<BrowserState>>,
    latency: Duration,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn page(self, url: &str, html: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(normalize(url), html.to_string());
        self
    }

    pub fn fail_url(self, url: &str) -> Self {
        self.state.lock().unwrap().failing.insert(normalize(url));
        self
    }

    /// The first `n` launches succeed, every later one fails.
    pub fn fail_launch_after(self, n: usize) -> Self {
        self.state.lock().unwrap().launch_limit = Some(n);
        self
    }

    pub fn peak_in_flight(&self) -> usize {
        self.state.lock().unwrap().peak_in_flight
    }

    pub fn open_contexts(&self) -> usize {
        self.state.lock().unwrap().open
    }

    pub fn launched(&self) -> usize {
        self.state.lock().unwrap().launched
    }

    pub fn loads(&self) -> Vec<String> {
        self.state.lock().unwrap().loads.clone()
    }
}

#[async_trait]
impl ContextLauncher for FakeLauncher {
    async fn launch(&self) -> anyhow::Result<Box<dyn BrowserContext>> {
        let mut state = self.state.lock().unwrap();
        if state.launch_limit.is_some_and(|limit| state.launched >= limit) {
            return Err(anyhow!("browser failed to start"));
        }
        state.launched += 1;
        state.open += 1;

        Ok(Box::new(FakeContext {
            state: self.state.clone(),
            latency: self.latency,
        }))
    }
}

struct FakeContext {
    state: Arc<Mutex<BrowserState>>,
    latency: Duration,
}

#[async_trait]
impl BrowserContext for FakeContext {
    async fn load(&mut self, url: &Url) -> anyhow::Result<String> {
        {
            let mut state = self.state.lock().unwrap();
            state.in_flight += 1;
            state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
            state.loads.push(url.to_string());
        }
        let _in_flight = InFlight(self.state.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let state = self.state.lock().unwrap();
        if state.failing.contains(url.as_str()) {
            return Err(anyhow!("navigation to {} timed out", url));
        }
        Ok(state
            .pages
            .get(url.as_str())
            .cloned()
            .unwrap_or(format!("<body>Welcome to {}</body>", url)))
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.state.lock().unwrap().open -= 1;
        Ok(())
    }
}

// Decrements the in-flight counter even when the load is cancelled
struct InFlight(Arc<Mutex<BrowserState>>);

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Ok(mut state) = self.0.lock() {
            state.in_flight -= 1;
        }
    }
}

fn normalize(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or(url.to_string())
}

/// Search provider serving canned pages keyed by query and offset.
#[derive(Clone, Default)]
pub struct FakeSearch {
    pages: Arc<Mutex<HashMap<(String, u32), Vec<SearchResult>>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<(String, u32)>>>,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(self, query: &str, start: u32, results: Vec<SearchResult>) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert((query.to_string(), start), results);
        self
    }

    pub fn fail_query(self, query: &str) -> Self {
        self.failing.lock().unwrap().insert(query.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, query: &str, start: u32) -> anyhow::Result<Vec<SearchResult>> {
        self.calls.lock().unwrap().push((query.to_string(), start));

        if self.failing.lock().unwrap().contains(query) {
            return Err(anyhow!("search quota exceeded"));
        }
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&(query.to_string(), start))
            .cloned()
            .unwrap_or_default())
    }
}

/// Reachability probe with a fixed set of live urls.
#[derive(Clone, Default)]
pub struct FakeProbe {
    reachable: Arc<Mutex<HashSet<String>>>,
    probed: Arc<Mutex<Vec<String>>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reachable(self, url: &str) -> Self {
        self.reachable.lock().unwrap().insert(url.to_string());
        self
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReachabilityProbe for FakeProbe {
    async fn is_reachable(&self, url: &str) -> bool {
        self.probed.lock().unwrap().push(url.to_string());
        self.reachable.lock().unwrap().contains(url)
    }
}

/// Persistence sink keeping every write in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    writes: Arc<Mutex<Vec<(String, Vec<UpfitterRecord>)>>>,
    rejects: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write fails the way an expired credential does.
    pub fn rejecting() -> Self {
        MemorySink {
            rejects: true,
            ..Self::default()
        }
    }

    pub fn writes(&self) -> Vec<(String, Vec<UpfitterRecord>)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn replace_rows(&self, destination: &str, records: &[UpfitterRecord]) -> anyhow::Result<()> {
        if self.rejects {
            return Err(anyhow!("Sheets authentication failed (401 Unauthorized)"));
        }
        self.writes
            .lock()
            .unwrap()
            .push((destination.to_string(), records.to_vec()));
        Ok(())
    }
}
