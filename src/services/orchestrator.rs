use std::{fmt, future::Future, sync::Arc};

use futures::future::join_all;
use serde::Serialize;

use crate::{
    configuration::PipelineSettings,
    domain::{CityListError, DiscoveryMode, PipelineJob, UpfitterRecord},
};

use super::{
    filter_reachable, CityPipeline, Classifier, ContextLauncher, ContextPool,
    LanguageModel, Pacer, PersistenceSink, PipelineError, ReachabilityProbe, RetryFiller,
    SearchProvider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchState {
    Idle,
    BatchRunning,
    Retrying,
    Validating,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub struct BatchRequest {
    pub request_id: String,
    pub cities: Vec<String>,
    pub mode: DiscoveryMode,
    pub destination: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub request_id: String,
    pub total_cities: usize,
    pub results_found: usize,
    pub data: Vec<UpfitterRecord>,
}

/// A batch that ended in `Failed`. `state` is where it failed, `partial` what it had by then.
#[derive(Debug, thiserror::Error)]
#[error("Batch failed while {state}: {error}")]
pub struct BatchFailure {
    pub state: BatchState,
    #[source]
    pub error: PipelineError,
    pub partial: Vec<UpfitterRecord>,
}

/// External collaborators of a batch.
pub struct Collaborators {
    pub search: Arc<dyn SearchProvider>,
    pub llm: Arc<dyn LanguageModel>,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub sink: Arc<dyn PersistenceSink>,
    pub launcher: Arc<dyn ContextLauncher>,
}

pub struct BatchOrchestrator {
    settings: PipelineSettings,
    pool_width: usize,
    search: Arc<dyn SearchProvider>,
    llm: Arc<dyn LanguageModel>,
    probe: Arc<dyn ReachabilityProbe>,
    sink: Arc<dyn PersistenceSink>,
    launcher: Arc<dyn ContextLauncher>,
}

struct Batch<'a> {
    id: &'a str,
    state: BatchState,
}

impl Batch<'_> {
    fn enter(&mut self, next: BatchState) {
        log::info!("[{}] {} -> {}", self.id, self.state, next);
        self.state = next;
    }

    fn fail(&mut self, error: PipelineError, partial: Vec<UpfitterRecord>) -> BatchFailure {
        log::error!("[{}] Failed while {}: {}", self.id, self.state, error);
        let failure = BatchFailure {
            state: self.state,
            error,
            partial,
        };
        self.state = BatchState::Failed;
        failure
    }
}

impl BatchOrchestrator {
    pub fn new(settings: PipelineSettings, pool_width: usize, collaborators: Collaborators) -> Self {
        BatchOrchestrator {
            settings,
            pool_width,
            search: collaborators.search,
            llm: collaborators.llm,
            probe: collaborators.probe,
            sink: collaborators.sink,
            launcher: collaborators.launcher,
        }
    }

    pub async fn run(&self, request: BatchRequest) -> Result<BatchReport, BatchFailure> {
        let mut batch = Batch {
            id: &request.request_id,
            state: BatchState::Idle,
        };

        if request.cities.is_empty() {
            return Err(batch.fail(PipelineError::Input(CityListError::Empty), vec![]));
        }

        let pacer = Arc::new(Pacer::from_settings(&self.settings));
        let jobs: Vec<PipelineJob> = request
            .cities
            .iter()
            .map(|city| PipelineJob::new(city, &self.settings.search_queries))
            .collect();

        batch.enter(BatchState::BatchRunning);
        let extracted = self
            .run_jobs(&batch, &jobs, request.mode, pacer.clone())
            .await;
        let mut records = extracted.map_err(|e| batch.fail(e, vec![]))?;
        log::info!("[{}] Extracted {} records", batch.id, records.len());

        batch.enter(BatchState::Retrying);
        RetryFiller::new(self.llm.clone(), pacer.clone())
            .run(
                &mut records,
                self.settings.retry_passes,
                self.settings.retry_pass_delay(),
            )
            .await;

        batch.enter(BatchState::Validating);
        let records = self.validate(&batch, records, pacer).await;

        batch.enter(BatchState::Persisting);
        if let Err(e) = self.sink.replace_rows(&request.destination, &records).await {
            return Err(batch.fail(PipelineError::Persistence(format!("{:#}", e)), records));
        }
        log::info!(
            "[{}] Persisted {} rows to {}",
            batch.id,
            records.len(),
            request.destination
        );

        batch.enter(BatchState::Done);
        Ok(BatchReport {
            request_id: request.request_id.clone(),
            total_cities: request.cities.len(),
            results_found: records.len(),
            data: records,
        })
    }

    async fn run_jobs(
        &self,
        batch: &Batch<'_>,
        jobs: &[PipelineJob],
        mode: DiscoveryMode,
        pacer: Arc<Pacer>,
    ) -> Result<Vec<UpfitterRecord>, PipelineError> {
        let pipeline = CityPipeline::new(
            self.search.clone(),
            self.llm.clone(),
            pacer,
            self.settings.clone(),
        );

        match mode {
            DiscoveryMode::Search => {
                let pool = ContextPool::launch(self.launcher.as_ref(), self.pool_width).await?;
                let records = self
                    .run_chunks(batch, jobs, |job| pipeline.run_search(job, &pool))
                    .await;
                pool.close().await;
                Ok(records)
            }
            DiscoveryMode::ModelOnly => Ok(self
                .run_chunks(batch, jobs, |job| pipeline.run_model_only(job))
                .await),
        }
    }

    /// Cities of a chunk run together, the next chunk starts once all of them are done.
    async fn run_chunks<'a, F, Fut>(
        &self,
        batch: &Batch<'_>,
        jobs: &'a [PipelineJob],
        run: F,
    ) -> Vec<UpfitterRecord>
    where
        F: Fn(&'a PipelineJob) -> Fut,
        Fut: Future<Output = Vec<UpfitterRecord>>,
    {
        let chunk_size = self.settings.chunk_size.max(1);
        let total_chunks = jobs.len().div_ceil(chunk_size);
        let mut records = vec![];

        for (i, chunk) in jobs.chunks(chunk_size).enumerate() {
            log::info!(
                "[{}] Processing chunk {} of {}: {:?}",
                batch.id,
                i + 1,
                total_chunks,
                chunk.iter().map(|job| job.city.as_str()).collect::<Vec<_>>()
            );

            let results = join_all(chunk.iter().map(&run)).await;
            for (job, found) in chunk.iter().zip(results) {
                log::info!("[{}] {}: {} records", batch.id, job.city, found.len());
                records.extend(found);
            }

            if i + 1 < total_chunks {
                tokio::time::sleep(self.settings.chunk_pause()).await;
            }
        }

        records
    }

    async fn validate(
        &self,
        batch: &Batch<'_>,
        records: Vec<UpfitterRecord>,
        pacer: Arc<Pacer>,
    ) -> Vec<UpfitterRecord> {
        let total = records.len();
        let mut records = filter_reachable(
            self.probe.as_ref(),
            records,
            self.settings.probe_concurrency,
        )
        .await;
        log::info!(
            "[{}] {} of {} records have a reachable company url",
            batch.id,
            records.len(),
            total
        );

        if self.settings.classify_company_urls {
            let classifier = Classifier::new(self.llm.clone(), pacer);
            for record in records.iter_mut() {
                record.is_company_url_valid = classifier.company_url_validity(record).await;
            }
        }

        records
    }
}
