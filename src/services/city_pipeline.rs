use std::{
    collections::HashSet,
    sync::{Arc, LazyLock},
};

use itertools::Itertools;
use regex::Regex;

use crate::{
    configuration::PipelineSettings,
    domain::{PipelineJob, SearchResult, UpfitterRecord},
};

use super::{
    scrape_page, Classifier, ContextPool, Extractor, LanguageModel, Pacer, SearchProvider,
};

static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*\u{2022}]+|\d+[.)])\s*").unwrap());

const NAME_FILTERS: [&str; 3] = [
    "From the list below, filter out any companies that do not perform installations.",
    "From the list below, keep only the companies that specialize in fleet and commercial installations.",
    "From the list below, filter out any companies that only sell products and do not perform installations themselves.",
];

/// Classify, scrape and extract for a single city. Stages run in order, errors stay per item.
pub struct CityPipeline {
    search: Arc<dyn SearchProvider>,
    llm: Arc<dyn LanguageModel>,
    classifier: Classifier,
    extractor: Extractor,
    pacer: Arc<Pacer>,
    settings: PipelineSettings,
}

impl CityPipeline {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        llm: Arc<dyn LanguageModel>,
        pacer: Arc<Pacer>,
        settings: PipelineSettings,
    ) -> Self {
        CityPipeline {
            search,
            classifier: Classifier::new(llm.clone(), pacer.clone()),
            extractor: Extractor::new(llm.clone(), pacer.clone()),
            llm,
            pacer,
            settings,
        }
    }

    pub async fn run_search(&self, job: &PipelineJob, pool: &ContextPool) -> Vec<UpfitterRecord> {
        let results = self.search_results(job).await;
        if results.is_empty() {
            log::info!("No results for {}", job.city);
            return vec![];
        }

        let mut relevant = vec![];
        for result in results {
            if self.classifier.is_upfitter(&result).await {
                relevant.push(result);
            }
            self.pacer.pause().await;
        }
        log::info!("{}: {} relevant results", job.city, relevant.len());

        let mut records = vec![];
        for result in relevant.iter().take(self.settings.max_results_per_city) {
            let Some(text) = scrape_page(pool, &result.link, self.settings.max_text_chars).await
            else {
                continue;
            };

            if let Some(record) = self
                .extractor
                .extract_from_page(result, &text, &job.city)
                .await
            {
                records.push(record);
            }
            self.pacer.pause().await;
        }

        log::info!("Finished {}: {} upfitters found", job.city, records.len());
        records
    }

    /// Every query variant, page after page, first occurrence of a link wins.
    async fn search_results(&self, job: &PipelineJob) -> Vec<SearchResult> {
        let mut seen_links = HashSet::new();
        let mut results = vec![];

        for query in job.query_variants.iter() {
            for page in 0..self.settings.search_pages {
                let start = page * self.settings.results_per_page;

                self.pacer.permit().await;
                match self.search.search(query, start).await {
                    Ok(page_results) => {
                        let last_page = page_results.is_empty();
                        results.extend(
                            page_results
                                .into_iter()
                                .filter(|r| seen_links.insert(r.link.clone())),
                        );
                        if last_page {
                            break;
                        }
                    }
                    Err(e) => {
                        log::error!("Search failed for '{}' at {}: {:?}", query, start, e);
                        break;
                    }
                }
            }
        }

        results
    }

    pub async fn run_model_only(&self, job: &PipelineJob) -> Vec<UpfitterRecord> {
        let prompt = format!(
            "Give me a list of {} installers and upfitters that do police and emergency vehicles in {}. Return only the names, one per line.",
            self.settings.max_results_per_city, job.city
        );

        let Some(mut names) = self.ask_for_names(&prompt, &job.city).await else {
            return vec![];
        };

        for filter in NAME_FILTERS {
            if names.is_empty() {
                break;
            }
            let prompt = format!(
                "{}\nReturn the updated list as a plain list of names, one per line.\n\nList:\n{}",
                filter,
                names.join("\n")
            );
            match self.ask_for_names(&prompt, &job.city).await {
                Some(filtered) => names = filtered,
                None => return vec![],
            }
        }

        let mut records = vec![];
        for name in names.iter().take(self.settings.max_results_per_city) {
            records.push(self.extractor.extract_from_name(name, &job.city).await);
            self.pacer.pause().await;
        }

        log::info!("Finished {}: {} upfitters listed", job.city, records.len());
        records
    }

    async fn ask_for_names(&self, prompt: &str, city: &str) -> Option<Vec<String>> {
        self.pacer.permit().await;
        match self.llm.complete(prompt, None).await {
            Ok(answer) => Some(parse_name_lines(&answer)),
            Err(e) => {
                log::error!("Error listing upfitters for {}: {:?}", city, e);
                None
            }
        }
    }
}

/// Names from a line-per-name answer, without bullets, numbering, or lead-in lines.
pub fn parse_name_lines(answer: &str) -> Vec<String> {
    answer
        .lines()
        .map(|line| LIST_MARKER.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty() && !line.ends_with(':') && !line.starts_with("```"))
        .unique_by(|line| line.to_lowercase())
        .collect()
}
