use std::sync::Arc;

use serde::Deserialize;

use crate::domain::{SearchResult, UpfitterRecord, UrlValidity};

use super::{decode, LanguageModel, Pacer};

const RELEVANCE_SYSTEM: &str = "You are a strict classifier of search results. Answer with a single word: yes or no.";

#[derive(Deserialize)]
struct UrlVerdict {
    #[serde(rename = "isCompanyUrlValid")]
    is_company_url_valid: String,
}

/// Relevance gate in front of the scraping and extraction budget.
///
/// Every ambiguity, parse failure and provider error answers "not relevant".
pub struct Classifier {
    llm: Arc<dyn LanguageModel>,
    pacer: Arc<Pacer>,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LanguageModel>, pacer: Arc<Pacer>) -> Self {
        Classifier { llm, pacer }
    }

    pub async fn is_upfitter(&self, result: &SearchResult) -> bool {
        let prompt = format!(
            r#"Decide if this search result is the website of a business that itself installs or upfits equipment into vehicles (for example police, emergency, fleet or commercial vehicle upfitting).
Answer "no" for directories, listing sites, job boards, news articles, blogs, social networks, and stores that only sell products without installing them.

Title: {}
Snippet: {}
Link: {}

Answer only yes or no."#,
            result.title, result.snippet, result.link
        );

        self.pacer.permit().await;
        match self.llm.complete(&prompt, Some(RELEVANCE_SYSTEM)).await {
            Ok(answer) => is_affirmative(&answer, "yes"),
            Err(e) => {
                log::error!("Relevance check failed for {}: {:?}", result.link, e);
                false
            }
        }
    }

    pub async fn company_url_validity(&self, record: &UpfitterRecord) -> UrlValidity {
        let Some(url) = record.company_url.as_deref() else {
            return UrlValidity::Invalid;
        };

        let prompt = format!(
            r#"Based on the information available for the website below, determine if the company meets ALL the following criteria:
1. They perform installation or upfitting services specifically for police or emergency vehicles.
2. They specialize in fleet or commercial vehicle installations.
3. They are not just a product seller, they must actually perform installations themselves.
Do NOT validate directories, social networks, hosting or website builder pages, news articles or blogs.

Company Name: {}
Website: {}
Extracted Website Text:
"""{}"""

Return only a JSON object with a single key "isCompanyUrlValid" which should be either "valid" or "invalid"."#,
            record.name,
            url,
            record.page_excerpt.as_deref().unwrap_or("(not available)")
        );

        self.pacer.permit().await;
        let answer = match self.llm.complete(&prompt, None).await {
            Ok(answer) => answer,
            Err(e) => {
                log::error!("Openai error for {}: {:?}", url, e);
                return UrlValidity::Invalid;
            }
        };

        let verdict = decode::<UrlVerdict>(&answer)
            .map(|v| v.is_company_url_valid)
            .unwrap_or(answer);

        match is_affirmative(&verdict, "valid") {
            true => UrlValidity::Valid,
            false => UrlValidity::Invalid,
        }
    }
}

/// The whole answer has to be the expected token, nothing more.
pub fn is_affirmative(answer: &str, token: &str) -> bool {
    answer
        .trim()
        .trim_end_matches('.')
        .trim_matches('"')
        .eq_ignore_ascii_case(token)
}
