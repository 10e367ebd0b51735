use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;

use crate::domain::{known, SearchResult, UpfitterRecord};

use super::{decode, LanguageModel, Pacer};

static HTTP_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>()\[\]]+"#).unwrap());

const EXTRACTION_SYSTEM: &str = "You extract business details from text. Reply with one JSON object and nothing else. Use \"NA\" for anything you cannot find.";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractedFields {
    name: Option<String>,
    phone: Option<String>,
    contact_details: Option<String>,
    owner_name: Option<String>,
    description: Option<String>,
    location: Option<String>,
    company_url: Option<String>,
}

pub struct Extractor {
    llm: Arc<dyn LanguageModel>,
    pacer: Arc<Pacer>,
}

impl Extractor {
    pub fn new(llm: Arc<dyn LanguageModel>, pacer: Arc<Pacer>) -> Self {
        Extractor { llm, pacer }
    }

    /// Structured record from a scraped page. `None` only when the model could not be reached.
    pub async fn extract_from_page(
        &self,
        result: &SearchResult,
        page_text: &str,
        city: &str,
    ) -> Option<UpfitterRecord> {
        let prompt = format!(
            r#"Extract the details of the company behind this web page.

Search title: {}
Search snippet: {}
Link: {}
Page text:
"""{}"""

Return a JSON object with exactly these string keys:
{{
  "name": "Company name",
  "phone": "Main phone number",
  "contactDetails": "Other contact details such as email or address",
  "ownerName": "Owner or founder name",
  "description": "Short overview of the company's installation services",
  "location": "City, State or full address"
}}"#,
            result.title, result.snippet, result.link, page_text
        );

        self.pacer.permit().await;
        let answer = match self.llm.complete(&prompt, Some(EXTRACTION_SYSTEM)).await {
            Ok(answer) => answer,
            Err(e) => {
                log::error!("Error extracting details for {}: {:?}", result.link, e);
                return None;
            }
        };

        let mut record = match decode::<ExtractedFields>(&answer) {
            Some(fields) => {
                let name = known(fields.name).unwrap_or(fallback_name(result));
                let mut record = UpfitterRecord::new(&name, city);
                record.phone = known(fields.phone);
                record.contact_details = known(fields.contact_details);
                record.owner_name = known(fields.owner_name);
                record.description = known(fields.description);
                record.location = known(fields.location);
                record
            }
            None => {
                log::warn!("Falling back to search data for {}", result.link);
                let mut record = UpfitterRecord::new(&fallback_name(result), city);
                record.description = known(Some(result.snippet.clone()));
                record
            }
        };

        // The link we scraped is the only url we trust
        record.company_url = known(Some(result.link.clone()));
        record.page_excerpt = Some(page_text.to_string());

        Some(record)
    }

    /// Record for a business known only by name, filled from the model's own knowledge.
    pub async fn extract_from_name(&self, name: &str, city: &str) -> UpfitterRecord {
        let prompt = format!(
            r#"For the vehicle upfitter "{}" in {}, return a JSON object with the following structure:
{{
  "name": "Upfitter Name",
  "phone": "Phone Number",
  "ownerName": "Owner Name",
  "location": "City, State or Address",
  "description": "Short overview of the company",
  "companyUrl": "Official website url"
}}
Use "NA" for anything you do not know. Do not invent urls."#,
            name, city
        );

        let mut record = UpfitterRecord::new(name, city);

        self.pacer.permit().await;
        let answer = match self.llm.complete(&prompt, Some(EXTRACTION_SYSTEM)).await {
            Ok(answer) => answer,
            Err(e) => {
                log::error!("Error extracting details for {}: {:?}", name, e);
                return record;
            }
        };

        if let Some(fields) = decode::<ExtractedFields>(&answer) {
            record.phone = known(fields.phone);
            record.contact_details = known(fields.contact_details);
            record.owner_name = known(fields.owner_name);
            record.description = known(fields.description);
            record.location = known(fields.location);
            record.company_url = known(fields.company_url).and_then(|url| first_url(&url));
        }

        record
    }
}

/// The first http(s) url in a model answer, e.g. out of an html anchor or markdown link.
pub fn first_url(text: &str) -> Option<String> {
    HTTP_URL
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':']).to_string())
}

fn fallback_name(result: &SearchResult) -> String {
    match known(Some(result.title.clone())) {
        Some(title) => title,
        None => url::Url::parse(&result.link)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
            .unwrap_or(result.link.clone()),
    }
}
