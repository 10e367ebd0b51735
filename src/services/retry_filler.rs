use std::{sync::Arc, time::Duration};

use serde::Deserialize;

use crate::domain::UpfitterRecord;

use super::{decode, first_url, LanguageModel, Pacer};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MissingContact {
    phone: Option<String>,
    company_url: Option<String>,
}

/// Second chance for records that came out with neither a phone nor a url.
pub struct RetryFiller {
    llm: Arc<dyn LanguageModel>,
    pacer: Arc<Pacer>,
}

impl RetryFiller {
    pub fn new(llm: Arc<dyn LanguageModel>, pacer: Arc<Pacer>) -> Self {
        RetryFiller { llm, pacer }
    }

    pub async fn run(&self, records: &mut [UpfitterRecord], passes: u8, pass_delay: Duration) {
        for pass in 1..=passes {
            let pending = records
                .iter()
                .filter(|r| r.is_missing_contact_and_url())
                .count();
            if pending == 0 {
                break;
            }

            let filled = self.fill_pass(records).await;
            log::info!(
                "Retry pass {}/{}: filled {} of {} incomplete records",
                pass,
                passes,
                filled,
                pending
            );

            if pass < passes {
                tokio::time::sleep(pass_delay).await;
            }
        }
    }

    /// One query per incomplete record. Returns how many records gained a value.
    pub async fn fill_pass(&self, records: &mut [UpfitterRecord]) -> usize {
        let mut filled = 0;

        for record in records.iter_mut().filter(|r| r.is_missing_contact_and_url()) {
            let prompt = format!(
                r#"Find the phone number and company website URL for "{}" in {}. Return only a valid JSON object with exactly two keys: "phone" and "companyUrl". Use "NA" for a value you cannot find. Do not include any explanation, markdown, or extra text."#,
                record.name, record.city
            );

            self.pacer.permit().await;
            let answer = match self.llm.complete(&prompt, None).await {
                Ok(answer) => answer,
                Err(e) => {
                    log::error!("Openai error for {}: {:?}", record.name, e);
                    continue;
                }
            };

            let Some(contact) = decode::<MissingContact>(&answer) else {
                log::error!("Unusable retry answer for {}", record.name);
                continue;
            };

            let company_url = contact.company_url.and_then(|url| first_url(&url));
            if record.fill_gaps(contact.phone, company_url) {
                filled += 1;
            }
        }

        filled
    }
}
