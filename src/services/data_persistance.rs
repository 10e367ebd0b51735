use std::path::PathBuf;

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{ser::SerializeMap, Serialize, Serializer};
use serde_json::json;

use crate::domain::{UpfitterRecord, SHEET_COLUMNS};

const SHEETS_URL: &str = "https://sheets.googleapis.com";

/// Where a finished batch ends up. A write replaces whatever the destination held.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn replace_rows(&self, destination: &str, records: &[UpfitterRecord])
        -> anyhow::Result<()>;
}

/// Google Sheets values API. `destination` is the sheet (tab) name.
pub struct SheetsSink {
    client: Client,
    spreadsheet_id: String,
    token: String,
    base_url: String,
}

impl SheetsSink {
    pub fn new(spreadsheet_id: &str, token: &str) -> Self {
        SheetsSink::with_url(spreadsheet_id, token, SHEETS_URL)
    }

    pub fn with_url(spreadsheet_id: &str, token: &str, base_url: &str) -> Self {
        SheetsSink {
            client: Client::new(),
            spreadsheet_id: spreadsheet_id.to_string(),
            token: token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url, self.spreadsheet_id, range
        )
    }

    async fn clear(&self, destination: &str) -> anyhow::Result<()> {
        let url = format!("{}:clear", self.values_url(&format!("{}!A1:Z", destination)));
        let res = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({}))
            .send()
            .await
            .context("No response from Sheets")?;

        check_status(res.status(), "clear")
    }

    async fn write(&self, destination: &str, records: &[UpfitterRecord]) -> anyhow::Result<()> {
        let range = format!("{}!A1", destination);
        let mut values: Vec<Vec<String>> =
            vec![SHEET_COLUMNS.iter().map(|c| c.to_string()).collect()];
        values.extend(records.iter().map(|r| r.sheet_row()));

        let res = self
            .client
            .put(self.values_url(&range))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(&self.token)
            .json(&json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": values,
            }))
            .send()
            .await
            .context("No response from Sheets")?;

        check_status(res.status(), "update")
    }
}

fn check_status(status: StatusCode, action: &str) -> anyhow::Result<()> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            bail!("Sheets authentication failed on {} ({})", action, status)
        }
        s if !s.is_success() => bail!("Sheets {} failed with {}", action, s),
        _ => Ok(()),
    }
}

#[async_trait]
impl PersistenceSink for SheetsSink {
    async fn replace_rows(
        &self,
        destination: &str,
        records: &[UpfitterRecord],
    ) -> anyhow::Result<()> {
        self.clear(destination).await?;
        self.write(destination, records).await?;

        log::info!("Wrote {} rows to sheet {}", records.len(), destination);
        Ok(())
    }
}

/// One persisted row as an object keyed by column, in column order.
struct FileRow(Vec<String>);

impl Serialize for FileRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(SHEET_COLUMNS.len()))?;
        for (column, value) in SHEET_COLUMNS.iter().zip(self.0.iter()) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Writes `<output_dir>/<destination>.json`, one object per row with the sheet columns.
pub struct JsonFileSink {
    output_dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        JsonFileSink {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl PersistenceSink for JsonFileSink {
    async fn replace_rows(
        &self,
        destination: &str,
        records: &[UpfitterRecord],
    ) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;

        let path = self.output_dir.join(format!("{}.json", destination));
        let rows: Vec<FileRow> = records.iter().map(|r| FileRow(r.sheet_row())).collect();
        let body = serde_json::to_string_pretty(&rows)?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        log::info!("Wrote {} records to {}", records.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use wiremock::{
        matchers::{body_partial_json, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::{JsonFileSink, PersistenceSink, SheetsSink};
    use crate::domain::{UpfitterRecord, UrlValidity, SHEET_COLUMNS};

    fn acme() -> UpfitterRecord {
        let mut record = UpfitterRecord::new("Acme Upfit", "Springfield, IL");
        record.phone = Some("217-555-0100".to_string());
        record.company_url = Some("https://acme.example".to_string());
        record.is_company_url_valid = UrlValidity::Valid;
        record
    }

    #[tokio::test]
    async fn sheets_sink_clears_then_writes_header_and_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-1/values/Upfitters!A1:Z:clear"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v4/spreadsheets/sheet-1/values/Upfitters!A1"))
            .and(query_param("valueInputOption", "RAW"))
            .and(body_partial_json(json!({
                "values": [
                    ["name", "phone", "companyUrl", "isCompanyUrlValid", "ownerName", "description", "location"],
                    ["Acme Upfit", "217-555-0100", "https://acme.example", "valid", "NA", "NA", "NA"]
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let sink = SheetsSink::with_url("sheet-1", "token-1", &server.uri());

        sink.replace_rows("Upfitters", &[acme()]).await.unwrap();
    }

    #[tokio::test]
    async fn sheets_sink_reports_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let sink = SheetsSink::with_url("sheet-1", "expired", &server.uri());
        let err = sink.replace_rows("Upfitters", &[acme()]).await.unwrap_err();

        assert!(err.to_string().contains("authentication failed"));
    }

    #[tokio::test]
    async fn json_file_sink_replaces_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("Excels"));

        sink.replace_rows("Upfitters", &[acme(), acme()]).await.unwrap();
        sink.replace_rows("Upfitters", &[acme()]).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("Excels/Upfitters.json")).unwrap();
        let rows: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["ownerName"], "NA");
        assert_eq!(rows[0]["isCompanyUrlValid"], "valid");
        assert_eq!(rows[0]["companyUrl"], "https://acme.example");
    }

    #[tokio::test]
    async fn json_file_sink_writes_the_sheet_columns_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path());
        let mut record = UpfitterRecord::new("Mail Only Upfit", "Springfield, IL");
        record.contact_details = Some("sales@mailonly.example".to_string());

        sink.replace_rows("Upfitters", &[record]).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("Upfitters.json")).unwrap();
        let positions: Vec<usize> = SHEET_COLUMNS
            .iter()
            .map(|column| written.find(&format!("\"{}\":", column)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(!written.contains("contactDetails"));
        assert!(!written.contains("\"city\""));

        let rows: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(rows[0].as_object().unwrap().len(), SHEET_COLUMNS.len());
        assert_eq!(rows[0]["phone"], "sales@mailonly.example");
        assert_eq!(rows[0]["companyUrl"], "NA");
    }
}
