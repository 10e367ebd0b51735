use std::time::Duration;

use serde::Deserialize;
use serde_aux::field_attributes::{deserialize_bool_from_anything, deserialize_number_from_string};

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub api_keys: ApiKeys,
    pub pipeline: PipelineSettings,
    pub browser: BrowserSettings,
    pub persistence: PersistenceSettings,
}

#[derive(Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
}

#[derive(Deserialize, Clone)]
pub struct ApiKeys {
    pub openai: String,
    pub serper: String,
    #[serde(default)]
    pub google_sheets: String,
}

/// Knobs of the enrichment pipeline. Every stage reads its limits from here.
#[derive(Deserialize, Clone, Debug)]
pub struct PipelineSettings {
    /// Cities in flight at once.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub chunk_size: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub chunk_pause_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub retry_passes: u8,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub retry_pass_delay_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub min_delay_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_delay_ms: u64,
    /// Shared token bucket for model and search calls, 0 disables it.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub requests_per_minute: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_results_per_city: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub search_pages: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub results_per_page: u32,
    pub search_queries: Vec<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub probe_timeout_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub probe_concurrency: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_text_chars: usize,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub classify_company_urls: bool,
    pub model: String,
}

impl PipelineSettings {
    pub fn retry_pass_delay(&self) -> Duration {
        Duration::from_millis(self.retry_pass_delay_ms)
    }

    pub fn chunk_pause(&self) -> Duration {
        Duration::from_millis(self.chunk_pause_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            chunk_size: 3,
            chunk_pause_ms: 500,
            retry_passes: 2,
            retry_pass_delay_ms: 2_000,
            min_delay_ms: 2_000,
            max_delay_ms: 5_000,
            requests_per_minute: 120,
            max_results_per_city: 20,
            search_pages: 2,
            results_per_page: 10,
            search_queries: vec!["Upfitters in {city}".to_string()],
            probe_timeout_secs: 5,
            probe_concurrency: 20,
            max_text_chars: 4_000,
            classify_company_urls: true,
            model: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BrowserBackend {
    Webdriver,
    Http,
}

#[derive(Deserialize, Clone)]
pub struct BrowserSettings {
    pub backend: BrowserBackend,
    pub webdriver_url: String,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub headless: bool,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub pool_width: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub navigation_timeout_secs: u64,
}

impl BrowserSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Sheets,
    JsonFile,
}

#[derive(Deserialize, Clone)]
pub struct PersistenceSettings {
    pub kind: SinkKind,
    #[serde(default)]
    pub spreadsheet_id: String,
    pub destination: String,
    pub output_dir: String,
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    // Keys may also come from a local .env file
    _ = dotenvy::dotenv();

    let base_path =
        std::env::current_dir().map_err(|e| config::ConfigError::Message(e.to_string()))?;
    let configuration_directory = base_path.join("configuration");

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
