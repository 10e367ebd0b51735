pub mod city_pipeline;
pub mod classifier;
pub mod context_pool;
pub mod data_persistance;
pub mod decode;
pub mod droid;
pub mod error;
pub mod extractor;
pub mod http_context;
pub mod openai_client;
pub mod orchestrator;
pub mod pacer;
pub mod page_scraper;
pub mod retry_filler;
pub mod search;
pub mod sentinel;

pub use city_pipeline::*;
pub use classifier::*;
pub use context_pool::*;
pub use data_persistance::*;
pub use decode::*;
pub use droid::*;
pub use error::*;
pub use extractor::*;
pub use http_context::*;
pub use openai_client::*;
pub use orchestrator::*;
pub use pacer::*;
pub use page_scraper::*;
pub use retry_filler::*;
pub use search::*;
pub use sentinel::*;
