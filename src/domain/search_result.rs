use serde::{Deserialize, Serialize};

/// One organic hit from the search provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

impl SearchResult {
    pub fn new(title: &str, link: &str, snippet: &str) -> Self {
        SearchResult {
            title: title.to_string(),
            link: link.to_string(),
            snippet: snippet.to_string(),
        }
    }
}
