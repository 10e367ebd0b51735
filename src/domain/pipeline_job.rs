const CITY_PLACEHOLDER: &str = "{city}";

/// How a city's candidates are discovered before extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Search provider results, relevance gate, page scrape, extraction.
    Search,
    /// Names listed by the language model, extracted without a page.
    ModelOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineJob {
    pub city: String,
    pub query_variants: Vec<String>,
}

impl PipelineJob {
    pub fn new(city: &str, query_templates: &[String]) -> Self {
        let query_variants = query_templates
            .iter()
            .map(|template| match template.contains(CITY_PLACEHOLDER) {
                true => template.replace(CITY_PLACEHOLDER, city),
                false => format!("{} {}", template, city),
            })
            .collect();

        PipelineJob {
            city: city.to_string(),
            query_variants,
        }
    }
}
