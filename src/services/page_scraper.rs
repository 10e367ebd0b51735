use scraper::{Html, Node, Selector};

use super::{parse_http_url, ContextPool};

const SKIPPED_TAGS: [&str; 6] = ["script", "style", "iframe", "noscript", "template", "svg"];

/// Visible text of a page, or `None` when it cannot be loaded or has no text.
pub async fn scrape_page(pool: &ContextPool, url: &str, max_chars: usize) -> Option<String> {
    let Some(parsed) = parse_http_url(url) else {
        log::error!("Error scraping {}: not an http url", url);
        return None;
    };

    match pool.load(&parsed).await {
        Ok(html) => {
            let text = visible_text(&html, max_chars);
            if text.is_none() {
                log::warn!("No visible text on {}", url);
            }
            text
        }
        Err(e) => {
            log::error!("Error scraping {}: {:?}", url, e);
            None
        }
    }
}

/// Drops scripts, styles and iframes, collapses whitespace and caps the length.
pub fn visible_text(html: &str, max_chars: usize) -> Option<String> {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").unwrap();
    let root = document
        .select(&body_selector)
        .next()
        .unwrap_or(document.root_element());

    let mut words: Vec<&str> = vec![];
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| SKIPPED_TAGS.contains(&element.name()))
        });
        if !hidden {
            let text: &str = text;
            words.extend(text.split_whitespace());
        }
    }

    let text: String = words.join(" ").chars().take(max_chars).collect();
    match text.is_empty() {
        true => None,
        false => Some(text),
    }
}

#[cfg(test)]
mod tests {
    use super::{scrape_page, visible_text};
    use crate::{services::ContextPool, testing::FakeLauncher};

    #[test]
    fn visible_text_strips_scripts_and_collapses_whitespace() {
        let html = r#"<html>
            <head><title>Ignored</title><style>body { color: red }</style></head>
            <body>
                <h1>Acme   Upfit</h1>
                <script>var tracking = "nope";</script>
                <p>Police and
                   emergency vehicle installs.</p>
                <iframe src="https://maps.example"><p>map</p></iframe>
                <noscript>Enable JS</noscript>
            </body>
        </html>"#;

        assert_eq!(
            visible_text(html, 4_000).as_deref(),
            Some("Acme Upfit Police and emergency vehicle installs.")
        );
    }

    #[test]
    fn visible_text_is_capped() {
        let html = "<body><p>Lights sirens consoles partitions</p></body>";

        assert_eq!(visible_text(html, 6).as_deref(), Some("Lights"));
        assert_eq!(visible_text("<body>   </body>", 100), None);
    }

    #[tokio::test]
    async fn failures_scrape_to_none() {
        let launcher = FakeLauncher::new()
            .page("https://acme.example/", "<body>Acme Upfit</body>")
            .fail_url("https://broken.example/");
        let pool = ContextPool::launch(&launcher, 1).await.unwrap();

        assert_eq!(
            scrape_page(&pool, "https://acme.example", 100).await.as_deref(),
            Some("Acme Upfit")
        );
        assert_eq!(scrape_page(&pool, "https://broken.example", 100).await, None);
        assert_eq!(scrape_page(&pool, "NA", 100).await, None);

        pool.close().await;
    }
}
