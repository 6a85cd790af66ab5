//! Search-engine results page parsing.
//!
//! Parsing is deliberately confined to synchronous functions: `scraper`'s
//! DOM types are not `Send`, so no parsed document may live across an await.

use scraper::{Html, Selector};
use url::Url;

/// Result-link selectors tried in order. Covers DuckDuckGo's HTML endpoint
/// and Bing's organic results, plus a generic fallback.
const RESULT_SELECTORS: &[&str] = &["a.result__a", "li.b_algo h2 a", "h2 a[href]"];

/// An unscored search hit.
#[derive(Debug, Clone)]
pub struct RawCandidate {
    pub url: String,
    pub title: Option<String>,
}

/// Extract organic result links from a SERP body.
pub fn parse_serp(body: &str) -> Vec<RawCandidate> {
    let document = Html::parse_document(body);

    for selector_str in RESULT_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };

        let candidates: Vec<RawCandidate> = document
            .select(&selector)
            .filter_map(|element| {
                let href = element.value().attr("href")?;
                let url = resolve_result_url(href)?;
                let title = element.text().collect::<String>().trim().to_string();
                Some(RawCandidate {
                    url,
                    title: (!title.is_empty()).then_some(title),
                })
            })
            .collect();

        if !candidates.is_empty() {
            return candidates;
        }
    }

    Vec::new()
}

/// Turn a result href into an absolute external URL, unwrapping
/// DuckDuckGo's `uddg` redirect parameter.
fn resolve_result_url(href: &str) -> Option<String> {
    // DuckDuckGo wraps targets: //duckduckgo.com/l/?uddg=<encoded>&...
    if href.contains("uddg=") {
        let absolute = if href.starts_with("//") {
            format!("https:{href}")
        } else {
            href.to_string()
        };
        let parsed = Url::parse(&absolute).ok()?;
        let target = parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())?;
        return Url::parse(&target).ok().map(|u| u.to_string());
    }

    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }

    None
}
