use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::text::{normalize_ws, slice_between_ci, strip_tags};

/// One way of pulling a value out of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// CSS selector; text content unless `attr` names an attribute.
    Css {
        selector: String,
        #[serde(default)]
        attr: Option<String>,
    },
    /// Regular expression; capture `group` (default 1, or 0 without groups).
    Regex {
        pattern: String,
        #[serde(default)]
        group: Option<usize>,
    },
    /// Case-insensitive substring slice.
    Between { start: String, end: String },
}

impl Strategy {
    pub fn css(selector: &str) -> Self {
        Self::Css {
            selector: selector.to_string(),
            attr: None,
        }
    }

    pub fn css_attr(selector: &str, attr: &str) -> Self {
        Self::Css {
            selector: selector.to_string(),
            attr: Some(attr.to_string()),
        }
    }

    pub fn regex(pattern: &str) -> Self {
        Self::Regex {
            pattern: pattern.to_string(),
            group: None,
        }
    }

    pub fn between(start: &str, end: &str) -> Self {
        Self::Between {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Css { .. } => "css",
            Self::Regex { .. } => "regex",
            Self::Between { .. } => "between",
        }
    }

    fn matches(&self, html: &str, doc: &mut Option<Html>) -> Vec<String> {
        let found: Vec<String> = match self {
            Self::Css { selector, attr } => {
                let sel = match Selector::parse(selector) {
                    Ok(sel) => sel,
                    Err(e) => {
                        warn!(selector = %selector, error = %e, "invalid css selector; skipping");
                        return Vec::new();
                    }
                };
                let doc = doc.get_or_insert_with(|| Html::parse_document(html));
                doc.select(&sel)
                    .filter_map(|el| match attr {
                        Some(name) => el.value().attr(name).map(str::to_string),
                        None => Some(el.text().collect::<String>()),
                    })
                    .collect()
            }
            Self::Regex { pattern, group } => {
                let re = match Regex::new(pattern) {
                    Ok(re) => re,
                    Err(e) => {
                        warn!(pattern = %pattern, error = %e, "invalid regex; skipping");
                        return Vec::new();
                    }
                };
                let group = group.unwrap_or(if re.captures_len() > 1 { 1 } else { 0 });
                re.captures_iter(html)
                    .filter_map(|caps| caps.get(group).map(|m| strip_tags(m.as_str())))
                    .collect()
            }
            Self::Between { start, end } => slice_between_ci(html, start, end)
                .map(strip_tags)
                .into_iter()
                .collect(),
        };
        found
            .into_iter()
            .map(|v| normalize_ws(&v))
            .filter(|v| !v.is_empty())
            .collect()
    }
}

/// A value together with the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extracted {
    pub value: String,
    /// Position of the winning strategy in its chain.
    pub step: usize,
    pub kind: String,
}

/// Try each strategy in order; the first non-empty match wins.
pub fn extract(html: &str, chain: &[Strategy]) -> Option<Extracted> {
    let mut doc = None;
    chain.iter().enumerate().find_map(|(step, strategy)| {
        strategy
            .matches(html, &mut doc)
            .into_iter()
            .next()
            .map(|value| Extracted {
                value,
                step,
                kind: strategy.kind().to_string(),
            })
    })
}

/// Every match of the first strategy that yields anything.
pub fn extract_all(html: &str, chain: &[Strategy]) -> Vec<String> {
    let mut doc = None;
    for strategy in chain {
        let mut found = strategy.matches(html, &mut doc);
        if !found.is_empty() {
            found.dedup();
            return found;
        }
    }
    Vec::new()
}

/// Convenience for callers that only need the string.
pub fn extract_value(html: &str, chain: &[Strategy]) -> Option<String> {
    extract(html, chain).map(|e| e.value)
}
