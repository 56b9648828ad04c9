//! Title extraction from ordered selectors with suffix stripping.

use std::collections::HashMap;
use std::sync::LazyLock;

use kuchikiki::NodeRef;
use regex::Regex;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("invalid regex"));

/// Attributes consulted before the element text, in order.
const VALUE_ATTRIBUTES: &[&str] = &["content"];

/// Where a handler looks for the title and what it strips from it.
#[derive(Debug, Clone)]
pub struct TitleExtractionConfig {
    /// CSS selectors tried in declared order.
    pub selectors: Vec<String>,
    /// Patterns removed from the matched title, applied in sequence.
    pub strip_patterns: Vec<Regex>,
    /// Per-domain replacement of `strip_patterns` (suffix match on host).
    pub site_overrides: HashMap<String, Vec<Regex>>,
}

impl Default for TitleExtractionConfig {
    fn default() -> Self {
        Self {
            selectors: ["meta[property=\"og:title\"]", "meta[name=\"twitter:title\"]", "h1", "title"]
                .into_iter()
                .map(String::from)
                .collect(),
            strip_patterns: vec![Regex::new(r"\s+\|\s+[^|]{1,40}$").expect("invalid regex")],
            site_overrides: HashMap::new(),
        }
    }
}

impl TitleExtractionConfig {
    /// Config with the given selectors and strip patterns.
    ///
    /// Patterns are compiled here; handler tables are static so a bad
    /// pattern is a programming error.
    pub fn new(selectors: &[&str], strip_patterns: &[&str]) -> Self {
        Self {
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            strip_patterns: strip_patterns
                .iter()
                .map(|p| Regex::new(p).expect("invalid title pattern"))
                .collect(),
            site_overrides: HashMap::new(),
        }
    }

    pub fn with_site_override(mut self, domain: &str, patterns: &[&str]) -> Self {
        self.site_overrides.insert(
            domain.to_ascii_lowercase(),
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("invalid title pattern"))
                .collect(),
        );
        self
    }

    /// Patterns to apply for a page on `host`.
    pub fn patterns_for(&self, host: &str) -> &[Regex] {
        let host = host.to_ascii_lowercase();
        self.site_overrides
            .iter()
            .find(|(domain, _)| host == **domain || host.ends_with(&format!(".{domain}")))
            .map_or(self.strip_patterns.as_slice(), |(_, patterns)| patterns.as_slice())
    }

    /// Run [`extract_title`] with this config for a page on `host`.
    pub fn extract(&self, document: &NodeRef, host: &str) -> Option<String> {
        extract_title(document, &self.selectors, self.patterns_for(host))
    }
}

/// Extract a title from `document`.
///
/// Selectors are tried in order and the first non-empty match wins. For each
/// matched element the `content` attribute is preferred over its text. Every
/// pattern is then removed from the match in sequence. Invalid selectors are
/// skipped.
pub fn extract_title(document: &NodeRef, selectors: &[String], patterns: &[Regex]) -> Option<String> {
    let raw = selectors.iter().find_map(|selector| {
        let Ok(matches) = document.select(selector) else {
            tracing::debug!(selector = %selector, "skipping invalid title selector");
            return None;
        };
        matches.into_iter().find_map(|element| {
            let from_attr = {
                let attrs = element.attributes.borrow();
                VALUE_ATTRIBUTES
                    .iter()
                    .find_map(|name| attrs.get(*name).map(collapse_whitespace).filter(|v| !v.is_empty()))
            };
            from_attr.or_else(|| Some(collapse_whitespace(&element.as_node().text_contents())).filter(|t| !t.is_empty()))
        })
    })?;

    let stripped = patterns
        .iter()
        .fold(raw.clone(), |title, pattern| pattern.replace_all(&title, "").into_owned());
    let stripped = collapse_whitespace(&stripped);

    if stripped.is_empty() { Some(raw) } else { Some(stripped) }
}

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}
