//! URL-rewrite handlers.
//!
//! Each handler is a declarative `domain suffix -> rule` table. A rewrite
//! only changes the URL (and may guess a title from the path); content is
//! left empty so the chain keeps going with the new URL.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tidyread_core::{Error, PreHandleResult};
use url::Url;

use super::{HandleContext, Handler, HandlerPriority, host_matches};
use crate::fetch::{guard_url, strip_tracking_params};

static SLUG_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[-_+]+").expect("invalid regex"));

/// A pure URL transformation.
#[derive(Debug, Clone)]
pub enum RewriteRule {
    /// Leave the URL alone. Title synthesis still applies.
    Identity,
    SetQueryParam { name: &'static str, value: &'static str },
    RemoveQueryParam(&'static str),
    /// Replace a leading host label sequence, e.g. `m.` to `www.`.
    SwapHostPrefix { from: &'static str, to: &'static str },
    /// Drop one label anywhere in the host, e.g. `en.m.wikipedia.org`.
    StripHostLabel(&'static str),
    ReplaceHost(&'static str),
    PathRewrite { pattern: Regex, replacement: &'static str },
    /// Replace a redirector URL with the http(s) target in the first
    /// listed query parameter that holds one.
    UnwrapQueryParam(&'static [&'static str]),
}

impl RewriteRule {
    pub fn path(pattern: &str, replacement: &'static str) -> Self {
        Self::PathRewrite { pattern: Regex::new(pattern).expect("invalid rewrite pattern"), replacement }
    }

    /// The rewritten URL, or `None` when the rule leaves `url` unchanged.
    pub fn apply(&self, url: &Url) -> Option<Url> {
        let mut target = url.clone();
        match self {
            Self::Identity => return None,
            Self::SetQueryParam { name, value } => {
                let mut pairs: Vec<(String, String)> = url
                    .query_pairs()
                    .filter(|(k, _)| k != name)
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                pairs.push((name.to_string(), value.to_string()));
                target.query_pairs_mut().clear().extend_pairs(pairs);
            }
            Self::RemoveQueryParam(name) => {
                let pairs: Vec<(String, String)> = url
                    .query_pairs()
                    .filter(|(k, _)| k != name)
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                if pairs.is_empty() {
                    target.set_query(None);
                } else {
                    target.query_pairs_mut().clear().extend_pairs(pairs);
                }
            }
            Self::SwapHostPrefix { from, to } => {
                let host = url.host_str()?;
                let rest = host.strip_prefix(from)?;
                target.set_host(Some(format!("{to}{rest}").as_str())).ok()?;
            }
            Self::StripHostLabel(label) => {
                let host = url.host_str()?;
                let labels: Vec<&str> = host.split('.').filter(|l| l != label).collect();
                target.set_host(Some(labels.join(".").as_str())).ok()?;
            }
            Self::ReplaceHost(host) => {
                target.set_host(Some(*host)).ok()?;
            }
            Self::PathRewrite { pattern, replacement } => {
                let path = pattern.replace(url.path(), *replacement).into_owned();
                target.set_path(&path);
            }
            Self::UnwrapQueryParam(names) => {
                target = names.iter().find_map(|name| {
                    url.query_pairs()
                        .find(|(k, _)| k == name)
                        .and_then(|(_, v)| Url::parse(&v).ok())
                        .filter(|u| matches!(u.scheme(), "http" | "https"))
                })?;
                strip_tracking_params(&mut target);
            }
        }
        (target != *url).then_some(target)
    }
}

/// Best-effort title from the last path segment slug.
///
/// `/r/rust/comments/abc123/my_cool_post/` gives `My cool post`. Numeric or
/// single-word slugs give nothing.
pub fn title_from_path(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).next_back()?;
    if segment.contains('%') {
        return None;
    }
    let slug = match segment.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() && ext.len() <= 5 && ext.bytes().all(|b| b.is_ascii_alphanumeric()) => stem,
        _ => segment,
    };

    let mut words: Vec<&str> = SLUG_SEPARATOR.split(slug).filter(|w| !w.is_empty()).collect();
    if words.last().is_some_and(|w| is_trailing_id(w)) {
        words.pop();
    }
    if words.len() < 2 || words.iter().all(|w| w.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }

    let sentence = words.join(" ").to_lowercase();
    let mut chars = sentence.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

/// Numeric ids and hex hashes appended to slugs.
fn is_trailing_id(word: &str) -> bool {
    let digits = word.bytes().any(|b| b.is_ascii_digit());
    digits && (word.bytes().all(|b| b.is_ascii_digit()) || (word.len() >= 6 && word.bytes().all(|b| b.is_ascii_hexdigit())))
}

/// Table-driven URL rewrite handler.
#[derive(Debug, Clone)]
pub struct UrlRewriteHandler {
    name: &'static str,
    rules: Vec<(&'static str, RewriteRule)>,
    synthesize_title: bool,
}

impl UrlRewriteHandler {
    pub fn new(name: &'static str, rules: Vec<(&'static str, RewriteRule)>, synthesize_title: bool) -> Self {
        Self { name, rules, synthesize_title }
    }

    /// Reddit, Twitter/X, Facebook and Instagram.
    pub fn social() -> Self {
        Self::new(
            "social",
            vec![
                ("out.reddit.com", RewriteRule::UnwrapQueryParam(&["url"])),
                ("reddit.com", RewriteRule::ReplaceHost("old.reddit.com")),
                ("mobile.twitter.com", RewriteRule::ReplaceHost("twitter.com")),
                ("mobile.x.com", RewriteRule::ReplaceHost("x.com")),
                ("twitter.com", RewriteRule::Identity),
                ("x.com", RewriteRule::Identity),
                ("l.facebook.com", RewriteRule::UnwrapQueryParam(&["u"])),
                ("m.facebook.com", RewriteRule::ReplaceHost("www.facebook.com")),
                ("mbasic.facebook.com", RewriteRule::ReplaceHost("www.facebook.com")),
                ("l.instagram.com", RewriteRule::UnwrapQueryParam(&["u"])),
                ("m.instagram.com", RewriteRule::ReplaceHost("www.instagram.com")),
            ],
            true,
        )
    }

    /// AMP and mobile editions of news sites, plus single-page toggles.
    pub fn news() -> Self {
        Self::new(
            "news",
            vec![
                ("amp.theguardian.com", RewriteRule::ReplaceHost("www.theguardian.com")),
                ("amp.cnn.com", RewriteRule::ReplaceHost("www.cnn.com")),
                ("mobile.reuters.com", RewriteRule::ReplaceHost("www.reuters.com")),
                ("m.cnbc.com", RewriteRule::ReplaceHost("www.cnbc.com")),
                ("nytimes.com", RewriteRule::path(r"\.amp\.html$", ".html")),
                ("bbc.co.uk", RewriteRule::path(r"\.amp$", "")),
                ("bbc.com", RewriteRule::path(r"\.amp$", "")),
                ("independent.co.uk", RewriteRule::path(r"/amp$", "")),
                ("washingtonpost.com", RewriteRule::RemoveQueryParam("outputType")),
                ("theatlantic.com", RewriteRule::SetQueryParam { name: "single_page", value: "true" }),
            ],
            true,
        )
    }

    /// Mobile subdomains and redirectors of general sites.
    pub fn domain() -> Self {
        Self::new(
            "domain",
            vec![
                ("m.wikipedia.org", RewriteRule::StripHostLabel("m")),
                ("m.wiktionary.org", RewriteRule::StripHostLabel("m")),
                ("m.youtube.com", RewriteRule::ReplaceHost("www.youtube.com")),
                ("m.imdb.com", RewriteRule::ReplaceHost("www.imdb.com")),
                ("mobile.nytimes.com", RewriteRule::SwapHostPrefix { from: "mobile.", to: "www." }),
                ("m.huffpost.com", RewriteRule::SwapHostPrefix { from: "m.", to: "www." }),
                ("google.com", RewriteRule::UnwrapQueryParam(&["url", "q"])),
                ("href.li", RewriteRule::Identity),
            ],
            false,
        )
    }

    fn rule_for(&self, url: &Url) -> Option<&RewriteRule> {
        self.rules
            .iter()
            .find(|(domain, _)| host_matches(url, domain))
            .map(|(_, rule)| rule)
    }
}

#[async_trait]
impl Handler for UrlRewriteHandler {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> HandlerPriority {
        HandlerPriority::UrlRewrite
    }

    fn can_handle(&self, url: &Url) -> bool {
        self.rule_for(url).is_some()
    }

    fn rewrites_url(&self) -> bool {
        true
    }

    async fn handle(&self, url: &Url, _ctx: &HandleContext<'_>) -> Result<Option<PreHandleResult>, Error> {
        let Some(rule) = self.rule_for(url) else {
            return Ok(None);
        };

        let target = match rule.apply(url) {
            Some(rewritten) => match guard_url(&rewritten) {
                Ok(()) => rewritten,
                Err(e) => {
                    tracing::warn!(handler = self.name, url = %rewritten, error = %e, "ignoring blocked rewrite");
                    url.clone()
                }
            },
            None => url.clone(),
        };

        let title = if self.synthesize_title { title_from_path(&target) } else { None };
        if target == *url && title.is_none() {
            return Ok(None);
        }

        tracing::debug!(handler = self.name, from = %url, to = %target, "rewrote url");
        let mut result = PreHandleResult::new(target.as_str());
        result.title = title;
        Ok(Some(result))
    }
}
