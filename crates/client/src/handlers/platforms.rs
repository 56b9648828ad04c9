//! Site table for platform and newsletter handlers.

use url::Url;

use super::site::{SiteConfig, SiteHandler};
use super::{HandlerConfig, HandlerPriority};
use crate::extract::DomConfig;

const OG_TITLE: &str = "meta[property=\"og:title\"]";

fn repository_page(url: &Url) -> bool {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).count() >= 2)
        .unwrap_or(false)
}

fn question_page(url: &Url) -> bool {
    url.path().starts_with("/questions/")
        && url
            .path_segments()
            .and_then(|mut s| s.nth(1))
            .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
}

fn wiki_article(url: &Url) -> bool {
    url.path().starts_with("/wiki/")
}

fn github() -> SiteConfig {
    SiteConfig::new("github", HandlerPriority::Platform, &["github.com"])
        .filter(repository_page)
        .content(&["article.markdown-body", ".markdown-body", "#readme", ".comment-body"])
        .remove(&[".anchor", ".octicon", "clipboard-copy"])
        .title(&[OG_TITLE, "title"], &[r"\s+·\s+GitHub$", r"^GitHub\s+-\s+"])
}

fn stackoverflow() -> SiteConfig {
    SiteConfig::new(
        "stackoverflow",
        HandlerPriority::Platform,
        &["stackoverflow.com", "stackexchange.com", "superuser.com", "serverfault.com", "askubuntu.com"],
    )
    .filter(question_page)
    .content(&[".question .js-post-body", ".answer .js-post-body", ".question .s-prose", ".answer .s-prose"])
    .union()
    .remove(&[".js-post-menu", ".comments", ".votecell", ".post-signature"])
    .title(&["#question-header h1", OG_TITLE, "title"], &[r"\s+-\s+Stack\s+Overflow$", r"\s+-\s+[^-]+Stack Exchange$"])
}

fn wikipedia() -> SiteConfig {
    SiteConfig::new("wikipedia", HandlerPriority::Platform, &["wikipedia.org"])
        .filter(wiki_article)
        .content(&["#mw-content-text .mw-parser-output", "#mw-content-text", "#bodyContent"])
        .remove(&[".mw-editsection", ".navbox", ".reflist", ".reference", ".hatnote", ".infobox", "#toc", ".mw-jump-link"])
        .title(&["#firstHeading", OG_TITLE, "title"], &[r"\s+-\s+Wikipedia$"])
}

fn substack() -> SiteConfig {
    SiteConfig::new("substack", HandlerPriority::Newsletter, &["substack.com"])
        .content(&[".available-content", ".body.markup", "article"])
        .remove(&[".subscription-widget-wrap", ".subscribe-widget", ".button-wrapper", ".post-footer"])
        .title(&["h1.post-title", OG_TITLE, "title"], &[r"\s+-\s+by\s+.+$"])
}

fn medium() -> SiteConfig {
    SiteConfig::new("medium", HandlerPriority::Newsletter, &["medium.com"])
        .content(&["article section", "article"])
        .remove(&["[data-testid=\"headerSocialShareButton\"]", ".pw-multi-vote-icon", ".speechify-ignore"])
        .ready_when("article")
        .title(&["h1", OG_TITLE, "title"], &[r"\s+\|\s+by\s+.+$", r"\s+\|\s+Medium$", r"\s+-\s+Medium$"])
        .handler_config(HandlerConfig {
            dom: DomConfig { simulate_visual_viewport: true, ..Default::default() },
            ..Default::default()
        })
}

fn ghost() -> SiteConfig {
    SiteConfig::new("ghost", HandlerPriority::Newsletter, &["ghost.io"])
        .content(&[".gh-content", ".post-content", ".article-content", "article"])
        .remove(&[".gh-post-upgrade-cta", ".subscribe-form"])
        .title(&[".article-title", "h1", OG_TITLE, "title"], &[])
}

fn beehiiv() -> SiteConfig {
    SiteConfig::new("beehiiv", HandlerPriority::Newsletter, &["beehiiv.com"])
        .content(&["#content-blocks", ".rendered-post", "article"])
        .remove(&["form", ".subscribe"])
        .title(&["h1", OG_TITLE, "title"], &[])
}

fn buttondown() -> SiteConfig {
    SiteConfig::new("buttondown", HandlerPriority::Newsletter, &["buttondown.email", "buttondown.com"])
        .content(&[".email-body", ".email-detail__body", "article", "main"])
        .title(&["h1", OG_TITLE, "title"], &[])
}

fn hashnode() -> SiteConfig {
    SiteConfig::new("hashnode", HandlerPriority::Newsletter, &["hashnode.dev", "hashnode.com"])
        .content(&["#post-content-wrapper", ".prose", "article"])
        .title(&["h1", OG_TITLE, "title"], &[])
}

fn devto() -> SiteConfig {
    SiteConfig::new("devto", HandlerPriority::Newsletter, &["dev.to"])
        .content(&["#article-body", ".crayons-article__body", "article"])
        .remove(&[".crayons-article__subheader", ".article-actions"])
        .title(&["h1", OG_TITLE, "title"], &[r"\s+-\s+DEV\s+Community.*$"])
}

fn mirror() -> SiteConfig {
    SiteConfig::new("mirror", HandlerPriority::Newsletter, &["mirror.xyz"])
        .content(&["article", "main"])
        .title(&["h1", OG_TITLE, "title"], &[r"\s+—\s+Mirror$"])
}

/// Platform-specific handlers.
pub fn platform_handlers() -> Vec<SiteHandler> {
    [github(), stackoverflow(), wikipedia()].into_iter().map(SiteHandler::new).collect()
}

/// Newsletter and blog-platform handlers.
pub fn newsletter_handlers() -> Vec<SiteHandler> {
    [substack(), medium(), ghost(), beehiiv(), buttondown(), hashnode(), devto(), mirror()]
        .into_iter()
        .map(SiteHandler::new)
        .collect()
}
