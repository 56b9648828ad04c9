//! Content quality gate.
//!
//! A deterministic score over extracted content deciding whether the cheap
//! strategies produced something worth keeping or the browser fallback has
//! to run.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use tidyread_core::{ContentQualityMetrics, QualityThresholds};

static PARAGRAPHS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p, pre, blockquote").expect("invalid selector"));
static LINKS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").expect("invalid selector"));

/// Score is one point per ten characters of plain text, capped here.
const MAX_READABILITY_SCORE: f64 = 100.0;

/// Evaluate extracted content.
///
/// `content` is what a strategy produced. Structural counts (paragraphs,
/// links) come from `html` when given, otherwise from `content` itself.
pub fn evaluate(content: &str, html: Option<&str>, opts: &QualityThresholds) -> ContentQualityMetrics {
    let character_count = content.chars().count();
    let text_length = plain_text_length(content);

    let structure = Html::parse_fragment(html.unwrap_or(content));
    let paragraph_count = structure.select(&PARAGRAPHS).count();
    let link_count = structure.select(&LINKS).count();

    let link_density = link_count as f64 / paragraph_count.max(1) as f64;
    let readability_score = (text_length as f64 / 10.0).min(MAX_READABILITY_SCORE);

    let is_probably_readable = character_count >= opts.min_characters
        && text_length >= opts.min_text_length
        && readability_score >= opts.min_readability_score
        && paragraph_count >= opts.min_paragraphs
        && link_density <= opts.max_link_density;

    ContentQualityMetrics { character_count, paragraph_count, link_density, readability_score, is_probably_readable }
}

/// Whether the orchestrator must escalate to the headless browser.
pub fn should_use_browser(metrics: &ContentQualityMetrics) -> bool {
    !metrics.is_probably_readable
}

/// Length of the text with markup removed and whitespace collapsed.
pub fn plain_text_length(content: &str) -> usize {
    let fragment = Html::parse_fragment(content);
    let mut length = 0usize;
    let mut pending_space = false;
    for chunk in fragment.root_element().text() {
        for c in chunk.chars() {
            if c.is_whitespace() {
                pending_space = length > 0;
            } else {
                if pending_space {
                    length += 1;
                    pending_space = false;
                }
                length += 1;
            }
        }
    }
    length
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(words: usize) -> String {
        format!("<p>{}</p>", vec!["readable"; words].join(" "))
    }

    fn article(paragraphs: usize, words: usize) -> String {
        (0..paragraphs).map(|_| paragraph(words)).collect()
    }

    #[test]
    fn test_plain_text_length_strips_markup() {
        assert_eq!(plain_text_length("<p>Hello   <b>world</b></p>"), "Hello world".len());
        assert_eq!(plain_text_length("  <div>\n  </div> "), 0);
    }

    #[test]
    fn test_readable_article_passes() {
        let content = article(5, 30);
        let metrics = evaluate(&content, None, &QualityThresholds::default());

        assert!(metrics.character_count >= 500);
        assert_eq!(metrics.paragraph_count, 5);
        assert_eq!(metrics.link_density, 0.0);
        assert!(metrics.is_probably_readable);
        assert!(!should_use_browser(&metrics));
    }

    #[test]
    fn test_short_content_fails() {
        let metrics = evaluate("<p>Loading...</p>", None, &QualityThresholds::default());
        assert!(!metrics.is_probably_readable);
        assert!(should_use_browser(&metrics));
    }

    #[test]
    fn test_too_few_paragraphs_fails() {
        let metrics = evaluate(&article(2, 80), None, &QualityThresholds::default());
        assert_eq!(metrics.paragraph_count, 2);
        assert!(!metrics.is_probably_readable);
    }

    #[test]
    fn test_link_heavy_content_fails() {
        let mut content = article(5, 30);
        content.push_str("<a href=\"/1\">1</a><a href=\"/2\">2</a>");
        let metrics = evaluate(&content, None, &QualityThresholds::default());
        assert!((metrics.link_density - 0.4).abs() < f64::EPSILON);
        assert!(!metrics.is_probably_readable);
    }

    #[test]
    fn test_structure_from_separate_html() {
        let text = "word ".repeat(200);
        let html = article(4, 10);
        let metrics = evaluate(&text, Some(&html), &QualityThresholds::default());
        assert_eq!(metrics.paragraph_count, 4);
        assert!(metrics.is_probably_readable);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let relaxed = QualityThresholds { min_characters: 10, min_paragraphs: 1, ..Default::default() };
        let metrics = evaluate(&article(1, 40), None, &relaxed);
        assert!(metrics.is_probably_readable);
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let content = article(4, 25);
        let a = evaluate(&content, None, &QualityThresholds::default());
        let b = evaluate(&content, None, &QualityThresholds::default());
        assert_eq!(a, b);
    }

    #[test]
    fn test_more_characters_never_flips_to_unreadable() {
        let opts = QualityThresholds::default();
        let mut content = article(4, 30);
        assert!(evaluate(&content, None, &opts).is_probably_readable);

        for _ in 0..20 {
            content.push_str("<!-- padding that only adds characters -->");
            assert!(evaluate(&content, None, &opts).is_probably_readable);
        }
    }
}
