//! Content cleaning pipeline.
//!
//! Each stage is a plain function over a tree element. [`build_pipeline`]
//! picks the enabled stages in their fixed order and [`run`] folds them over
//! the element a handler located.

use std::sync::LazyLock;

use kuchikiki::NodeRef;
use kuchikiki::iter::NodeIterator;
use regex::Regex;
use url::Url;

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("invalid regex"));

/// Elements that are never article content.
const UNWANTED_SELECTORS: &[&str] = &[
    "script",
    "style",
    "noscript",
    "template",
    "nav",
    "header",
    "footer",
    "aside",
    "form",
    "button",
    "[hidden]",
    "[aria-hidden=\"true\"]",
    "[style*=\"display:none\"]",
    "[style*=\"display: none\"]",
    "[role=\"navigation\"]",
    "[role=\"banner\"]",
    "[role=\"complementary\"]",
    ".ad",
    ".ads",
    ".advert",
    ".advertisement",
    "[id^=\"google_ads\"]",
    "[class*=\"sponsor\"]",
    ".share",
    ".social",
    ".social-share",
    ".sharing",
    ".comments",
    "#comments",
    ".newsletter-signup",
    ".related-posts",
    "iframe[src*=\"doubleclick\"]",
    "iframe[src*=\"googlesyndication\"]",
    "iframe[src*=\"facebook.com/plugins\"]",
    "iframe[width=\"0\"]",
    "iframe[height=\"0\"]",
];

/// Inline style properties that survive `cleanup_styles`.
const ALLOWED_STYLE_PROPERTIES: &[&str] = &[
    "font-size",
    "color",
    "background-color",
    "text-align",
    "line-height",
    "margin",
    "padding",
    "border",
];

/// Attributes only used by lazy-loading scripts.
const LAZY_SOURCE_ATTRIBUTES: &[&str] = &["data-src", "data-lazy-src", "data-original"];
const LAZY_ONLY_ATTRIBUTES: &[&str] = &[
    "data-src",
    "data-lazy-src",
    "data-original",
    "data-srcset",
    "data-lazy",
    "data-sizes",
    "loading",
];

/// Block elements removed by `cleanup_text` when they carry nothing.
const BLOCK_ELEMENTS: &str = "p, div, section, article, figure, blockquote, h1, h2, h3, h4, h5, h6, ul, ol, li, span";

/// Elements that make a block non-empty even without text.
const EMBEDDED_MEDIA: &str = "img, picture, video, audio, iframe, svg, object, embed";

/// Which cleaning stages a handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentCleaningConfig {
    pub remove_unwanted: bool,
    pub cleanup_styles: bool,
    pub cleanup_links: bool,
    pub cleanup_images: bool,
    pub cleanup_text: bool,
    /// Apply the handler's title strip patterns. Not a tree stage.
    pub refine_title: bool,
}

impl Default for ContentCleaningConfig {
    fn default() -> Self {
        Self {
            remove_unwanted: true,
            cleanup_styles: true,
            cleanup_links: true,
            cleanup_images: true,
            cleanup_text: true,
            refine_title: true,
        }
    }
}

impl ContentCleaningConfig {
    /// Every toggle off.
    pub fn none() -> Self {
        Self {
            remove_unwanted: false,
            cleanup_styles: false,
            cleanup_links: false,
            cleanup_images: false,
            cleanup_text: false,
            refine_title: false,
        }
    }
}

/// Inputs shared by the stages of one run.
#[derive(Debug, Clone)]
pub struct CleanContext {
    /// Base for resolving relative links and image sources.
    pub base_url: Url,
    /// Images with a declared width or height below this are dropped.
    pub min_image_size: u32,
    /// Declared widths above this are scaled down.
    pub max_image_width: u32,
}

impl CleanContext {
    pub fn new(base_url: Url) -> Self {
        Self { base_url, min_image_size: 32, max_image_width: 800 }
    }
}

/// A cleaning stage.
pub type Stage = fn(NodeRef, &CleanContext) -> NodeRef;

/// Enabled stages in pipeline order.
pub fn build_pipeline(config: &ContentCleaningConfig) -> Vec<(&'static str, Stage)> {
    let stages: [(bool, &'static str, Stage); 5] = [
        (config.remove_unwanted, "remove-unwanted", remove_unwanted),
        (config.cleanup_styles, "cleanup-styles", cleanup_styles),
        (config.cleanup_links, "cleanup-links", cleanup_links),
        (config.cleanup_images, "cleanup-images", cleanup_images),
        (config.cleanup_text, "cleanup-text", cleanup_text),
    ];
    stages
        .into_iter()
        .filter(|(enabled, _, _)| *enabled)
        .map(|(_, name, stage)| (name, stage))
        .collect()
}

/// Fold `pipeline` over `root`.
pub fn run(pipeline: &[(&'static str, Stage)], root: NodeRef, ctx: &CleanContext) -> NodeRef {
    pipeline.iter().fold(root, |node, (name, stage)| {
        tracing::trace!(stage = name, "cleaning");
        stage(node, ctx)
    })
}

/// Build the pipeline for `config` and run it.
pub fn clean(root: NodeRef, config: &ContentCleaningConfig, ctx: &CleanContext) -> NodeRef {
    run(&build_pipeline(config), root, ctx)
}

/// Delete elements on the deny-list. The root itself is never removed.
pub fn remove_unwanted(root: NodeRef, _ctx: &CleanContext) -> NodeRef {
    remove_matching(&root, UNWANTED_SELECTORS);
    root
}

fn remove_matching(root: &NodeRef, selectors: &[&str]) -> usize {
    let mut removed = 0;
    for selector in selectors {
        let matches = match root.select(selector) {
            Ok(matches) => matches,
            Err(()) => {
                tracing::warn!(selector, "skipping invalid cleanup selector");
                continue;
            }
        };
        let nodes: Vec<NodeRef> = matches
            .map(|m| m.as_node().clone())
            .filter(|n| n != root)
            .collect();
        for node in nodes {
            node.detach();
            removed += 1;
        }
    }
    removed
}

/// Keep only allow-listed inline style properties.
pub fn cleanup_styles(root: NodeRef, _ctx: &CleanContext) -> NodeRef {
    for element in root.inclusive_descendants().elements() {
        let mut attrs = element.attributes.borrow_mut();
        let Some(style) = attrs.get("style").map(filter_style) else {
            continue;
        };
        if style.is_empty() {
            attrs.remove("style");
        } else {
            attrs.insert("style", style);
        }
    }
    root
}

fn filter_style(style: &str) -> String {
    style
        .split(';')
        .filter_map(|declaration| {
            let (property, value) = declaration.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            let value = value.trim();
            (ALLOWED_STYLE_PROPERTIES.contains(&property.as_str()) && !value.is_empty())
                .then(|| format!("{property}: {value}"))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Absolutize link targets and open them in a new tab.
///
/// Links that do not resolve lose their `href`. Running this twice yields
/// the same tree.
pub fn cleanup_links(root: NodeRef, ctx: &CleanContext) -> NodeRef {
    let Ok(links) = root.select("a[href]") else {
        return root;
    };
    for link in links {
        let mut attrs = link.attributes.borrow_mut();
        let href = attrs.get("href").unwrap_or_default().trim().to_string();
        match ctx.base_url.join(&href) {
            Ok(target) if matches!(target.scheme(), "http" | "https") => {
                attrs.insert("href", target.to_string());
                attrs.insert("target", "_blank".to_string());
                attrs.insert("rel", "noopener noreferrer".to_string());
            }
            Ok(target) if target.scheme() == "javascript" => {
                attrs.remove("href");
            }
            Ok(target) => {
                attrs.insert("href", target.to_string());
            }
            Err(e) => {
                tracing::debug!(href = %href, error = %e, "dropping unparsable link");
                attrs.remove("href");
            }
        }
    }
    root
}

/// Resolve image sources, drop tracking-sized images and cap widths.
pub fn cleanup_images(root: NodeRef, ctx: &CleanContext) -> NodeRef {
    let Ok(images) = root.select("img") else {
        return root;
    };
    let images: Vec<_> = images.collect();

    for image in images {
        let keep = {
            let mut attrs = image.attributes.borrow_mut();

            let current = attrs.get("src").map(str::trim).unwrap_or_default().to_string();
            if current.is_empty() || current.starts_with("data:") {
                let lazy = LAZY_SOURCE_ATTRIBUTES
                    .iter()
                    .find_map(|name| attrs.get(*name).map(str::trim).filter(|v| !v.is_empty()).map(String::from));
                if let Some(lazy) = lazy {
                    attrs.insert("src", lazy);
                }
            }
            if !attrs.contains("srcset")
                && let Some(srcset) = attrs.get("data-srcset").map(String::from)
            {
                attrs.insert("srcset", srcset);
            }
            for name in LAZY_ONLY_ATTRIBUTES {
                attrs.remove(*name);
            }

            let resolved = attrs
                .get("src")
                .map(str::trim)
                .filter(|src| !src.is_empty())
                .and_then(|src| ctx.base_url.join(src).ok());

            match resolved {
                None => false,
                Some(src) => {
                    attrs.insert("src", src.to_string());
                    if let Some(srcset) = attrs.get("srcset").map(|s| resolve_srcset(s, &ctx.base_url)) {
                        attrs.insert("srcset", srcset);
                    }

                    let width = attrs.get("width").and_then(parse_dimension);
                    let height = attrs.get("height").and_then(parse_dimension);
                    let too_small = width.is_some_and(|w| w < ctx.min_image_size)
                        || height.is_some_and(|h| h < ctx.min_image_size);

                    if !too_small
                        && let Some(w) = width
                        && w > ctx.max_image_width
                    {
                        attrs.insert("width", ctx.max_image_width.to_string());
                        if let Some(h) = height {
                            let scaled = (u64::from(h) * u64::from(ctx.max_image_width) / u64::from(w)).max(1);
                            attrs.insert("height", scaled.to_string());
                        }
                    }
                    !too_small
                }
            }
        };

        if !keep {
            image.as_node().detach();
        }
    }
    root
}

fn parse_dimension(value: &str) -> Option<u32> {
    value.trim().trim_end_matches("px").trim().parse().ok()
}

fn resolve_srcset(srcset: &str, base: &Url) -> String {
    srcset
        .split(',')
        .filter_map(|candidate| {
            let mut parts = candidate.split_whitespace();
            let url = base.join(parts.next()?).ok()?;
            let descriptor: Vec<&str> = parts.collect();
            Some(if descriptor.is_empty() {
                url.to_string()
            } else {
                format!("{} {}", url, descriptor.join(" "))
            })
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Drop comments and empty blocks, collapse whitespace runs in text.
pub fn cleanup_text(root: NodeRef, _ctx: &CleanContext) -> NodeRef {
    let comments: Vec<NodeRef> = root
        .descendants()
        .filter(|node| node.as_comment().is_some())
        .collect();
    for comment in comments {
        comment.detach();
    }

    for node in root.descendants() {
        let Some(text) = node.as_text() else {
            continue;
        };
        if in_preformatted(&node) {
            continue;
        }
        let collapsed = WHITESPACE_RUN.replace_all(&text.borrow(), " ").into_owned();
        *text.borrow_mut() = collapsed;
    }

    if let Ok(blocks) = root.select(BLOCK_ELEMENTS) {
        let empty: Vec<NodeRef> = blocks
            .map(|b| b.as_node().clone())
            .filter(|b| b != &root && is_empty_block(b))
            .collect();
        for block in empty {
            block.detach();
        }
    }
    root
}

fn in_preformatted(node: &NodeRef) -> bool {
    node.ancestors().any(|a| {
        a.as_element()
            .is_some_and(|el| matches!(el.name.local.as_ref(), "pre" | "code" | "textarea"))
    })
}

fn is_empty_block(node: &NodeRef) -> bool {
    node.text_contents().trim().is_empty() && node.select_first(EMBEDDED_MEDIA).is_err()
}
