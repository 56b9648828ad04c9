//! Document construction and content location over a mutable HTML tree.

use kuchikiki::traits::*;
use kuchikiki::{NodeRef, ParseOpts};

use tidyread_core::Error;

/// How a handler turns fetched HTML into a tree.
#[derive(Debug, Clone, Default)]
pub struct DomConfig {
    /// Preferred user agent for the page request when the HTTP config has none.
    pub user_agent: Option<String>,
    /// Parse as a script-running browser would: `<noscript>` stays opaque
    /// and `<script>` elements are kept for the cleaning stages. When false
    /// the tree is built the way a browser without scripting sees it.
    pub allow_scripts: bool,
    /// Drop elements a visual reader never sees (`hidden`,
    /// `aria-hidden="true"`, inline `display:none`/`visibility:hidden`)
    /// before content is located.
    pub simulate_visual_viewport: bool,
}

/// Build a document from `html`.
pub fn build_document(html: &str, config: &DomConfig) -> Result<NodeRef, Error> {
    if html.trim().is_empty() {
        return Err(Error::DomConstruction("empty document".into()));
    }

    let mut opts = ParseOpts::default();
    opts.tree_builder.scripting_enabled = config.allow_scripts;
    let document = kuchikiki::parse_html_with_options(opts).one(html);

    if !config.allow_scripts {
        detach_all(&document, "script");
    }
    if config.simulate_visual_viewport {
        remove_invisible(&document);
    }

    if document.select_first("body").is_err() {
        return Err(Error::DomConstruction("document has no body".into()));
    }

    Ok(document)
}

/// Detach every element matching `selector`. Returns how many were removed.
///
/// An invalid selector removes nothing.
pub fn detach_all(root: &NodeRef, selector: &str) -> usize {
    let Ok(matches) = root.select(selector) else {
        return 0;
    };
    let nodes: Vec<NodeRef> = matches
        .map(|m| m.as_node().clone())
        .filter(|n| n != root)
        .collect();
    for node in &nodes {
        node.detach();
    }
    nodes.len()
}

fn remove_invisible(document: &NodeRef) {
    let hidden: Vec<NodeRef> = document
        .descendants()
        .elements()
        .filter(|el| {
            let attrs = el.attributes.borrow();
            if attrs.contains("hidden") || attrs.get("aria-hidden") == Some("true") {
                return true;
            }
            attrs.get("style").is_some_and(|style| {
                let style: String = style.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_ascii_lowercase();
                style.contains("display:none") || style.contains("visibility:hidden")
            })
        })
        .map(|el| el.as_node().clone())
        .collect();
    for node in hidden {
        node.detach();
    }
}

/// Character count of the element's text with whitespace runs collapsed.
pub fn text_length(node: &NodeRef) -> usize {
    node.text_contents().split_whitespace().map(|w| w.chars().count() + 1).sum::<usize>().saturating_sub(1)
}

/// The document body.
pub fn body(document: &NodeRef) -> Option<NodeRef> {
    document.select_first("body").ok().map(|b| b.as_node().clone())
}

/// The element with the longest text among all matches of `selectors`,
/// provided it reaches `min_chars`; otherwise the body.
pub fn locate_longest(document: &NodeRef, selectors: &[String], min_chars: usize) -> Option<NodeRef> {
    let best = selectors
        .iter()
        .filter_map(|selector| document.select(selector).ok())
        .flatten()
        .map(|el| {
            let node = el.as_node().clone();
            (text_length(&node), node)
        })
        .filter(|(len, _)| *len >= min_chars)
        .fold(None::<(usize, NodeRef)>, |best, candidate| match best {
            Some(b) if b.0 >= candidate.0 => Some(b),
            _ => Some(candidate),
        });

    best.map(|(_, node)| node).or_else(|| body(document))
}

/// Every element matching any selector, in document order, gathered under a
/// new `<div>`. Elements nested inside an already-gathered element are not
/// repeated. `None` when nothing matches.
pub fn locate_union(document: &NodeRef, selectors: &[String]) -> Option<NodeRef> {
    let valid: Vec<&str> = selectors
        .iter()
        .map(String::as_str)
        .filter(|s| document.select(s).is_ok())
        .collect();
    if valid.is_empty() {
        return None;
    }

    let matches = document.select(&valid.join(", ")).ok()?;
    let mut picked: Vec<NodeRef> = Vec::new();
    for el in matches {
        let node = el.as_node().clone();
        if node.ancestors().any(|a| picked.contains(&a)) {
            continue;
        }
        picked.push(node);
    }
    if picked.is_empty() {
        return None;
    }

    let wrapper_doc = kuchikiki::parse_html().one("<div data-merged=\"true\"></div>");
    let wrapper = wrapper_doc.select_first("div").ok()?.as_node().clone();
    wrapper.detach();
    for node in picked {
        node.detach();
        wrapper.append(node);
    }
    Some(wrapper)
}

/// Serialized children of `node`.
pub fn inner_html(node: &NodeRef) -> String {
    node.children().map(|child| child.to_string()).collect()
}

/// Serialize extracted content. A `<body>` is re-wrapped in a `<div>`.
pub fn content_html(node: &NodeRef) -> String {
    let is_body = node
        .as_element()
        .is_some_and(|el| el.name.local.as_ref() == "body");
    if is_body { format!("<div>{}</div>", inner_html(node)) } else { node.to_string() }
}
