//! Handlers that classify a URL by file type without downloading it.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tidyread_core::{CONTENT_TYPE_HTML, CONTENT_TYPE_PDF, Error, PreHandleResult};
use url::Url;

use super::{HandleContext, Handler, HandlerPriority, host_matches, lower_path};

static YOUTUBE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("invalid regex"));

/// Links ending in `.pdf`.
#[derive(Debug, Default)]
pub struct PdfHandler;

#[async_trait]
impl Handler for PdfHandler {
    fn name(&self) -> &str {
        "pdf"
    }

    fn priority(&self) -> HandlerPriority {
        HandlerPriority::FileType
    }

    fn can_handle(&self, url: &Url) -> bool {
        lower_path(url).ends_with(".pdf")
    }

    async fn handle(&self, url: &Url, _ctx: &HandleContext<'_>) -> Result<Option<PreHandleResult>, Error> {
        Ok(Some(PreHandleResult::new(url.as_str()).with_content_type(CONTENT_TYPE_PDF)))
    }
}

/// RSS and Atom feeds.
#[derive(Debug, Default)]
pub struct RssHandler;

impl RssHandler {
    fn feed_type(url: &Url) -> Option<&'static str> {
        let path = lower_path(url);
        let path = path.trim_end_matches('/');
        if path.ends_with(".atom") || path.ends_with("/atom") {
            Some("application/atom+xml")
        } else if path.ends_with(".rss") || path.ends_with("/rss") || path.ends_with("/feed") || path.ends_with("/rss.xml") || path.ends_with("/feed.xml") {
            Some("application/rss+xml")
        } else {
            None
        }
    }
}

#[async_trait]
impl Handler for RssHandler {
    fn name(&self) -> &str {
        "rss"
    }

    fn priority(&self) -> HandlerPriority {
        HandlerPriority::FileType
    }

    fn can_handle(&self, url: &Url) -> bool {
        Self::feed_type(url).is_some()
    }

    async fn handle(&self, url: &Url, _ctx: &HandleContext<'_>) -> Result<Option<PreHandleResult>, Error> {
        Ok(Self::feed_type(url).map(|content_type| PreHandleResult::new(url.as_str()).with_content_type(content_type)))
    }
}

/// A video link on a known platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoRef {
    YouTube(String),
    Vimeo(String),
}

impl VideoRef {
    pub fn parse(url: &Url) -> Option<Self> {
        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

        if host_matches(url, "youtu.be") {
            return segments.next().filter(|id| YOUTUBE_ID.is_match(id)).map(|id| Self::YouTube(id.to_string()));
        }
        if host_matches(url, "youtube.com") || host_matches(url, "youtube-nocookie.com") {
            let id = match segments.next()? {
                "watch" => url.query_pairs().find(|(k, _)| k == "v").map(|(_, v)| v.into_owned()),
                "shorts" | "embed" | "live" | "v" => segments.next().map(str::to_string),
                _ => None,
            };
            return id.filter(|id| YOUTUBE_ID.is_match(id)).map(Self::YouTube);
        }
        if host_matches(url, "vimeo.com") {
            return segments
                .find(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
                .map(|id| Self::Vimeo(id.to_string()));
        }
        None
    }

    pub fn platform(&self) -> &'static str {
        match self {
            Self::YouTube(_) => "YouTube",
            Self::Vimeo(_) => "Vimeo",
        }
    }

    pub fn embed_url(&self) -> String {
        match self {
            Self::YouTube(id) => format!("https://www.youtube-nocookie.com/embed/{id}"),
            Self::Vimeo(id) => format!("https://player.vimeo.com/video/{id}"),
        }
    }

    pub fn thumbnail_url(&self) -> Option<String> {
        match self {
            Self::YouTube(id) => Some(format!("https://i.ytimg.com/vi/{id}/hqdefault.jpg")),
            Self::Vimeo(_) => None,
        }
    }

    /// HTML snippet referencing the video.
    pub fn snippet(&self, url: &Url) -> String {
        let (kind, id) = match self {
            Self::YouTube(id) => ("youtube", id),
            Self::Vimeo(id) => ("vimeo", id),
        };
        let mut html = format!(
            "<div class=\"video-embed\" data-platform=\"{kind}\" data-video-id=\"{id}\">\
             <iframe src=\"{}\" width=\"560\" height=\"315\" allowfullscreen></iframe>",
            self.embed_url()
        );
        if let Some(thumbnail) = self.thumbnail_url() {
            html.push_str(&format!("<img src=\"{thumbnail}\" alt=\"Video thumbnail\">"));
        }
        html.push_str(&format!("<p><a href=\"{}\">Watch on {}</a></p></div>", url, self.platform()));
        html
    }
}

/// YouTube and Vimeo links: an embed snippet instead of the player page.
#[derive(Debug, Default)]
pub struct VideoHandler;

#[async_trait]
impl Handler for VideoHandler {
    fn name(&self) -> &str {
        "video"
    }

    fn priority(&self) -> HandlerPriority {
        HandlerPriority::FileType
    }

    fn can_handle(&self, url: &Url) -> bool {
        VideoRef::parse(url).is_some()
    }

    async fn handle(&self, url: &Url, _ctx: &HandleContext<'_>) -> Result<Option<PreHandleResult>, Error> {
        Ok(VideoRef::parse(url).map(|video| {
            PreHandleResult::new(url.as_str())
                .with_content(video.snippet(url))
                .with_content_type(CONTENT_TYPE_HTML)
        }))
    }
}
