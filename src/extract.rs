//! Article extraction: fetch a page and pull out its headline and body text.
//!
//! The HTML is parsed with `scraper`. Extraction is best-effort and never
//! decides whether the result is usable; the pipeline rejects articles
//! without a title or body.
//!
//! # Title lookup order
//!
//! 1. `<meta property="og:title">`
//! 2. `<title>`
//! 3. The first `<h1>`
//!
//! # Body lookup order
//!
//! Paragraphs inside `<article>`, then inside `<main>`, then anywhere in the
//! document. Paragraphs are whitespace-normalized and joined by blank lines.

use crate::error::ExtractionError;
use crate::models::RawArticle;
use itertools::Itertools;
use once_cell::sync::Lazy;
use reqwest::header::CONTENT_TYPE;
use scraper::{ElementRef, Html, Selector};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).expect("valid selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid selector"));
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("valid selector"));
static ARTICLE_P: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article p").expect("valid selector"));
static MAIN_P: Lazy<Selector> = Lazy::new(|| Selector::parse("main p").expect("valid selector"));
static ANY_P: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("valid selector"));

/// Something that can turn a URL into a [`RawArticle`].
///
/// `Ok(None)` means the URL was reachable but did not lead to an article.
pub trait ArticleSource {
    fn extract(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Option<RawArticle>, ExtractionError>> + Send;
}

/// Fetches pages over HTTP and extracts them with [`extract_from_html`].
#[derive(Debug, Clone)]
pub struct HttpArticleExtractor {
    client: reqwest::Client,
}

impl HttpArticleExtractor {
    pub fn new() -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("save_me_a_click/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }
}

impl ArticleSource for HttpArticleExtractor {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn extract(&self, url: &str) -> Result<Option<RawArticle>, ExtractionError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Article fetch returned non-success status");
            return Ok(None);
        }

        let is_html = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("html"))
            .unwrap_or(true);
        if !is_html {
            warn!("Article URL does not serve HTML");
            return Ok(None);
        }

        let body = resp.text().await?;
        let article = extract_from_html(&body);
        info!(
            bytes = body.len(),
            has_title = article.title.is_some(),
            content_len = article.content.as_ref().map_or(0, String::len),
            "Parsed article page"
        );
        Ok(Some(article))
    }
}

/// Extract title and body text from an HTML document.
pub fn extract_from_html(html: &str) -> RawArticle {
    let document = Html::parse_document(html);

    let title = document
        .select(&OG_TITLE)
        .filter_map(|meta| meta.value().attr("content"))
        .map(normalize)
        .chain(document.select(&TITLE).map(element_text))
        .chain(document.select(&H1).map(element_text))
        .find(|t| !t.is_empty());

    let content = [&*ARTICLE_P, &*MAIN_P, &*ANY_P]
        .into_iter()
        .map(|selector| {
            document
                .select(selector)
                .map(element_text)
                .filter(|p| !p.is_empty())
                .join("\n\n")
        })
        .find(|body| !body.is_empty());

    debug!(?title, "Extracted article title");
    RawArticle { title, content }
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize(&element.text().collect::<String>())
}

/// Collapse runs of whitespace into single spaces.
fn normalize(text: &str) -> String {
    text.split_whitespace().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_og_title_and_article_paragraphs() {
        let html = r#"<html><head>
            <title>Site | Headline</title>
            <meta property="og:title" content="  The   Headline ">
            </head><body>
            <nav><p>Menu</p></nav>
            <article><h1>Headline</h1>
              <p>First
                 paragraph.</p>
              <p></p>
              <p>Second <b>bold</b> paragraph.</p>
            </article>
            <footer><p>Copyright</p></footer>
            </body></html>"#;
        let article = extract_from_html(html);
        assert_eq!(article.title.as_deref(), Some("The Headline"));
        assert_eq!(
            article.content.as_deref(),
            Some("First paragraph.\n\nSecond bold paragraph.")
        );
    }

    #[test]
    fn test_falls_back_to_title_tag_and_main() {
        let html = r#"<html><head><title>Plain Title</title></head>
            <body><main><p>Main text.</p></main><p>Aside.</p></body></html>"#;
        let article = extract_from_html(html);
        assert_eq!(article.title.as_deref(), Some("Plain Title"));
        assert_eq!(article.content.as_deref(), Some("Main text."));
    }

    #[test]
    fn test_falls_back_to_h1_and_any_paragraph() {
        let html = "<html><body><h1>Only Heading</h1><div><p>Loose text.</p></div></body></html>";
        let article = extract_from_html(html);
        assert_eq!(article.title.as_deref(), Some("Only Heading"));
        assert_eq!(article.content.as_deref(), Some("Loose text."));
    }

    #[test]
    fn test_missing_parts_are_none() {
        let article = extract_from_html("<html><body><div>no paragraphs</div></body></html>");
        assert_eq!(article, RawArticle::default());
    }
}
