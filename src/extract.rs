//! Input extraction: URL, file, or raw text into one [`ExtractionResult`].
//!
//! The [`Extractor`] classifies the input, delegates fetching to a
//! [`Scraper`] (URLs) or a [`FileReader`] (local paths), and normalizes the
//! returned text. Failures never propagate as errors: they are recorded in
//! [`ExtractionResult::error`] with empty content, and the caller decides
//! how to surface them.
//!
//! Default collaborators:
//! - [`HttpScraper`]: reqwest fetch, Reddit `.json` posts, PDF URLs via
//!   `pdf-extract`, HTML pages via `scraper` with paywall detection.
//! - [`LocalFileReader`]: plain text files and PDFs, selected by extension.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::classify::classify;
use crate::config::ExtractionConfig;
use crate::models::{ExtractionResult, InputType};

pub const MIME_PDF: &str = "application/pdf";

/// Longest synthesized title for raw text input.
const TITLE_MAX_CHARS: usize = 80;

const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "ref",
    "source",
    "mc_cid",
    "mc_eid",
    "igshid",
    "si",
    "feature",
];

const KNOWN_PAYWALL_DOMAINS: &[&str] = &[
    "nytimes.com",
    "wsj.com",
    "ft.com",
    "bloomberg.com",
    "economist.com",
    "thetimes.co.uk",
    "theatlantic.com",
    "newyorker.com",
    "wired.com",
    "hbr.org",
    "foreignpolicy.com",
    "statista.com",
    "businessinsider.com",
];

const PAYWALL_SIGNALS: &[&str] = &[
    "subscribe to continue reading",
    "subscribe to read",
    "sign in to read",
    "create a free account to continue",
    "you've reached your free article limit",
    "this article is for subscribers only",
    "subscribers only",
    "unlock this article",
    "join to read more",
    "register to continue",
    "become a member to read",
];

/// Extraction error reported by a collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP status {0} while fetching page")]
    Status(u16),
    #[error("{0}")]
    Paywall(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("could not read file: {0}")]
    Io(String),
    #[error("could not extract meaningful content: {0}")]
    Unreadable(String),
    #[error("extraction timed out after {0}s")]
    Timeout(u64),
}

/// Text returned by a collaborator before normalization.
#[derive(Debug, Clone)]
pub struct FetchedText {
    pub title: String,
    pub body: String,
    /// Short identifier of the method used (e.g. `"html"`, `"pdf_url"`).
    pub method: String,
}

/// Web scraping collaborator: URL in, title and body text out.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<FetchedText, ExtractError>;
}

/// File reading collaborator: path in, title and body text out.
#[async_trait]
pub trait FileReader: Send + Sync {
    async fn read(&self, path: &Path) -> Result<FetchedText, ExtractError>;
}

/// Normalizes heterogeneous input into an [`ExtractionResult`].
pub struct Extractor {
    scraper: Arc<dyn Scraper>,
    files: Arc<dyn FileReader>,
    config: ExtractionConfig,
}

impl Extractor {
    pub fn new(
        scraper: Arc<dyn Scraper>,
        files: Arc<dyn FileReader>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            scraper,
            files,
            config,
        }
    }

    /// Extractor with the default HTTP scraper and local file reader.
    pub fn with_defaults(config: ExtractionConfig) -> anyhow::Result<Self> {
        let scraper = HttpScraper::new(&config)?;
        Ok(Self::new(
            Arc::new(scraper),
            Arc::new(LocalFileReader),
            config,
        ))
    }

    pub async fn extract(&self, raw_input: &str) -> ExtractionResult {
        let input = raw_input.trim();
        let input_type = classify(input);

        let result = match input_type {
            InputType::Url => self.extract_url(input).await,
            InputType::File => self.extract_file(input).await,
            InputType::Text => self.extract_text(input),
        };

        match &result.error {
            Some(err) => tracing::warn!(
                input_type = %result.input_type,
                method = %result.extraction_method,
                error = %err,
                "extraction failed"
            ),
            None => tracing::info!(
                input_type = %result.input_type,
                method = %result.extraction_method,
                words = result.word_count,
                "extracted content"
            ),
        }
        result
    }

    async fn extract_url(&self, input: &str) -> ExtractionResult {
        let url = clean_url(input);
        let budget = self.config.timeout_secs;
        let fetched =
            match tokio::time::timeout(Duration::from_secs(budget), self.scraper.scrape(&url))
                .await
            {
                Ok(r) => r,
                Err(_) => Err(ExtractError::Timeout(budget)),
            };

        match fetched {
            Ok(page) => {
                let content = normalize_text(&page.body);
                let title = if page.title.trim().is_empty() {
                    synthesize_title(&content)
                } else {
                    page.title.trim().to_string()
                };
                ExtractionResult::success(title, content, InputType::Url, url, page.method)
            }
            Err(e) => ExtractionResult::failure(InputType::Url, url, "scrape", e.to_string()),
        }
    }

    async fn extract_file(&self, input: &str) -> ExtractionResult {
        let path = Path::new(input);
        match self.files.read(path).await {
            Ok(file) => {
                let content = normalize_text(&file.body);
                let title = if file.title.trim().is_empty() {
                    synthesize_title(&content)
                } else {
                    file.title
                };
                ExtractionResult::success(title, content, InputType::File, input, file.method)
            }
            Err(e) => ExtractionResult::failure(InputType::File, input, "file", e.to_string()),
        }
    }

    fn extract_text(&self, input: &str) -> ExtractionResult {
        if input.is_empty() {
            return ExtractionResult::failure(
                InputType::Text,
                "raw_text",
                "raw_text",
                "Input text is empty.",
            );
        }
        if input.chars().count() > self.config.max_text_chars {
            return ExtractionResult::failure(
                InputType::Text,
                "raw_text",
                "raw_text",
                format!(
                    "Text exceeds maximum length of {} characters. Please shorten the input.",
                    self.config.max_text_chars
                ),
            );
        }
        let content = normalize_text(input);
        let title = synthesize_title(&content);
        ExtractionResult::success(title, content, InputType::Text, "raw_text", "raw_text")
    }
}

/// Collapse whitespace noise while keeping paragraph breaks.
pub fn normalize_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n").replace('\t', " ");

    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        let collapsed = line.split(' ').filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            // At most one empty line between paragraphs.
            if blank_run == 1 && !out.is_empty() {
                out.push('\n');
            }
            continue;
        }
        blank_run = 0;
        if !out.is_empty() && !out.ends_with("\n\n") {
            out.push('\n');
        }
        out.push_str(&collapsed);
    }
    out.trim().to_string()
}

/// First non-empty line, cut to [`TITLE_MAX_CHARS`] with an ellipsis.
pub fn synthesize_title(content: &str) -> String {
    let first = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if first.chars().count() <= TITLE_MAX_CHARS {
        return first.to_string();
    }
    let cut: String = first.chars().take(TITLE_MAX_CHARS - 3).collect();
    format!("{}...", cut.trim_end())
}

/// Add a scheme if missing and drop tracking query parameters.
pub fn clean_url(input: &str) -> String {
    let parsed = Url::parse(input)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"));
    let mut url = match parsed {
        Some(u) => u,
        None => {
            let with_scheme = format!("https://{}", input);
            match Url::parse(&with_scheme) {
                Ok(u) => u,
                Err(_) => return with_scheme,
            }
        }
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_ascii_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept.iter());
    }
    url.to_string()
}

/// `old.reddit.com` JSON endpoint for a Reddit post URL.
fn reddit_json_url(url: &Url) -> Result<String, ExtractError> {
    let mut old = url.clone();
    old.set_host(Some("old.reddit.com")).map_err(|e| {
        ExtractError::Unreadable(format!("cannot rewrite Reddit URL: {}", e))
    })?;
    old.set_query(None);
    Ok(format!("{}.json", old.as_str().trim_end_matches('/')))
}

fn domain_of(url: &Url) -> String {
    url.host_str()
        .unwrap_or("")
        .to_ascii_lowercase()
        .trim_start_matches("www.")
        .to_string()
}

fn is_paywalled_domain(domain: &str) -> bool {
    KNOWN_PAYWALL_DOMAINS
        .iter()
        .any(|d| domain == *d || domain.ends_with(&format!(".{}", d)))
}

// ============ HTTP scraper ============

/// Default [`Scraper`] backed by reqwest.
pub struct HttpScraper {
    client: reqwest::Client,
    min_words: usize,
}

impl HttpScraper {
    pub fn new(config: &ExtractionConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            min_words: config.min_words,
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, ExtractError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ExtractError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ExtractError::Status(resp.status().as_u16()));
        }
        Ok(resp)
    }

    async fn scrape_reddit(&self, url: &Url) -> Result<FetchedText, ExtractError> {
        let json_url = reddit_json_url(url)?;

        let json: serde_json::Value = self
            .get(&json_url)
            .await?
            .json()
            .await
            .map_err(|e| ExtractError::Unreadable(e.to_string()))?;

        let post = json
            .pointer("/0/data/children/0/data")
            .ok_or_else(|| ExtractError::Unreadable("unexpected Reddit response".to_string()))?;
        let title = post
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        let body = post
            .get("selftext")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        let body = if matches!(body, "[deleted]" | "[removed]") {
            ""
        } else {
            body
        };
        if body.is_empty() && title.is_empty() {
            return Err(ExtractError::Unreadable(
                "post appears to be empty, deleted, or a link post with no body".to_string(),
            ));
        }

        Ok(FetchedText {
            body: format!("{}\n\n{}", title, body),
            title,
            method: "reddit_json".to_string(),
        })
    }

    async fn scrape_pdf(&self, url: &Url, bytes: Vec<u8>) -> Result<FetchedText, ExtractError> {
        let text = extract_pdf_blocking(bytes).await?;
        if text.trim().is_empty() {
            return Err(ExtractError::Pdf(
                "no extractable text; it may be a scanned image PDF".to_string(),
            ));
        }
        let title = url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or("")
            .trim_end_matches(".pdf")
            .to_string();
        Ok(FetchedText {
            title,
            body: text,
            method: "pdf_url".to_string(),
        })
    }

    fn scrape_html(&self, html: &str) -> Result<FetchedText, ExtractError> {
        let lower = html.to_lowercase();
        if PAYWALL_SIGNALS.iter().any(|s| lower.contains(s)) {
            return Err(ExtractError::Paywall(
                "This content appears to be behind a paywall. Please paste the text directly as input instead."
                    .to_string(),
            ));
        }

        let (title, body) = parse_html(html);
        let words = body.split_whitespace().count();
        if words < self.min_words {
            return Err(ExtractError::Unreadable(format!(
                "page returned only {} words; it may be dynamic, require login, or contain no readable text",
                words
            )));
        }
        Ok(FetchedText {
            title,
            body,
            method: "html".to_string(),
        })
    }
}

#[async_trait]
impl Scraper for HttpScraper {
    async fn scrape(&self, raw_url: &str) -> Result<FetchedText, ExtractError> {
        let url = Url::parse(raw_url).map_err(|e| ExtractError::Network(e.to_string()))?;
        let domain = domain_of(&url);

        if is_paywalled_domain(&domain) {
            return Err(ExtractError::Paywall(format!(
                "'{}' is a known paywalled publication. Please paste the text as input instead.",
                domain
            )));
        }

        if matches!(
            domain.as_str(),
            "reddit.com" | "old.reddit.com" | "new.reddit.com"
        ) {
            return self.scrape_reddit(&url).await;
        }

        let resp = self.get(url.as_str()).await?;
        let is_pdf = url.path().to_ascii_lowercase().ends_with(".pdf")
            || resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|ct| ct.starts_with(MIME_PDF))
                .unwrap_or(false);

        if is_pdf {
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| ExtractError::Network(e.to_string()))?;
            return self.scrape_pdf(&url, bytes.to_vec()).await;
        }

        let html = resp
            .text()
            .await
            .map_err(|e| ExtractError::Network(e.to_string()))?;
        self.scrape_html(&html)
    }
}

/// Title plus paragraph text from an HTML page.
///
/// Prefers `<article>` paragraphs, then `<main>`, then any `<p>`.
pub fn parse_html(html: &str) -> (String, String) {
    let document = Html::parse_document(html);

    let title = select_text(&document, "title")
        .or_else(|| meta_content(&document, "meta[property=\"og:title\"]"))
        .unwrap_or_default();

    let mut body = String::new();
    for selector in ["article p", "main p", "p"] {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        let paragraphs: Vec<String> = document
            .select(&sel)
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty())
            .collect();
        if !paragraphs.is_empty() {
            body = paragraphs.join("\n\n");
            break;
        }
    }

    (title, body)
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let el = document.select(&sel).next()?;
    let text = el.text().collect::<String>().trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let el = document.select(&sel).next()?;
    el.value()
        .attr("content")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// ============ Local files ============

/// Default [`FileReader`]: plain text and PDF, selected by extension.
pub struct LocalFileReader;

#[async_trait]
impl FileReader for LocalFileReader {
    async fn read(&self, path: &Path) -> Result<FetchedText, ExtractError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();

        match ext.as_str() {
            "pdf" => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| ExtractError::Io(e.to_string()))?;
                let body = extract_pdf_blocking(bytes).await?;
                Ok(FetchedText {
                    title,
                    body,
                    method: "file_pdf".to_string(),
                })
            }
            "" | "txt" | "text" | "md" | "markdown" => {
                let body = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| ExtractError::Io(e.to_string()))?;
                Ok(FetchedText {
                    title,
                    body,
                    method: "file_text".to_string(),
                })
            }
            other => Err(ExtractError::UnsupportedFileType(format!(".{}", other))),
        }
    }
}

/// PDF text extraction off the async runtime.
async fn extract_pdf_blocking(bytes: Vec<u8>) -> Result<String, ExtractError> {
    tokio::task::spawn_blocking(move || extract_pdf(&bytes))
        .await
        .map_err(|e| ExtractError::Pdf(e.to_string()))?
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct FixedScraper(Result<FetchedText, String>);

    #[async_trait]
    impl Scraper for FixedScraper {
        async fn scrape(&self, _url: &str) -> Result<FetchedText, ExtractError> {
            self.0.clone().map_err(ExtractError::Network)
        }
    }

    #[derive(Default)]
    struct CapturingScraper(std::sync::Mutex<Vec<String>>);

    #[async_trait]
    impl Scraper for CapturingScraper {
        async fn scrape(&self, url: &str) -> Result<FetchedText, ExtractError> {
            self.0.lock().unwrap().push(url.to_string());
            Ok(FetchedText {
                title: "Article".to_string(),
                body: "Body text".to_string(),
                method: "html".to_string(),
            })
        }
    }

    fn extractor(scraper: FixedScraper) -> Extractor {
        Extractor::new(
            Arc::new(scraper),
            Arc::new(LocalFileReader),
            ExtractionConfig::default(),
        )
    }

    fn page(body: &str) -> FixedScraper {
        FixedScraper(Ok(FetchedText {
            title: String::new(),
            body: body.to_string(),
            method: "html".to_string(),
        }))
    }

    #[tokio::test]
    async fn url_word_count_comes_from_content() {
        let ex = extractor(page("Hello world"));
        let r = ex.extract("https://example.com/article").await;
        assert_eq!(r.input_type, InputType::Url);
        assert_eq!(r.word_count, 2);
        assert_eq!(r.content, "Hello world");
        assert_eq!(r.source, "https://example.com/article");
        assert!(r.error.is_none());
    }

    #[tokio::test]
    async fn scraper_failure_is_recorded_not_raised() {
        let ex = extractor(FixedScraper(Err("connection refused".to_string())));
        let r = ex.extract("https://example.com/down").await;
        assert!(r.content.is_empty());
        assert_eq!(r.word_count, 0);
        assert!(r.error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn raw_text_gets_first_line_title() {
        let ex = extractor(page(""));
        let r = ex
            .extract("Quarterly results\n\nRevenue grew   by 4%.\tMargins held.")
            .await;
        assert_eq!(r.input_type, InputType::Text);
        assert_eq!(r.title, "Quarterly results");
        assert_eq!(r.source, "raw_text");
        assert_eq!(r.content, "Quarterly results\n\nRevenue grew by 4%. Margins held.");
    }

    #[tokio::test]
    async fn empty_text_is_unprocessable() {
        let ex = extractor(page(""));
        let r = ex.extract("   ").await;
        assert_eq!(r.error.as_deref(), Some("Input text is empty."));
    }

    #[tokio::test]
    async fn oversized_text_is_rejected() {
        let ex = Extractor::new(
            Arc::new(page("")),
            Arc::new(LocalFileReader),
            ExtractionConfig {
                max_text_chars: 10,
                ..ExtractionConfig::default()
            },
        );
        let r = ex.extract("this text is longer than ten characters").await;
        assert!(r.error.unwrap().contains("maximum length"));
    }

    #[tokio::test]
    async fn text_file_is_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memo.txt");
        fs::write(&path, "Line one\r\nLine two").unwrap();
        let ex = extractor(page(""));
        let r = ex.extract(path.to_str().unwrap()).await;
        assert_eq!(r.input_type, InputType::File);
        assert_eq!(r.title, "memo");
        assert_eq!(r.extraction_method, "file_text");
        assert_eq!(r.word_count, 4);
    }

    #[tokio::test]
    async fn unsupported_file_extension_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sheet.xlsx");
        fs::write(&path, b"PK").unwrap();
        let ex = extractor(page(""));
        let r = ex.extract(path.to_str().unwrap()).await;
        assert!(r.error.unwrap().contains("unsupported file type"));
    }

    #[test]
    fn normalize_collapses_noise() {
        let raw = "  a  b \r\n\r\n\r\n\tc   d  \n\n\n\ne";
        assert_eq!(normalize_text(raw), "a b\n\nc d\n\ne");
    }

    #[test]
    fn clean_url_drops_tracking_params() {
        assert_eq!(
            clean_url("https://example.com/a?utm_source=x&id=7&fbclid=abc"),
            "https://example.com/a?id=7"
        );
        assert_eq!(clean_url("example.com/a"), "https://example.com/a");
        assert_eq!(
            clean_url("https://example.com/article"),
            "https://example.com/article"
        );
    }

    #[test]
    fn clean_url_accepts_uppercase_scheme() {
        assert_eq!(
            clean_url("HTTPS://example.com/article"),
            "https://example.com/article"
        );
        assert_eq!(
            clean_url("Http://Example.com/a?utm_medium=x"),
            "http://example.com/a"
        );
    }

    #[tokio::test]
    async fn uppercase_scheme_reaches_scraper_unchanged() {
        let scraper = Arc::new(CapturingScraper::default());
        let ex = Extractor::new(
            scraper.clone(),
            Arc::new(LocalFileReader),
            ExtractionConfig::default(),
        );
        let r = ex.extract("HTTPS://example.com/article").await;
        assert_eq!(r.input_type, InputType::Url);
        assert_eq!(r.source, "https://example.com/article");
        assert_eq!(
            scraper.0.lock().unwrap().as_slice(),
            ["https://example.com/article".to_string()]
        );
    }

    #[test]
    fn reddit_url_is_rewritten_to_json_endpoint() {
        let url =
            Url::parse("https://www.reddit.com/r/rust/comments/abc/title/?utm_source=share")
                .unwrap();
        assert_eq!(
            reddit_json_url(&url).unwrap(),
            "https://old.reddit.com/r/rust/comments/abc/title.json"
        );

        let opaque = Url::parse("mailto:someone@reddit.com").unwrap();
        assert!(matches!(
            reddit_json_url(&opaque),
            Err(ExtractError::Unreadable(_))
        ));
    }

    #[test]
    fn long_title_is_truncated() {
        let line = "word ".repeat(40);
        let title = synthesize_title(&line);
        assert!(title.ends_with("..."));
        assert!(title.chars().count() <= TITLE_MAX_CHARS);
    }

    #[test]
    fn html_prefers_article_paragraphs() {
        let html = r#"<html><head><title>Story</title></head><body>
            <nav><p>Menu</p></nav>
            <article><p>First   paragraph.</p><p>Second <b>bold</b> one.</p></article>
            </body></html>"#;
        let (title, body) = parse_html(html);
        assert_eq!(title, "Story");
        assert_eq!(body, "First paragraph.\n\nSecond bold one.");
    }

    #[test]
    fn paywall_domains_match_subdomains() {
        assert!(is_paywalled_domain("nytimes.com"));
        assert!(is_paywalled_domain("cooking.nytimes.com"));
        assert!(!is_paywalled_domain("notnytimes.com"));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_pdf(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }
}
