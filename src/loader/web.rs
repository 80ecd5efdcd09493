//! 기사 로더 - URL의 HTML에서 본문 텍스트 추출
//!
//! 본문 후보는 `article > main > [role=main] > .content > #content > body` 순서로 고릅니다.

use anyhow::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};

use super::{fetch_text, http_client, skip_http_status, UrlLoader};
use crate::knowledge::{meta, Document};

/// 본문으로 인정하는 최소 길이
const MIN_CONTENT_LEN: usize = 100;

/// 스크랩된 콘텐츠
#[derive(Debug, Clone)]
pub struct ScrapedContent {
    /// 페이지 제목
    pub title: Option<String>,
    /// 본문 텍스트 (HTML 태그 제거됨)
    pub content: String,
    /// 원본 URL
    pub url: String,
}

impl ScrapedContent {
    /// HTML 문서에서 제목과 본문 추출
    pub fn from_html(url: &str, html: &str) -> Self {
        let document = Html::parse_document(html);
        Self {
            title: extract_title(&document),
            content: extract_content(&document),
            url: url.to_string(),
        }
    }

    /// 문서로 변환 (문서 ID = URL)
    pub fn into_document(self) -> Document {
        let mut doc = Document::new(self.url.clone(), self.content).with_meta(meta::URL, self.url);
        if let Some(title) = self.title {
            doc = doc.with_meta(meta::TITLE, title);
        }
        doc
    }
}

/// 기사 로더
pub struct ArticleLoader {
    client: reqwest::Client,
}

impl ArticleLoader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http_client()?,
        })
    }

    /// URL에서 콘텐츠 추출
    pub async fn scrape(&self, url: &str) -> Result<ScrapedContent> {
        tracing::info!("Scraping: {}", url);
        let html = fetch_text(&self.client, url).await?;
        Ok(ScrapedContent::from_html(url, &html))
    }

    /// URL 목록을 문서로 읽기
    ///
    /// 2xx가 아닌 응답을 준 URL은 건너뛰고, 전송 실패는 에러로 반환합니다.
    pub async fn load_data(&self, urls: &[String]) -> Result<Vec<Document>> {
        let mut documents = Vec::with_capacity(urls.len());
        for url in urls {
            let Some(scraped) = skip_http_status(url, self.scrape(url).await)? else {
                continue;
            };
            if scraped.content.is_empty() {
                tracing::warn!("No text content extracted from {}", url);
            }
            documents.push(scraped.into_document());
        }
        Ok(documents)
    }
}

#[async_trait]
impl UrlLoader for ArticleLoader {
    async fn load_data(&self, urls: &[String]) -> Result<Vec<Document>> {
        ArticleLoader::load_data(self, urls).await
    }

    fn name(&self) -> &str {
        "web"
    }
}

/// HTML 조각을 평문으로 (피드 설명 등)
pub fn html_to_text(fragment: &str) -> String {
    let html = Html::parse_fragment(fragment);
    collapse_whitespace(html.root_element().text())
}

/// 제목 추출 (`<title>` → `<h1>`)
fn extract_title(document: &Html) -> Option<String> {
    for selector_str in ["title", "h1"] {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                let title = element.text().collect::<String>().trim().to_string();
                if !title.is_empty() {
                    return Some(title);
                }
            }
        }
    }

    None
}

/// 본문 추출 (HTML 태그 제거)
fn extract_content(document: &Html) -> String {
    let selectors = [
        "article",
        "main",
        "[role=main]",
        ".content",
        "#content",
        "body",
    ];

    for selector_str in selectors {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                let text = extract_text_from_element(&element);
                if text.len() > MIN_CONTENT_LEN {
                    return text;
                }
            }
        }
    }

    // 폴백: 짧더라도 body 전체
    if let Ok(selector) = Selector::parse("body") {
        if let Some(element) = document.select(&selector).next() {
            return extract_text_from_element(&element);
        }
    }

    String::new()
}

/// 요소에서 텍스트 추출 (script/style/noscript 제외)
fn extract_text_from_element(element: &scraper::ElementRef) -> String {
    let skipped = ["script", "style", "noscript"];

    let texts = element.descendants().filter_map(|node| {
        let text = node.value().as_text()?;
        let inside_skipped = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| skipped.contains(&e.name()))
        });
        (!inside_skipped).then_some(&**text)
    });

    collapse_whitespace(texts)
}

/// 텍스트 조각들을 공백 하나로 이어 붙임
fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let mut text = String::new();

    for part in parts {
        let trimmed = part.trim();
        if !trimmed.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);
        }
    }

    if let Ok(re) = regex::Regex::new(r"\s+") {
        re.replace_all(&text, " ").trim().to_string()
    } else {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

// ============================================================================
// Tests
// ============================================================================
