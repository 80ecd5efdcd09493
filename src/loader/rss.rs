//! RSS/Atom 피드 로더
//!
//! RSS 2.0 `<item>`과 Atom `<entry>`를 모두 읽습니다.
//! - RSS: `<link>텍스트</link>`
//! - Atom: `<link href="..."/>` (`rel`이 없거나 `alternate`인 것 우선)
//!
//! 상대 링크는 피드 URL 기준으로 절대 URL로 바꿉니다.

use anyhow::{Context, Result};
use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use url::Url;

use super::web::html_to_text;
use super::{fetch_text, http_client, skip_http_status, UrlLoader};
use crate::knowledge::{meta, Document};

/// 피드 항목
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedItem {
    pub title: Option<String>,
    pub link: String,
    /// 설명/요약 (HTML 제거)
    pub description: Option<String>,
}

impl FeedItem {
    /// 문서로 변환 (문서 ID = 링크)
    pub fn into_document(self) -> Document {
        let text = self.description.unwrap_or_default();
        let mut doc = Document::new(self.link.clone(), text).with_meta(meta::LINK, self.link);
        if let Some(title) = self.title {
            doc = doc.with_meta(meta::TITLE, title);
        }
        doc
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// 항목 안에서 텍스트를 모으는 필드
#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Title,
    Link,
    Description,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" | b"summary" | b"content" | b"encoded" => Some(Field::Description),
            _ => None,
        }
    }
}

#[derive(Default)]
struct ItemBuilder {
    title: String,
    link: Option<String>,
    alternate_link: Option<String>,
    text_link: String,
    description: String,
}

impl ItemBuilder {
    fn push_text(&mut self, field: Field, text: &str) {
        match field {
            Field::Title => self.title.push_str(text),
            Field::Link => self.text_link.push_str(text),
            Field::Description => {
                // 설명이 여러 형태로 있으면 처음 것만 사용
                if self.description.is_empty() {
                    self.description.push_str(text);
                }
            }
        }
    }

    /// Atom `<link href rel>` 처리
    fn push_atom_link(&mut self, element: &BytesStart<'_>) {
        let Some(href) = attribute(element, b"href") else {
            return;
        };

        match attribute(element, b"rel").as_deref() {
            None | Some("alternate") => {
                if self.alternate_link.is_none() {
                    self.alternate_link = Some(href);
                }
            }
            Some(_) => {
                if self.link.is_none() {
                    self.link = Some(href);
                }
            }
        }
    }

    fn finish(self, base: Option<&Url>) -> Option<FeedItem> {
        let raw = self
            .alternate_link
            .or_else(|| Some(self.text_link.trim().to_string()).filter(|s| !s.is_empty()))
            .or(self.link)?;

        let link = resolve_link(raw.trim(), base);
        let title = Some(self.title.trim().to_string()).filter(|s| !s.is_empty());
        let description = Some(html_to_text(&self.description)).filter(|s| !s.is_empty());

        Some(FeedItem {
            title,
            link,
            description,
        })
    }
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.to_string()))
}

/// 상대 링크를 피드 URL 기준으로 변환
fn resolve_link(link: &str, base: Option<&Url>) -> String {
    if Url::parse(link).is_ok() {
        return link.to_string();
    }

    base.and_then(|b| b.join(link).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| link.to_string())
}

/// 피드 XML에서 항목 목록 추출 (링크가 없는 항목은 제외)
pub fn parse_feed(xml: &str, base: Option<&Url>) -> Result<Vec<FeedItem>> {
    let mut reader = Reader::from_str(xml);
    let mut items = Vec::new();

    let mut current: Option<ItemBuilder> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event().context("Failed to parse feed XML")? {
            Event::Start(ref e) => {
                let local = e.local_name();
                let name = local.as_ref();

                if name == b"item" || name == b"entry" {
                    current = Some(ItemBuilder::default());
                    field = None;
                } else if let Some(item) = current.as_mut() {
                    if field.is_none() {
                        field = Field::from_local_name(name);
                    }
                    if name == b"link" {
                        item.push_atom_link(e);
                    }
                }
            }
            Event::Empty(ref e) => {
                if let Some(item) = current.as_mut() {
                    if e.local_name().as_ref() == b"link" {
                        item.push_atom_link(e);
                    }
                }
            }
            Event::End(ref e) => {
                let local = e.local_name();
                let name = local.as_ref();

                if name == b"item" || name == b"entry" {
                    if let Some(item) = current.take().and_then(|b| b.finish(base)) {
                        items.push(item);
                    }
                    field = None;
                } else if field.is_some() && Field::from_local_name(name) == field {
                    field = None;
                }
            }
            Event::Text(ref e) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let text = e.unescape().context("Invalid text in feed")?;
                    item.push_text(f, &text);
                }
            }
            Event::CData(ref e) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.push_text(f, &String::from_utf8_lossy(e));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}

// ============================================================================
// RssReader
// ============================================================================

/// RSS 피드 로더
pub struct RssReader {
    client: reqwest::Client,
}

impl RssReader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http_client()?,
        })
    }

    /// 피드 하나를 읽어 항목 목록 반환
    pub async fn fetch_feed(&self, feed_url: &str) -> Result<Vec<FeedItem>> {
        tracing::info!("Fetching feed: {}", feed_url);
        let xml = fetch_text(&self.client, feed_url).await?;
        let base = Url::parse(feed_url).ok();

        parse_feed(&xml, base.as_ref()).with_context(|| format!("Invalid feed: {}", feed_url))
    }

    /// 피드 목록의 모든 항목을 문서로 읽기 (2xx가 아닌 피드는 건너뜀)
    pub async fn load_data(&self, feed_urls: &[String]) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        for feed_url in feed_urls {
            let Some(items) = skip_http_status(feed_url, self.fetch_feed(feed_url).await)? else {
                continue;
            };
            tracing::info!("{} items in {}", items.len(), feed_url);
            documents.extend(items.into_iter().map(FeedItem::into_document));
        }
        Ok(documents)
    }
}

#[async_trait]
impl UrlLoader for RssReader {
    async fn load_data(&self, urls: &[String]) -> Result<Vec<Document>> {
        RssReader::load_data(self, urls).await
    }

    fn name(&self) -> &str {
        "rss"
    }
}

// ============================================================================
// Tests
// ============================================================================
