pub mod sections;
pub mod types;

use std::collections::HashMap;
use std::num::NonZeroUsize;

use async_trait::async_trait;
use lru::LruCache;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::LookupError;
use types::KnowledgeResult;

/// Topics shorter than this (in characters, after trimming) are not searched.
pub const MIN_TOPIC_CHARS: usize = 4;

pub const DEFAULT_API_URL: &str = "https://en.wikipedia.org/w/api.php";

/// Lookups remembered before the least recently used one is evicted.
pub const DEFAULT_CACHE_ENTRIES: usize = 256;

/// Something that can answer "what does the encyclopedia say about X".
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn lookup(&self, topic: &str) -> Result<KnowledgeResult, LookupError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    query: Option<QueryBody>,
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    /// Keyed by page id; `-1` (and a `missing` marker) means no article.
    #[serde(default)]
    pages: Option<HashMap<String, Page>>,
    #[serde(default)]
    search: Option<Vec<TitleRef>>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    missing: Option<serde_json::Value>,
    #[serde(default)]
    invalid: Option<serde_json::Value>,
    #[serde(default)]
    categories: Vec<TitleRef>,
    #[serde(default)]
    links: Vec<TitleRef>,
}

#[derive(Debug, Deserialize)]
struct TitleRef {
    title: String,
}

impl Page {
    fn exists(&self) -> bool {
        self.missing.is_none() && self.invalid.is_none()
    }
}

/// MediaWiki action API client.
pub struct WikiClient {
    client: reqwest::Client,
    api_url: String,
    /// Successful lookups by normalized topic. Errors are never cached.
    cache: Mutex<LruCache<String, KnowledgeResult>>,
}

impl WikiClient {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_url = dotenv::var("WIKI_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::new(api_url)
    }

    pub fn new(api_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!("wikime/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            cache: Mutex::new(LruCache::new(cache_capacity(DEFAULT_CACHE_ENTRIES))),
        })
    }

    /// Keep at most `entries` lookups (at least one).
    pub fn with_cache_entries(self, entries: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(cache_capacity(entries))),
            ..self
        }
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<QueryBody, LookupError> {
        let resp = self
            .client
            .get(&self.api_url)
            .query(&[("action", "query"), ("format", "json")])
            .query(params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LookupError::Status(status));
        }

        let text = resp.text().await?;
        let parsed: ApiResponse = serde_json::from_str(&text)
            .map_err(|e| LookupError::Malformed(e.to_string()))?;
        parsed
            .query
            .ok_or_else(|| LookupError::Malformed("response has no `query` object".to_string()))
    }

    /// Intro extract plus categories and links. `None` when no article exists.
    async fn fetch_intro(&self, title: &str) -> Result<Option<Page>, LookupError> {
        let body = self
            .query(&[
                ("prop", "extracts|categories|links"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("exsectionformat", "wiki"),
                ("titles", title),
                ("pllimit", "10"),
                ("plnamespace", "0"),
                ("clshow", "!hidden"),
                ("redirects", "1"),
            ])
            .await?;
        first_page(body)
    }

    /// Full plain-text article with wiki-style headings.
    async fn fetch_full(&self, title: &str) -> Result<String, LookupError> {
        let body = self
            .query(&[
                ("prop", "extracts"),
                ("explaintext", "1"),
                ("exsectionformat", "wiki"),
                ("titles", title),
                ("redirects", "1"),
            ])
            .await?;
        Ok(first_page(body)?
            .and_then(|page| page.extract)
            .unwrap_or_default())
    }

    /// Full-text search for candidate article titles.
    async fn search(&self, topic: &str) -> Result<Vec<String>, LookupError> {
        let body = self
            .query(&[
                ("list", "search"),
                ("srsearch", topic),
                ("srlimit", "5"),
                ("srnamespace", "0"),
            ])
            .await?;
        let hits = body
            .search
            .ok_or_else(|| LookupError::Malformed("search response has no results list".to_string()))?;
        Ok(hits.into_iter().map(|hit| hit.title).collect())
    }

    async fn fetch(&self, topic: &str) -> Result<KnowledgeResult, LookupError> {
        let mut extra_suggestions = Vec::new();

        let page = match self.fetch_intro(topic).await? {
            Some(page) => page,
            None => {
                let candidates = self.search(topic).await?;
                debug!(topic, candidates = candidates.len(), "No exact article, searched");
                let Some((best, rest)) = candidates.split_first() else {
                    return Ok(KnowledgeResult::empty(topic));
                };
                extra_suggestions = rest.to_vec();
                match self.fetch_intro(best).await? {
                    Some(page) => page,
                    None => return Ok(KnowledgeResult::empty(topic)),
                }
            }
        };

        let full = self.fetch_full(&page.title).await?;
        let mut sections = sections::split_sections(&full);

        let categories: Vec<String> = page
            .categories
            .iter()
            .map(|c| c.title.trim_start_matches("Category:").to_string())
            .collect();
        if !categories.is_empty() {
            sections.insert("Categories".to_string(), categories.join(", "));
        }

        let mut suggestions = Vec::new();
        for title in page
            .links
            .into_iter()
            .map(|l| l.title)
            .chain(extra_suggestions)
        {
            if title != page.title && !suggestions.contains(&title) {
                suggestions.push(title);
            }
        }

        Ok(KnowledgeResult {
            title: page.title,
            summary: page.extract.unwrap_or_default().trim().to_string(),
            sections,
            suggestions,
        })
    }
}

fn first_page(body: QueryBody) -> Result<Option<Page>, LookupError> {
    let pages = body
        .pages
        .ok_or_else(|| LookupError::Malformed("response has no `pages` object".to_string()))?;
    Ok(pages.into_values().find(Page::exists))
}

fn cache_capacity(entries: usize) -> NonZeroUsize {
    NonZeroUsize::new(entries).unwrap_or(NonZeroUsize::MIN)
}

fn cache_key(topic: &str) -> String {
    topic.trim().to_lowercase()
}

#[async_trait]
impl KnowledgeSource for WikiClient {
    async fn lookup(&self, topic: &str) -> Result<KnowledgeResult, LookupError> {
        let topic = topic.trim();
        if topic.chars().count() < MIN_TOPIC_CHARS {
            return Err(LookupError::TopicTooShort(topic.to_string()));
        }

        let key = cache_key(topic);
        {
            let mut cache = self.cache.lock().await;
            if let Some(hit) = cache.get(&key) {
                debug!(topic, "Wikipedia cache hit");
                return Ok(hit.clone());
            }
        }

        let result = self.fetch(topic).await?;
        info!(
            topic,
            title = %result.title,
            summary_len = result.summary.len(),
            sections = result.sections.len(),
            "Wikipedia lookup complete"
        );

        {
            let mut cache = self.cache.lock().await;
            cache.put(key, result.clone());
        }
        Ok(result)
    }
}
