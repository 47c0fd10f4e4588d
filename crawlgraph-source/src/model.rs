use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One crawled URL with its outbound links and the crawl record that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub crawl_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub links: Vec<LinkRef>,
    pub owner: CrawlRecordRef,
}

impl Page {
    pub fn new(url: impl Into<String>, owner: CrawlRecordRef) -> Self {
        Self {
            url: url.into(),
            title: None,
            crawl_time: None,
            links: Vec::new(),
            owner,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_link(mut self, url: impl Into<String>) -> Self {
        self.links.push(LinkRef {
            url: url.into(),
            title: None,
        });
        self
    }
}

/// Reference to another page by URL. The target may be missing from the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRef {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// The owning crawl record as embedded in each page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRecordRef {
    pub identifier: String,
    #[serde(rename = "regexp")]
    pub boundary_pattern: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl CrawlRecordRef {
    pub fn new(identifier: impl Into<String>, boundary_pattern: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            boundary_pattern: boundary_pattern.into(),
            label: None,
        }
    }
}

/// A registered crawl target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRecord {
    pub identifier: String,
    pub label: String,
    pub url: String,
    #[serde(rename = "regexp")]
    pub boundary_pattern: String,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Which crawl records' pages to fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CrawlScope {
    #[default]
    All,
    Records(Vec<String>),
}

impl CrawlScope {
    pub fn from_identifiers(ids: Vec<String>) -> Self {
        if ids.is_empty() {
            CrawlScope::All
        } else {
            CrawlScope::Records(ids)
        }
    }

    pub fn includes(&self, identifier: &str) -> bool {
        match self {
            CrawlScope::All => true,
            CrawlScope::Records(ids) => ids.iter().any(|id| id == identifier),
        }
    }
}
