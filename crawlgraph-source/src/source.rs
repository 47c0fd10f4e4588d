use crate::error::Result;
use crate::model::{CrawlRecord, CrawlScope, Page};
use futures::future::{self, BoxFuture, FutureExt};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Read-only access to crawled pages.
///
/// Returned futures own everything they need, so a caller may keep several
/// fetches in flight and drop any of them to cancel.
pub trait DataSource: Send + Sync {
    fn fetch(&self, scope: &CrawlScope) -> BoxFuture<'static, Result<Vec<Page>>>;

    fn records(&self) -> BoxFuture<'static, Result<Vec<CrawlRecord>>>;
}

impl<S: DataSource + ?Sized> DataSource for Arc<S> {
    fn fetch(&self, scope: &CrawlScope) -> BoxFuture<'static, Result<Vec<Page>>> {
        (**self).fetch(scope)
    }

    fn records(&self) -> BoxFuture<'static, Result<Vec<CrawlRecord>>> {
        (**self).records()
    }
}

/// A fixed page list, served as-is on every fetch.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    pages: Arc<Vec<Page>>,
    records: Arc<Vec<CrawlRecord>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DumpFile {
    Pages(Vec<Page>),
    Wrapped { nodes: Vec<Page> },
    Response { data: DumpData },
}

#[derive(Deserialize)]
struct DumpData {
    nodes: Vec<Page>,
}

impl StaticSource {
    pub fn new(pages: Vec<Page>) -> Self {
        Self {
            pages: Arc::new(pages),
            records: Arc::new(Vec::new()),
        }
    }

    pub fn with_records(mut self, records: Vec<CrawlRecord>) -> Self {
        self.records = Arc::new(records);
        self
    }

    /// Load pages from a JSON dump: a bare array, `{"nodes": [...]}`, or a
    /// full GraphQL response `{"data": {"nodes": [...]}}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let pages = match serde_json::from_str::<DumpFile>(&content)? {
            DumpFile::Pages(pages) => pages,
            DumpFile::Wrapped { nodes } => nodes,
            DumpFile::Response { data } => data.nodes,
        };
        debug!("Loaded {} pages from {}", pages.len(), path.display());
        Ok(Self::new(pages))
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl DataSource for StaticSource {
    fn fetch(&self, scope: &CrawlScope) -> BoxFuture<'static, Result<Vec<Page>>> {
        let pages: Vec<Page> = self
            .pages
            .iter()
            .filter(|page| scope.includes(&page.owner.identifier))
            .cloned()
            .collect();
        future::ready(Ok(pages)).boxed()
    }

    fn records(&self) -> BoxFuture<'static, Result<Vec<CrawlRecord>>> {
        future::ready(Ok(self.records.as_ref().clone())).boxed()
    }
}
