use crate::error::{Result, SourceError};
use crate::model::{CrawlRecord, CrawlScope, Page};
use crate::source::DataSource;
use futures::future::{BoxFuture, FutureExt};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

const NODES_QUERY: &str = "query Nodes($webPages: [ID]) { \
    nodes(webPages: $webPages) { \
        title url crawlTime \
        links { url title } \
        owner { identifier label regexp } \
    } \
}";

const WEBSITES_QUERY: &str = "query Websites { \
    websites { identifier label url regexp tags active } \
}";

/// Fetches pages from the crawler backend's GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct GraphQlSource {
    client: Client,
    endpoint: Url,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct NodesData {
    nodes: Option<Vec<Page>>,
}

#[derive(Deserialize)]
struct WebsitesData {
    websites: Option<Vec<CrawlRecord>>,
}

impl GraphQlSource {
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::with_timeout(endpoint, 10)
    }

    pub fn with_timeout(endpoint: &str, timeout_secs: u64) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| SourceError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(SourceError::InvalidEndpoint(format!(
                "unsupported scheme '{}'",
                endpoint.scheme()
            )));
        }

        let client = Client::builder()
            .user_agent("Crawlgraph/0.1 (https://github.com/trapdoorsec/crawlgraph)")
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn variables_for(scope: &CrawlScope) -> Value {
        match scope {
            CrawlScope::All => json!({ "webPages": null }),
            CrawlScope::Records(ids) => json!({ "webPages": ids }),
        }
    }

    async fn post<T: DeserializeOwned>(
        client: Client,
        endpoint: Url,
        query: &'static str,
        variables: Value,
    ) -> Result<T> {
        debug!("POST {} ({} bytes of query)", endpoint, query.len());

        let start = Instant::now();
        let response = client
            .post(endpoint.clone())
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?
            .error_for_status()?;
        let body: GraphQlResponse<T> = response.json().await?;
        debug!("Response from {} in {:?}", endpoint, start.elapsed());

        if !body.errors.is_empty() {
            let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();
            warn!("GraphQL errors from {}: {:?}", endpoint, messages);
            return Err(SourceError::GraphQl(messages));
        }

        body.data.ok_or(SourceError::MissingData)
    }
}

impl DataSource for GraphQlSource {
    fn fetch(&self, scope: &CrawlScope) -> BoxFuture<'static, Result<Vec<Page>>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let variables = Self::variables_for(scope);

        async move {
            let data: NodesData = Self::post(client, endpoint, NODES_QUERY, variables).await?;
            let pages = data.nodes.ok_or(SourceError::MissingData)?;
            debug!("Fetched {} pages", pages.len());
            Ok(pages)
        }
        .boxed()
    }

    fn records(&self) -> BoxFuture<'static, Result<Vec<CrawlRecord>>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();

        async move {
            let data: WebsitesData =
                Self::post(client, endpoint, WEBSITES_QUERY, json!({})).await?;
            data.websites.ok_or(SourceError::MissingData)
        }
        .boxed()
    }
}
