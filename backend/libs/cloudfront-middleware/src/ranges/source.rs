/// Provider-published IP range documents
use super::network::{normalize_region, NetworkRange};
use super::set::RangeSet;
use crate::error::RangeError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_IP_RANGES_URL: &str = "https://ip-ranges.amazonaws.com/ip-ranges.json";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Region labels to retain. Empty retains every region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionFilter(BTreeSet<String>);

impl RegionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            regions
                .into_iter()
                .map(|r| normalize_region(r.as_ref()))
                .filter(|r| !r.is_empty())
                .collect(),
        )
    }

    /// Parse a comma separated list such as `"us-east-1, us-west-2"`.
    pub fn parse_list(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, region: &str) -> bool {
        self.0.is_empty() || self.0.contains(&normalize_region(region))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Source of network range snapshots.
#[async_trait]
pub trait RangeSource: Send + Sync {
    async fn fetch(&self, document_url: &str, regions: &RegionFilter)
        -> Result<RangeSet, RangeError>;
}

/// Fetches the AWS `ip-ranges.json` document over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRangeSource {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpRangeSource {
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), timeout)
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn download(&self, document_url: &str) -> Result<Vec<u8>, RangeError> {
        let response = self
            .client
            .get(document_url)
            .send()
            .await
            .map_err(|e| RangeError::Fetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| RangeError::Fetch(e.to_string()))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| RangeError::Fetch(e.to_string()))?;

        Ok(body.to_vec())
    }
}

impl Default for HttpRangeSource {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

#[async_trait]
impl RangeSource for HttpRangeSource {
    async fn fetch(
        &self,
        document_url: &str,
        regions: &RegionFilter,
    ) -> Result<RangeSet, RangeError> {
        let body = tokio::time::timeout(self.timeout, self.download(document_url))
            .await
            .map_err(|_| {
                RangeError::Fetch(format!(
                    "request to {} timed out after {:?}",
                    document_url, self.timeout
                ))
            })??;

        parse_document(&body, regions)
    }
}

/// Fixed ranges, for allow-lists that do not come from a provider.
///
/// Entries are kept as given and filtered by region before the set is built,
/// so a block listed under several regions matches any of them.
#[derive(Debug, Clone, Default)]
pub struct StaticRangeSource {
    ranges: Vec<NetworkRange>,
}

impl StaticRangeSource {
    pub fn new(ranges: impl IntoIterator<Item = NetworkRange>) -> Self {
        Self {
            ranges: ranges.into_iter().collect(),
        }
    }
}

#[async_trait]
impl RangeSource for StaticRangeSource {
    async fn fetch(&self, _document_url: &str, regions: &RegionFilter) -> Result<RangeSet, RangeError> {
        Ok(self
            .ranges
            .iter()
            .filter(|range| regions.is_empty() || range.region().is_some_and(|r| regions.matches(r)))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct IpRangesDocument {
    #[serde(rename = "syncToken", default)]
    sync_token: Option<String>,
    #[serde(rename = "createDate", default)]
    create_date: Option<String>,
    // Entries stay untyped so one bad entry cannot fail the whole document.
    prefixes: Vec<Value>,
    #[serde(default)]
    ipv6_prefixes: Vec<Value>,
}

/// Parse an `ip-ranges.json` document, keeping entries whose region passes `regions`.
///
/// Entries with a missing or malformed block are dropped. The call only fails
/// when the document itself is not the expected shape.
pub fn parse_document(body: &[u8], regions: &RegionFilter) -> Result<RangeSet, RangeError> {
    let document: IpRangesDocument =
        serde_json::from_slice(body).map_err(|e| RangeError::Parse(e.to_string()))?;

    let mut dropped = 0usize;
    let mut ranges = Vec::with_capacity(document.prefixes.len() + document.ipv6_prefixes.len());

    let entries = document
        .prefixes
        .iter()
        .map(|entry| (entry, "ip_prefix"))
        .chain(document.ipv6_prefixes.iter().map(|entry| (entry, "ipv6_prefix")));

    for (entry, block_field) in entries {
        let region = entry.get("region").and_then(Value::as_str);

        if !regions.is_empty() && !region.is_some_and(|r| regions.matches(r)) {
            continue;
        }

        let parsed = entry
            .get(block_field)
            .and_then(Value::as_str)
            .and_then(|block| NetworkRange::parse(block, region).ok());

        match parsed {
            Some(range) => ranges.push(range),
            None => dropped += 1,
        }
    }

    let set = RangeSet::new(ranges);

    debug!(
        sync_token = ?document.sync_token,
        create_date = ?document.create_date,
        ranges = set.len(),
        dropped,
        "Parsed IP ranges document"
    );

    Ok(set)
}
