/// Per-request choice between the origin store redirect and a signed edge URL
use crate::error::SigningError;
use crate::metrics::DecisionMetrics;
use crate::ranges::RangeRefresher;
use crate::signer::UrlSigner;
use crate::storage::EdgeKeyer;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_DURATION: Duration = Duration::from_secs(20 * 60);

/// What to do when IP filtering is on but no range document has loaded yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColdStartPolicy {
    /// Treat every client as remote and use the edge (fail closed).
    #[default]
    EdgeOnly,
    /// Treat every client as close to origin.
    Origin,
}

impl FromStr for ColdStartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "edge" | "edgeonly" => Ok(Self::EdgeOnly),
            "origin" => Ok(Self::Origin),
            other => Err(format!("unknown cold start policy {other:?}, expected edge|origin")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectDecision {
    /// Defer to the storage driver's own redirect.
    Origin,
    /// Signed edge URL valid until `expires_at`.
    Edge {
        url: String,
        expires_at: DateTime<Utc>,
    },
}

/// Where the origin filter placed a request address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OriginMatch {
    Unfiltered,
    /// Filtering is on but no document has loaded yet
    ColdStart,
    Inside,
    Outside,
}

pub struct RedirectDecider {
    signer: Arc<dyn UrlSigner>,
    base_url: String,
    duration: Duration,
    ip_filter: Option<RangeRefresher>,
    cold_start: ColdStartPolicy,
    unsupported_reported: AtomicBool,
}

impl RedirectDecider {
    /// `base_url` is used verbatim as the prefix of every edge URL.
    pub fn new(signer: Arc<dyn UrlSigner>, base_url: impl Into<String>, duration: Duration) -> Self {
        Self {
            signer,
            base_url: base_url.into(),
            duration,
            ip_filter: None,
            cold_start: ColdStartPolicy::default(),
            unsupported_reported: AtomicBool::new(false),
        }
    }

    pub fn with_ip_filter(mut self, refresher: RangeRefresher) -> Self {
        self.ip_filter = Some(refresher);
        self
    }

    pub fn with_cold_start_policy(mut self, policy: ColdStartPolicy) -> Self {
        self.cold_start = policy;
        self
    }

    pub fn ip_filter(&self) -> Option<&RangeRefresher> {
        self.ip_filter.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn decide(
        &self,
        origin: &str,
        path: &str,
        keyer: Option<&dyn EdgeKeyer>,
    ) -> Result<RedirectDecision, SigningError> {
        self.decide_at(origin, path, keyer, Utc::now())
    }

    pub fn decide_at(
        &self,
        origin: &str,
        path: &str,
        keyer: Option<&dyn EdgeKeyer>,
        now: DateTime<Utc>,
    ) -> Result<RedirectDecision, SigningError> {
        let Some(keyer) = keyer else {
            if !self.unsupported_reported.swap(true, Ordering::Relaxed) {
                warn!("the CloudFront middleware does not support this backend storage driver, passing redirects through");
            }
            DecisionMetrics::record("passthrough");
            return Ok(RedirectDecision::Origin);
        };

        let matched = self.match_origin(origin);
        if matched == OriginMatch::ColdStart {
            DecisionMetrics::record_cold_start();
        }
        let to_origin = match matched {
            OriginMatch::Inside => true,
            OriginMatch::ColdStart => self.cold_start == ColdStartPolicy::Origin,
            OriginMatch::Unfiltered | OriginMatch::Outside => false,
        };
        if to_origin {
            DecisionMetrics::record("origin");
            return Ok(RedirectDecision::Origin);
        }

        let expires_at = chrono::Duration::from_std(self.duration)
            .ok()
            .and_then(|duration| now.checked_add_signed(duration))
            .ok_or_else(|| SigningError::Expiry(format!("duration {:?} is out of range", self.duration)))?;

        // base_url always ends with '/'
        let key = keyer.edge_key(path);
        let resource = format!("{}{}", self.base_url, key.trim_start_matches('/'));
        let url = self.signer.sign(&resource, expires_at)?;

        DecisionMetrics::record("edge");
        Ok(RedirectDecision::Edge { url, expires_at })
    }

    fn match_origin(&self, origin: &str) -> OriginMatch {
        let Some(filter) = &self.ip_filter else {
            return OriginMatch::Unfiltered;
        };

        let snapshot = filter.snapshot();
        if !snapshot.is_populated() {
            OriginMatch::ColdStart
        } else if snapshot.ranges.contains(origin) {
            OriginMatch::Inside
        } else {
            OriginMatch::Outside
        }
    }
}
