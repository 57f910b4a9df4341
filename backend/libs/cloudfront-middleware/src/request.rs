use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use std::net::SocketAddr;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// The parts of an incoming request the redirect path looks at.
#[derive(Debug, Clone, Default)]
pub struct RedirectRequest {
    headers: HeaderMap,
    remote_addr: Option<String>,
}

impl RedirectRequest {
    pub fn new(remote_addr: impl Into<String>) -> Self {
        Self {
            headers: HeaderMap::new(),
            remote_addr: Some(remote_addr.into()),
        }
    }

    pub fn from_parts(parts: &http::request::Parts, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            headers: parts.headers.clone(),
            remote_addr: remote_addr.map(|addr| addr.to_string()),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    /// Client address as seen through proxies.
    ///
    /// Uses the first `X-Forwarded-For` hop, then `X-Real-IP`, then the
    /// connection address. The result may still carry a port.
    pub fn remote_ip(&self) -> Option<&str> {
        let forwarded = self
            .header_str(X_FORWARDED_FOR)
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());

        forwarded
            .or_else(|| {
                self.header_str(X_REAL_IP)
                    .map(str::trim)
                    .filter(|ip| !ip.is_empty())
            })
            .or(self.remote_addr.as_deref())
    }

    fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}
