//! CloudFront redirect middleware for blob storage drivers
//!
//! Wraps a [`StorageDriver`] and answers `redirect_url` with either:
//! - the driver's own (origin) redirect, for clients inside the configured AWS IP ranges
//! - a time-limited signed CloudFront URL, for everyone else
//!
//! The AWS IP range document is fetched at startup and refreshed in the
//! background; request handling only reads the latest snapshot.
//!
//! # Example
//!
//! ```no_run
//! use cloudfront_middleware::{CloudFrontMiddleware, MiddlewareOptions, RedirectRequest, StorageDriver};
//! # use cloudfront_middleware::{EdgeKeyer, StorageResult};
//! # struct S3Driver;
//! # impl EdgeKeyer for S3Driver { fn edge_key(&self, path: &str) -> String { path.into() } }
//! # #[async_trait::async_trait]
//! # impl StorageDriver for S3Driver {
//! #     fn name(&self) -> &str { "s3" }
//! #     async fn redirect_url(&self, _: &RedirectRequest, _: &str) -> StorageResult<Option<String>> { Ok(None) }
//! #     fn edge_keyer(&self) -> Option<&dyn EdgeKeyer> { Some(self) }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = MiddlewareOptions::from_map([
//!         ("baseurl", "d111111abcdef8.cloudfront.net"),
//!         ("privatekey", "/etc/registry/cloudfront.pem"),
//!         ("keypairid", "APKAEXAMPLE"),
//!         ("ipfilteredby", "awsregion"),
//!         ("awsregion", "us-east-1,us-west-2"),
//!     ])?;
//!     let middleware = CloudFrontMiddleware::new(S3Driver, &options).await?;
//!
//!     let request = RedirectRequest::new("198.51.100.7:52144");
//!     let url = middleware.redirect_url(&request, "/docker/registry/v2/blobs/sha256/ab/abcd/data").await?;
//!     println!("307 -> {:?}", url);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod decider;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod ranges;
pub mod request;
pub mod signer;
pub mod storage;

// Re-export main types for convenience
pub use config::{CloudFrontConfig, IpFilterMode, MiddlewareOptions};
pub use decider::{ColdStartPolicy, RedirectDecider, RedirectDecision, DEFAULT_DURATION};
pub use error::{ConfigError, RangeError, Result as StorageResult, SigningError, StorageError};
pub use middleware::CloudFrontMiddleware;
pub use ranges::{
    HttpRangeSource, NetworkRange, RangeRefresher, RangeSet, RangeSource, RefreshPolicy,
    RegionFilter, StaticRangeSource,
};
pub use request::RedirectRequest;
pub use signer::{CloudFrontSigner, UrlSigner};
pub use storage::{EdgeKeyer, StorageDriver};
