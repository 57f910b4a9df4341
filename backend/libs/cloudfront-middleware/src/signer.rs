use crate::error::{ConfigError, SigningError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha1::Sha1;
use std::fmt;
use std::fs;
use std::path::Path;
use url::Url;

/// Mints time-limited URLs for an edge resource.
pub trait UrlSigner: Send + Sync {
    fn sign(&self, resource_url: &str, expires_at: DateTime<Utc>) -> Result<String, SigningError>;
}

/// CloudFront canned-policy signer.
pub struct CloudFrontSigner {
    key_pair_id: String,
    signing_key: SigningKey<Sha1>,
}

impl CloudFrontSigner {
    pub fn new(key_pair_id: impl Into<String>, private_key: RsaPrivateKey) -> Self {
        Self {
            key_pair_id: key_pair_id.into(),
            signing_key: SigningKey::<Sha1>::new(private_key),
        }
    }

    /// Load an RSA key from PEM. PKCS#1 is what CloudFront hands out; PKCS#8 also works.
    pub fn from_pem(key_pair_id: impl Into<String>, pem: &str) -> Result<Self, ConfigError> {
        let private_key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| {
                ConfigError::PrivateKey(format!(
                    "failed to decode private key as an RSA private key: {e}"
                ))
            })?;

        Ok(Self::new(key_pair_id, private_key))
    }

    pub fn from_pem_file(
        key_pair_id: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let pem = fs::read_to_string(path).map_err(|e| {
            ConfigError::PrivateKey(format!(
                "failed to read privatekey file {}: {e}",
                path.display()
            ))
        })?;

        Self::from_pem(key_pair_id, &pem)
    }

    pub fn key_pair_id(&self) -> &str {
        &self.key_pair_id
    }
}

impl fmt::Debug for CloudFrontSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudFrontSigner")
            .field("key_pair_id", &self.key_pair_id)
            .finish_non_exhaustive()
    }
}

impl UrlSigner for CloudFrontSigner {
    fn sign(&self, resource_url: &str, expires_at: DateTime<Utc>) -> Result<String, SigningError> {
        let mut url = Url::parse(resource_url)
            .map_err(|e| SigningError::InvalidUrl(format!("{resource_url}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
            return Err(SigningError::InvalidUrl(format!(
                "{resource_url}: expected an absolute http(s) URL"
            )));
        }
        url.set_fragment(None);

        let epoch = expires_at.timestamp();
        if epoch <= 0 {
            return Err(SigningError::Expiry(format!(
                "expiry {expires_at} is not after the Unix epoch"
            )));
        }

        let policy = canned_policy(url.as_str(), epoch);
        let signature = self
            .signing_key
            .try_sign(policy.as_bytes())
            .map_err(|e| SigningError::Rsa(e.to_string()))?;
        let signature = cloudfront_base64(&signature.to_bytes());

        let separator = if url.query().is_some() { '&' } else { '?' };
        Ok(format!(
            "{url}{separator}Expires={epoch}&Signature={signature}&Key-Pair-Id={}",
            self.key_pair_id
        ))
    }
}

pub(crate) fn canned_policy(resource: &str, epoch: i64) -> String {
    format!(
        r#"{{"Statement":[{{"Resource":"{resource}","Condition":{{"DateLessThan":{{"AWS:EpochTime":{epoch}}}}}}}]}}"#
    )
}

/// Base64 with CloudFront's substitutions for characters invalid in a query string.
pub(crate) fn cloudfront_base64(bytes: &[u8]) -> String {
    STANDARD
        .encode(bytes)
        .chars()
        .map(|c| match c {
            '+' => '-',
            '=' => '_',
            '/' => '~',
            other => other,
        })
        .collect()
}
