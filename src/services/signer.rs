//! Public locators and presigned URLs for the local disk backend.

use chrono::Utc;
use std::time::Duration;
use url::{ParseError, Url};

/// Builds `<public_url>/files/<bucket>/<key>` locators and signs them.
///
/// Bucket and key segments are percent-encoded, so a key holding `?` or `#`
/// still round-trips through the `/files/{bucket}/{*key}` route.
#[derive(Clone)]
pub struct UrlSigner {
    base: Url,
    secret: String,
}

impl UrlSigner {
    pub fn new(public_url: &str, secret: impl Into<String>) -> Result<Self, ParseError> {
        let base = Url::parse(public_url)?;
        if base.cannot_be_a_base() {
            return Err(ParseError::RelativeUrlWithCannotBeABaseBase);
        }
        Ok(Self {
            base,
            secret: secret.into(),
        })
    }

    /// Unsigned locator. Serving it requires a valid signature.
    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        self.locator(bucket, key).into()
    }

    /// Locator valid until now + `ttl`.
    pub fn presign(&self, bucket: &str, key: &str, ttl: Duration) -> String {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let mut url = self.locator(bucket, key);
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &self.signature(bucket, key, expires));
        url.into()
    }

    /// True when `signature` matches and `expires` is still in the future.
    pub fn verify(&self, bucket: &str, key: &str, expires: i64, signature: &str) -> bool {
        if expires < Utc::now().timestamp() {
            return false;
        }
        self.signature(bucket, key, expires) == signature
    }

    fn locator(&self, bucket: &str, key: &str) -> Url {
        let mut url = self.base.clone();
        // `new` rejects cannot-be-a-base URLs, so segments are always available.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("files")
                .push(bucket)
                .extend(key.split('/'));
        }
        url
    }

    fn signature(&self, bucket: &str, key: &str, expires: i64) -> String {
        let digest = md5::compute(format!("{}:{}:{}:{}", self.secret, bucket, key, expires));
        format!("{:x}", digest)
    }
}
