//! Blob store collaborator
//!
//! The core only needs to store an upload's bytes and to delete them again
//! when a record expires. Objects are addressed by a locator: the last path
//! segment of the object URL kept in the file record. Every upload gets its
//! own locator, so records never share an object.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::error::BlobError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `locator`, returning the object URL
    async fn put(&self, locator: &str, data: Vec<u8>) -> Result<String, BlobError>;

    /// Delete the object at `locator`. Deleting a missing object succeeds.
    async fn delete(&self, locator: &str) -> Result<(), BlobError>;
}

/// Locator for a stored object URL: its last path segment
pub fn locator_from_url(blob_url: &str) -> &str {
    let trimmed = blob_url.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Fresh locator for an upload of `file_name` by `owner_id`:
/// `{owner_id}-{random id}-{percent-encoded name}`, a single path segment
pub fn locator_for_upload(owner_id: i64, file_name: &str) -> String {
    format!(
        "{}-{}-{}",
        owner_id,
        Uuid::new_v4().simple(),
        urlencoding::encode(file_name)
    )
}

/// Blob store speaking plain HTTP PUT/DELETE against a bucket base URL
/// (S3-compatible gateways with pre-authorised access, MinIO, etc.)
pub struct HttpBlobStore {
    client: Client,
    base_url: Url,
}

impl HttpBlobStore {
    pub fn new(base_url: &str) -> Result<Self, BlobError> {
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url =
            Url::parse(&normalized).map_err(|e| BlobError::Config(format!("{base_url}: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BlobError::Config(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Object URL for a locator. Locators are already percent-encoded.
    pub fn object_url(&self, locator: &str) -> String {
        format!("{}{}", self.base_url, locator)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, locator: &str, data: Vec<u8>) -> Result<String, BlobError> {
        let url = self.object_url(locator);
        let resp = self.client.put(&url).body(data).send().await?;
        if !resp.status().is_success() {
            return Err(BlobError::Status(resp.status().as_u16()));
        }
        debug!(url = %url, "Stored blob");
        Ok(url)
    }

    async fn delete(&self, locator: &str) -> Result<(), BlobError> {
        let url = self.object_url(locator);
        let resp = self.client.delete(&url).send().await?;
        match resp.status() {
            status if status.is_success() => {
                debug!(url = %url, "Deleted blob");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                debug!(url = %url, "Blob already absent");
                Ok(())
            }
            status => Err(BlobError::Status(status.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_from_url() {
        assert_eq!(
            locator_from_url(
                "https://go-file-management-system-bucket.s3.eu-north-1.amazonaws.com/report.pdf"
            ),
            "report.pdf"
        );
        assert_eq!(
            locator_from_url("https://blobs.example.com/bucket/my%20notes.txt"),
            "my%20notes.txt"
        );
        assert_eq!(locator_from_url("plain-key"), "plain-key");
        assert_eq!(locator_from_url("https://blobs.example.com/a/b/"), "b");
    }

    #[test]
    fn test_locator_for_upload_is_unique_single_segment() {
        let first = locator_for_upload(1, "report.pdf");
        let second = locator_for_upload(2, "report.pdf");
        let again = locator_for_upload(1, "report.pdf");

        assert!(first.starts_with("1-"));
        assert!(first.ends_with("-report.pdf"));
        assert!(second.starts_with("2-"));
        assert_ne!(first, again);

        let nested = locator_for_upload(3, "a/my notes.txt");
        assert!(nested.ends_with("-a%2Fmy%20notes.txt"));
        assert!(!nested.contains('/'));
    }

    #[test]
    fn test_object_url_joins_base_and_locator() {
        let store = HttpBlobStore::new("http://localhost:9000/filebox").unwrap();
        assert_eq!(
            store.object_url("report.pdf"),
            "http://localhost:9000/filebox/report.pdf"
        );

        let store = HttpBlobStore::new("http://localhost:9000/filebox/").unwrap();
        let locator = locator_for_upload(7, "my notes.txt");
        let url = store.object_url(&locator);
        assert_eq!(url, format!("http://localhost:9000/filebox/{locator}"));
        assert_eq!(locator_from_url(&url), locator);
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpBlobStore::new("not a url"),
            Err(BlobError::Config(_))
        ));
    }
}
