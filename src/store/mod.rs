//! Object-store client abstraction.
//!
//! The driver talks to object storage through the [`ObjectStore`] trait: a
//! minimal typed surface over the S3 operations the driver actually uses.
//! Production code wraps the AWS SDK ([`aws::AwsStore`]); tests substitute
//! the in-memory [`memory::MemoryStore`].

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

pub mod aws;
pub mod memory;

pub use aws::AwsStore;
pub use memory::MemoryStore;

/// Classification of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    NotFound,
    InvalidParameter,
    MissingParameter,
    AccessDenied,
    Network,
    Internal,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreErrorKind::NotFound => "not found",
            StoreErrorKind::InvalidParameter => "invalid parameter",
            StoreErrorKind::MissingParameter => "missing parameter",
            StoreErrorKind::AccessDenied => "access denied",
            StoreErrorKind::Network => "network",
            StoreErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl From<StoreErrorKind> for crate::error::ErrorKind {
    fn from(kind: StoreErrorKind) -> Self {
        match kind {
            StoreErrorKind::NotFound => crate::error::ErrorKind::NotFound,
            StoreErrorKind::InvalidParameter => crate::error::ErrorKind::InvalidParameter,
            StoreErrorKind::MissingParameter => crate::error::ErrorKind::MissingParameter,
            StoreErrorKind::AccessDenied => crate::error::ErrorKind::AccessDenied,
            StoreErrorKind::Network => crate::error::ErrorKind::Network,
            StoreErrorKind::Internal => crate::error::ErrorKind::Internal,
        }
    }
}

/// A failed store operation.
#[derive(Error, Debug, Clone)]
#[error("store error ({kind}): {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Internal, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == StoreErrorKind::NotFound
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// An inclusive byte range, matching the S3 `bytes=<start>-<end>` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Number of bytes covered (ranges are inclusive on both ends).
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// The HTTP `Range` header value.
    pub fn header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Metadata returned by a HeadObject call.
#[derive(Debug, Clone)]
pub struct HeadObject {
    pub content_length: u64,
    pub version_id: Option<String>,
}

/// One entry of a list response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
}

/// One page of a paginated list; the caller iterates until `next_token`
/// comes back `None`.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    pub next_token: Option<String>,
}

/// A finished multipart-upload part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Source object of a server-side part copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
}

/// Typed surface over the object-store operations used by the driver.
///
/// Implementations are substitutable: the production [`AwsStore`] wraps the
/// AWS SDK, while [`MemoryStore`] backs the test suite.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Object metadata; `NotFound` when the key does not exist.
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<HeadObject>;

    /// Fetch an object body, optionally restricted to an inclusive range.
    ///
    /// A range reaching past the end of the object returns the available
    /// bytes, as S3 does.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> StoreResult<Bytes>;

    /// One page of a ListObjectsV2-style listing under `prefix`.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> StoreResult<ListPage>;

    /// Store a whole object in one call.
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> StoreResult<()>;

    /// Start a multipart upload; returns the upload id.
    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> StoreResult<String>;

    /// Upload one part; returns its etag.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> StoreResult<String>;

    /// Server-side copy of a source range into one part; returns its etag.
    async fn upload_part_copy(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        source: &CopySource,
        range: ByteRange,
    ) -> StoreResult<String>;

    /// Finalize a multipart upload from its ordered part list.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<()>;

    /// Discard a multipart upload and its stored parts.
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StoreResult<()>;

    /// Delete an object.
    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range_header() {
        let range = ByteRange::new(0, 0);
        assert_eq!(range.header(), "bytes=0-0");
        assert_eq!(range.len(), 1);

        let range = ByteRange::new(5, 1024);
        assert_eq!(range.header(), "bytes=5-1024");
        assert_eq!(range.len(), 1020);
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::not_found("no such key: a/b");
        assert_eq!(err.to_string(), "store error (not found): no such key: a/b");
        assert!(err.is_not_found());
    }
}
