//! In-memory object store.
//!
//! Backs the driver's test suite and gives embedding hosts a store they can
//! run their own tests against without network access. Behavior mirrors S3
//! where the driver depends on it: lexicographic list order, clamped byte
//! ranges, multipart uploads that only materialize on completion.

use super::{
    ByteRange, CompletedPart, CopySource, HeadObject, ListPage, ObjectStore, ObjectSummary,
    StoreError, StoreErrorKind, StoreResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Debug)]
struct UploadState {
    bucket: String,
    key: String,
    parts: BTreeMap<u32, Bytes>,
    etags: HashMap<u32, String>,
}

#[derive(Default)]
struct Inner {
    /// bucket -> key -> body; BTreeMap keeps list order lexicographic.
    buckets: HashMap<String, BTreeMap<String, Bytes>>,
    uploads: HashMap<String, UploadState>,
    aborted: Vec<String>,
}

/// In-memory [`ObjectStore`] implementation.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    page_size: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            page_size: usize::MAX,
        }
    }

    /// Limit list responses to `page_size` entries per page, forcing
    /// callers through the continuation-token path.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            page_size: page_size.max(1),
        }
    }

    /// Seed an object (synchronous, for tests).
    pub fn insert_object(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        let mut inner = self.inner.write().unwrap();
        inner
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), body.into());
    }

    /// Current body of an object, if present.
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let inner = self.inner.read().unwrap();
        inner.buckets.get(bucket)?.get(key).cloned()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.object(bucket, key).is_some()
    }

    /// Upload ids of multipart uploads that are neither completed nor
    /// aborted.
    pub fn pending_uploads(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        inner.uploads.keys().cloned().collect()
    }

    /// Upload ids that received an abort call, in order.
    pub fn aborted_uploads(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        inner.aborted.clone()
    }

    fn object_or_not_found(inner: &Inner, bucket: &str, key: &str) -> StoreResult<Bytes> {
        inner
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("no such object: {bucket}/{key}")))
    }

    fn slice_range(body: &Bytes, range: ByteRange) -> StoreResult<Bytes> {
        let len = body.len() as u64;
        if range.start >= len {
            return Err(StoreError::new(
                StoreErrorKind::InvalidParameter,
                format!("range start {} beyond object size {len}", range.start),
            ));
        }
        // S3 serves the available bytes when the range end overshoots
        let end = range.end.min(len - 1);
        Ok(body.slice(range.start as usize..=end as usize))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<HeadObject> {
        let inner = self.inner.read().unwrap();
        let body = Self::object_or_not_found(&inner, bucket, key)?;
        Ok(HeadObject {
            content_length: body.len() as u64,
            version_id: None,
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> StoreResult<Bytes> {
        let inner = self.inner.read().unwrap();
        let body = Self::object_or_not_found(&inner, bucket, key)?;
        match range {
            Some(range) => Self::slice_range(&body, range),
            None => Ok(body),
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> StoreResult<ListPage> {
        let inner = self.inner.read().unwrap();
        let objects = inner.buckets.get(bucket);

        let mut matching = objects
            .map(|objects| {
                objects
                    .range(prefix.to_string()..)
                    .take_while(|(key, _)| key.starts_with(prefix))
                    .map(|(key, body)| ObjectSummary {
                        key: key.clone(),
                        size: body.len() as u64,
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if let Some(token) = continuation_token {
            matching.retain(|obj| obj.key > token);
        }

        let next_token = if matching.len() > self.page_size {
            matching.truncate(self.page_size);
            matching.last().map(|obj| obj.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects: matching,
            next_token,
        })
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> StoreResult<()> {
        self.insert_object(bucket, key, body);
        Ok(())
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> StoreResult<String> {
        let upload_id = uuid::Uuid::new_v4().to_string();
        let mut inner = self.inner.write().unwrap();
        inner.uploads.insert(
            upload_id.clone(),
            UploadState {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
                etags: HashMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> StoreResult<String> {
        let mut inner = self.inner.write().unwrap();
        let upload = inner
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| StoreError::not_found(format!("no such upload: {upload_id}")))?;

        let etag = format!("\"{}\"", uuid::Uuid::new_v4());
        upload.parts.insert(part_number, body);
        upload.etags.insert(part_number, etag.clone());
        Ok(etag)
    }

    async fn upload_part_copy(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: u32,
        source: &CopySource,
        range: ByteRange,
    ) -> StoreResult<String> {
        let mut inner = self.inner.write().unwrap();
        let body = Self::object_or_not_found(&inner, &source.bucket, &source.key)?;
        let slice = Self::slice_range(&body, range)?;

        let upload = inner
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| StoreError::not_found(format!("no such upload: {upload_id}")))?;

        let etag = format!("\"{}\"", uuid::Uuid::new_v4());
        upload.parts.insert(part_number, slice);
        upload.etags.insert(part_number, etag.clone());
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        let upload = inner
            .uploads
            .remove(upload_id)
            .ok_or_else(|| StoreError::not_found(format!("no such upload: {upload_id}")))?;

        if upload.bucket != bucket || upload.key != key {
            return Err(StoreError::new(
                StoreErrorKind::InvalidParameter,
                "complete does not match the upload target",
            ));
        }

        let mut assembled = Vec::new();
        for part in parts {
            let body = upload.parts.get(&part.part_number).ok_or_else(|| {
                StoreError::new(
                    StoreErrorKind::InvalidParameter,
                    format!("unknown part number {}", part.part_number),
                )
            })?;
            let etag = upload.etags.get(&part.part_number).ok_or_else(|| {
                StoreError::new(
                    StoreErrorKind::InvalidParameter,
                    format!("unknown part number {}", part.part_number),
                )
            })?;
            if etag != &part.etag {
                return Err(StoreError::new(
                    StoreErrorKind::InvalidParameter,
                    format!("etag mismatch on part {}", part.part_number),
                ));
            }
            assembled.extend_from_slice(body);
        }

        inner
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), Bytes::from(assembled));
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        inner.aborted.push(upload_id.to_string());
        inner
            .uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(format!("no such upload: {upload_id}")))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(objects) = inner.buckets.get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_head_get() {
        let store = MemoryStore::new();
        store.put_object("b", "k", Bytes::from("hello world")).await.unwrap();

        let head = store.head_object("b", "k").await.unwrap();
        assert_eq!(head.content_length, 11);
        assert!(head.version_id.is_none());

        let body = store.get_object("b", "k", None).await.unwrap();
        assert_eq!(&body[..], b"hello world");
    }

    #[tokio::test]
    async fn test_head_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.head_object("b", "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_ranged_get_is_inclusive_and_clamped() {
        let store = MemoryStore::new();
        store.insert_object("b", "k", "hello world");

        let body = store
            .get_object("b", "k", Some(ByteRange::new(0, 4)))
            .await
            .unwrap();
        assert_eq!(&body[..], b"hello");

        // overshooting end returns the available bytes
        let body = store
            .get_object("b", "k", Some(ByteRange::new(6, 100)))
            .await
            .unwrap();
        assert_eq!(&body[..], b"world");

        // start past the end is an error
        assert!(store
            .get_object("b", "k", Some(ByteRange::new(11, 12)))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_is_lexicographic_and_paginated() {
        let store = MemoryStore::with_page_size(2);
        for key in ["p/c", "p/a", "p/b", "q/z"] {
            store.insert_object("b", key, "x");
        }

        let page = store.list_objects("b", "p/", None).await.unwrap();
        let keys: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["p/a", "p/b"]);
        let token = page.next_token.clone().unwrap();

        let page = store.list_objects("b", "p/", Some(token)).await.unwrap();
        let keys: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["p/c"]);
        assert!(page.next_token.is_none());
    }

    #[tokio::test]
    async fn test_multipart_lifecycle() {
        let store = MemoryStore::new();
        let upload_id = store.create_multipart_upload("b", "k").await.unwrap();

        let etag1 = store
            .upload_part("b", "k", &upload_id, 1, Bytes::from("hello "))
            .await
            .unwrap();
        let etag2 = store
            .upload_part("b", "k", &upload_id, 2, Bytes::from("world"))
            .await
            .unwrap();

        // object is invisible until completion
        assert!(!store.contains("b", "k"));

        let parts = vec![
            CompletedPart { part_number: 1, etag: etag1 },
            CompletedPart { part_number: 2, etag: etag2 },
        ];
        store
            .complete_multipart_upload("b", "k", &upload_id, &parts)
            .await
            .unwrap();

        assert_eq!(&store.object("b", "k").unwrap()[..], b"hello world");
        assert!(store.pending_uploads().is_empty());
    }

    #[tokio::test]
    async fn test_upload_part_copy_from_source() {
        let store = MemoryStore::new();
        store.insert_object("b", "src", "0123456789");
        let upload_id = store.create_multipart_upload("b", "dst").await.unwrap();

        let source = CopySource {
            bucket: "b".into(),
            key: "src".into(),
            version_id: None,
        };
        let etag = store
            .upload_part_copy("b", "dst", &upload_id, 1, &source, ByteRange::new(2, 5))
            .await
            .unwrap();

        store
            .complete_multipart_upload(
                "b",
                "dst",
                &upload_id,
                &[CompletedPart { part_number: 1, etag }],
            )
            .await
            .unwrap();
        assert_eq!(&store.object("b", "dst").unwrap()[..], b"2345");
    }

    #[tokio::test]
    async fn test_abort_discards_upload() {
        let store = MemoryStore::new();
        let upload_id = store.create_multipart_upload("b", "k").await.unwrap();
        store
            .upload_part("b", "k", &upload_id, 1, Bytes::from("data"))
            .await
            .unwrap();

        store
            .abort_multipart_upload("b", "k", &upload_id)
            .await
            .unwrap();
        assert!(store.pending_uploads().is_empty());
        assert_eq!(store.aborted_uploads(), vec![upload_id.clone()]);
        assert!(!store.contains("b", "k"));

        // aborting twice reports the missing upload
        assert!(store
            .abort_multipart_upload("b", "k", &upload_id)
            .await
            .is_err());
    }
}
