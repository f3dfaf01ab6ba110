//! Multipart-upload write stream.
//!
//! A writer owns one in-flight multipart upload. Written bytes accumulate
//! in an internal buffer; whenever the buffer reaches the minimum part size
//! it is shipped as one part. The final part, uploaded at close, is exempt
//! from the minimum. Objects are immutable, so append mode bootstraps a new
//! upload from the existing object: large ranges through server-side part
//! copies, the remaining tail downloaded into the buffer.

use super::{MAX_PART_SIZE, MIN_PART_SIZE};
use crate::error::DriverResult;
use crate::store::{ByteRange, CompletedPart, CopySource, ObjectStore};
use bytes::Bytes;
use tracing::debug;

/// A write stream feeding a multipart upload.
#[derive(Debug)]
pub struct Writer {
    bucket: String,
    key: String,
    upload_id: String,
    parts: Vec<CompletedPart>,
    next_part_number: u32,
    buffer: Vec<u8>,
    append_source: Option<CopySource>,
}

impl Writer {
    /// Start a new multipart upload on `bucket`/`key`.
    pub async fn create(store: &dyn ObjectStore, bucket: String, key: String) -> DriverResult<Self> {
        let upload_id = store.create_multipart_upload(&bucket, &key).await?;
        debug!(bucket = %bucket, key = %key, upload_id = %upload_id, "multipart upload created");
        Ok(Self {
            bucket,
            key,
            upload_id,
            parts: Vec::new(),
            next_part_number: 1,
            buffer: Vec::new(),
            append_source: None,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn completed_parts(&self) -> &[CompletedPart] {
        &self.parts
    }

    pub fn append_source(&self) -> Option<&CopySource> {
        self.append_source.as_ref()
    }

    /// Bytes accepted but not yet shipped as a part.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Seed this upload with the contents of an existing object of `source_len`
    /// bytes, preparing an append.
    ///
    /// Ranges larger than the minimum part size are copied server side, up
    /// to the maximum part size each. The remaining tail is downloaded into
    /// the buffer, where subsequent writes extend it.
    pub async fn bootstrap_append(
        &mut self,
        store: &dyn ObjectStore,
        source: CopySource,
        source_len: u64,
    ) -> DriverResult<()> {
        self.append_source = Some(source.clone());

        let mut remaining = source_len;
        let mut start = 0u64;
        while remaining > MIN_PART_SIZE as u64 {
            let chunk = remaining.min(MAX_PART_SIZE as u64);
            let range = ByteRange::new(start, start + chunk - 1);
            let etag = store
                .upload_part_copy(
                    &self.bucket,
                    &self.key,
                    &self.upload_id,
                    self.next_part_number,
                    &source,
                    range,
                )
                .await?;
            self.push_part(etag);
            start += chunk;
            remaining -= chunk;
        }

        if remaining > 0 {
            let range = ByteRange::new(start, start + remaining - 1);
            let tail = store
                .get_object(&source.bucket, &source.key, Some(range))
                .await?;
            debug!(copied = tail.len(), "append tail buffered");
            self.buffer.extend_from_slice(&tail);
        }
        Ok(())
    }

    fn push_part(&mut self, etag: String) {
        self.parts.push(CompletedPart {
            part_number: self.next_part_number,
            etag,
        });
        self.next_part_number += 1;
    }

    /// Upload the whole buffer as the next part and clear it.
    ///
    /// On failure the buffered bytes stay in place so the caller can retry.
    async fn flush_part(&mut self, store: &dyn ObjectStore) -> DriverResult<()> {
        let body = Bytes::from(std::mem::take(&mut self.buffer));
        match store
            .upload_part(
                &self.bucket,
                &self.key,
                &self.upload_id,
                self.next_part_number,
                body.clone(),
            )
            .await
        {
            Ok(etag) => {
                debug!(part = self.next_part_number, bytes = body.len(), "part uploaded");
                self.push_part(etag);
                Ok(())
            }
            Err(e) => {
                self.buffer = Vec::from(body);
                Err(e.into())
            }
        }
    }

    /// Accept `src` into the stream; every byte is either buffered or
    /// already shipped when this returns.
    pub async fn write(&mut self, store: &dyn ObjectStore, mut src: &[u8]) -> DriverResult<usize> {
        let accepted = src.len();
        while !src.is_empty() {
            let room = MAX_PART_SIZE - self.buffer.len();
            let take = room.min(src.len());
            self.buffer.extend_from_slice(&src[..take]);
            src = &src[take..];

            while self.buffer.len() >= MIN_PART_SIZE {
                self.flush_part(store).await?;
            }
        }
        Ok(accepted)
    }

    /// Upload the residual buffer as the final part (exempt from the size
    /// minimum) and complete the upload.
    ///
    /// On failure the writer state is preserved; the upload can still be
    /// completed by a retry or aborted at disconnect.
    pub async fn close(&mut self, store: &dyn ObjectStore) -> DriverResult<()> {
        self.flush_part(store).await?;
        store
            .complete_multipart_upload(&self.bucket, &self.key, &self.upload_id, &self.parts)
            .await?;
        debug!(key = %self.key, parts = self.parts.len(), "multipart upload completed");
        Ok(())
    }
}
