//! Random-access reader over a multi-part virtual file.

use super::Whence;
use crate::error::{DriverError, DriverResult};
use crate::resolve::VirtualFile;
use crate::store::{ByteRange, ObjectStore};
use tracing::debug;

/// A read stream over a resolved [`VirtualFile`].
///
/// The reader holds a logical byte cursor into the concatenation of all
/// parts, with the shared header counted once. Reads translate into one or
/// more inclusive ranged GETs; a short range response is end of file.
#[derive(Debug)]
pub struct Reader {
    file: VirtualFile,
    offset: u64,
}

impl Reader {
    pub fn new(file: VirtualFile) -> Self {
        Self { file, offset: 0 }
    }

    pub fn total_size(&self) -> u64 {
        self.file.total_size()
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn file(&self) -> &VirtualFile {
        &self.file
    }

    /// Move the cursor. Seeking past the end is allowed; the next read
    /// returns 0. Negative results and overflowing arithmetic are rejected.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> DriverResult<u64> {
        let total = self.total_size() as i64;
        let computed = match whence {
            Whence::Begin => offset,
            Whence::Current => (self.offset as i64)
                .checked_add(offset)
                .ok_or(DriverError::Overflow)?,
            Whence::End => {
                if total > 0 {
                    (total - 1).checked_add(offset).ok_or(DriverError::Overflow)?
                } else {
                    offset
                }
            }
        };

        if computed < 0 {
            return Err(DriverError::InvalidParameter(format!(
                "invalid seek offset {computed}"
            )));
        }
        self.offset = computed as u64;
        Ok(self.offset)
    }

    /// Fill `dst` from the current cursor, advancing it by the bytes read.
    ///
    /// Returns 0 at end of file. Requests reaching past the end are
    /// truncated. On a store error the cursor keeps its pre-call value.
    pub async fn read(&mut self, store: &dyn ObjectStore, dst: &mut [u8]) -> DriverResult<usize> {
        if dst.is_empty() {
            return Ok(0);
        }

        let total = self.total_size();
        if self.offset >= total {
            return Ok(0);
        }

        let mut to_read = (dst.len() as u64).min(total - self.offset);
        let offset_bak = self.offset;

        let cumulative = &self.file.cumulative_sizes;
        let header = self.file.common_header_length;

        // smallest part whose cumulative size exceeds the cursor
        let mut idx = cumulative.partition_point(|&c| c <= self.offset);
        debug!(part = idx, offset = self.offset, "read starts");

        // position within that part, header included
        let mut start = if idx == 0 {
            self.offset
        } else {
            self.offset - cumulative[idx - 1] + header
        };

        let mut filled = 0usize;
        loop {
            let part_remaining = cumulative[idx] - self.offset;
            if part_remaining == 0 {
                // zero-effective-size part, nothing to fetch here
                idx += 1;
                start = header;
                continue;
            }
            let end = (start + to_read).min(start + part_remaining) - 1;
            let expected = end - start + 1;

            let chunk = match store
                .get_object(&self.file.bucket, &self.file.parts[idx].key, Some(ByteRange::new(start, end)))
                .await
            {
                Ok(chunk) => chunk,
                Err(e) => {
                    self.offset = offset_bak;
                    return Err(DriverError::Internal(format!(
                        "error while reading from file: {e}"
                    )));
                }
            };

            let actual = chunk.len() as u64;
            dst[filled..filled + chunk.len()].copy_from_slice(&chunk);
            filled += chunk.len();
            self.offset += actual;

            if actual < expected {
                debug!("end of file encountered");
                break;
            }
            to_read -= actual;
            if to_read == 0 {
                break;
            }

            idx += 1;
            start = header;
        }

        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve;
    use crate::store::MemoryStore;

    async fn reader_for(store: &MemoryStore, pattern: &str) -> Reader {
        Reader::new(resolve::resolve(store, "b", pattern).await.unwrap())
    }

    fn sharded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_object("b", "shard0", "id,v\nAAAA\n");
        store.insert_object("b", "shard1", "id,v\nBBBBBB\n");
        store.insert_object("b", "shard2", "id,v\nCC\n");
        store
    }

    #[tokio::test]
    async fn test_read_whole_file_skips_repeated_headers() {
        let store = sharded_store();
        let mut reader = reader_for(&store, "shard?").await;

        let mut buf = vec![0u8; 64];
        let n = reader.read(&store, &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"id,v\nAAAA\nBBBBBB\nCC\n");
        assert_eq!(reader.offset(), reader.total_size());

        // at EOF, reads return 0
        let n = reader.read(&store, &mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_read_spanning_parts_from_offset() {
        let store = sharded_store();
        let mut reader = reader_for(&store, "shard?").await;

        // start inside part 0's body, stop inside part 1
        reader.seek(7, Whence::Begin).unwrap();
        let mut buf = vec![0u8; 6];
        let n = reader.read(&store, &mut buf).await.unwrap();
        assert_eq!(n, 6);
        assert_eq!(&buf[..n], b"AA\nBBB");
        assert_eq!(reader.offset(), 13);
    }

    #[tokio::test]
    async fn test_one_read_equals_many_single_byte_reads() {
        let store = sharded_store();
        let mut reader = reader_for(&store, "shard?").await;

        let mut all = vec![0u8; reader.total_size() as usize];
        reader.read(&store, &mut all).await.unwrap();

        let mut reader = reader_for(&store, "shard?").await;
        let mut byte_by_byte = Vec::new();
        let mut one = [0u8; 1];
        loop {
            let n = reader.read(&store, &mut one).await.unwrap();
            if n == 0 {
                break;
            }
            byte_by_byte.push(one[0]);
        }
        assert_eq!(all, byte_by_byte);
    }

    #[tokio::test]
    async fn test_seek_then_read_is_independent_of_history() {
        let store = sharded_store();
        let mut reader = reader_for(&store, "shard?").await;

        let mut first = vec![0u8; 5];
        reader.seek(8, Whence::Begin).unwrap();
        reader.read(&store, &mut first).await.unwrap();

        // wander around, then come back
        reader.seek(0, Whence::Begin).unwrap();
        let mut scratch = vec![0u8; 3];
        reader.read(&store, &mut scratch).await.unwrap();
        reader.seek(8, Whence::Begin).unwrap();

        let mut second = vec![0u8; 5];
        reader.read(&store, &mut second).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_read_truncates_at_end() {
        let store = MemoryStore::new();
        store.insert_object("b", "small", "12345678");
        let mut reader = reader_for(&store, "small").await;

        reader.seek(5, Whence::Begin).unwrap();
        let mut buf = vec![0u8; 32];
        let n = reader.read(&store, &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"678");
    }

    #[tokio::test]
    async fn test_seek_past_end_reads_zero() {
        let store = MemoryStore::new();
        store.insert_object("b", "small", "12345678");
        let mut reader = reader_for(&store, "small").await;

        reader.seek(100, Whence::Begin).unwrap();
        let mut buf = vec![0u8; 10];
        assert_eq!(reader.read(&store, &mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_seek_whence_variants() {
        let store = MemoryStore::new();
        store.insert_object("b", "small", "12345678");
        let mut reader = reader_for(&store, "small").await;

        assert_eq!(reader.seek(3, Whence::Begin).unwrap(), 3);
        assert_eq!(reader.seek(2, Whence::Current).unwrap(), 5);
        assert_eq!(reader.seek(-5, Whence::Current).unwrap(), 0);
        // End is relative to the last byte
        assert_eq!(reader.seek(0, Whence::End).unwrap(), 7);
        assert_eq!(reader.seek(-7, Whence::End).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_seek_rejects_negative_and_overflow() {
        let store = MemoryStore::new();
        store.insert_object("b", "small", "12345678");
        let mut reader = reader_for(&store, "small").await;

        assert!(reader.seek(-1, Whence::Begin).is_err());
        assert!(reader.seek(-9, Whence::End).is_err());

        reader.seek(10, Whence::Begin).unwrap();
        assert!(matches!(
            reader.seek(i64::MAX, Whence::Current),
            Err(DriverError::Overflow)
        ));
        assert!(matches!(
            reader.seek(i64::MAX, Whence::End),
            Err(DriverError::Overflow)
        ));
    }

    #[tokio::test]
    async fn test_seek_end_on_empty_file() {
        let store = MemoryStore::new();
        store.insert_object("b", "empty", "");
        let mut reader = reader_for(&store, "empty").await;

        assert_eq!(reader.seek(4, Whence::End).unwrap(), 4);
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&store, &mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_read_restores_offset() {
        let store = sharded_store();
        let mut reader = reader_for(&store, "shard?").await;
        reader.seek(2, Whence::Begin).unwrap();

        // the second part disappears between resolution and read
        store.delete_object("b", "shard1").await.unwrap();

        let mut buf = vec![0u8; 32];
        assert!(reader.read(&store, &mut buf).await.is_err());
        assert_eq!(reader.offset(), 2);
    }
}
