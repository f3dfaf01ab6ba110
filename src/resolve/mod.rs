//! Multi-part file resolution.
//!
//! A logical file name is either a literal key or a glob pattern matching a
//! set of sibling objects. Resolution turns either into a [`VirtualFile`]:
//! the ordered part list, the cumulative effective-size index, and the
//! length of the header shared by every part (zero when there is none).
//!
//! The shared-header rule exists for sharded data sets where every shard
//! re-emits a CSV-style header line: when all parts start with the same
//! first line, that line counts only once toward the logical file, and
//! reads skip it on every part after the first. A single disagreeing
//! header collapses the behavior to plain concatenation.

use crate::error::{DriverError, DriverResult};
use crate::store::{ByteRange, ObjectStore, ObjectSummary};
use crate::uri;
use tracing::debug;

/// Chunk size for the first-line probe.
const HEADER_PROBE_CHUNK: u64 = 4096;

/// One object contributing to a virtual file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub key: String,
    pub size: u64,
}

/// A resolved virtual file.
#[derive(Debug, Clone)]
pub struct VirtualFile {
    pub bucket: String,
    pub pattern: String,
    /// Non-empty; order preserved from the list response.
    pub parts: Vec<Part>,
    /// `cumulative_sizes[i]` sums the effective sizes of parts `0..=i`,
    /// where every part after the first counts `size - common_header_length`.
    pub cumulative_sizes: Vec<u64>,
    pub common_header_length: u64,
}

impl VirtualFile {
    /// Logical size of the virtual file.
    pub fn total_size(&self) -> u64 {
        *self.cumulative_sizes.last().unwrap_or(&0)
    }
}

/// List every object matching `pattern` (a glob), preserving store order.
pub async fn filter_list(
    store: &dyn ObjectStore,
    bucket: &str,
    pattern: &str,
    first_special: usize,
) -> DriverResult<Vec<ObjectSummary>> {
    let matcher = uri::matcher(pattern)?;
    let prefix = &pattern[..first_special];

    let mut matches = Vec::new();
    let mut token = None;
    loop {
        let page = store.list_objects(bucket, prefix, token).await?;
        matches.extend(
            page.objects
                .into_iter()
                .filter(|obj| matcher.is_match(&obj.key)),
        );
        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    Ok(matches)
}

/// Read the first line of an object, up to and including `\n`.
///
/// When the object ends before a newline the whole body is the line. An
/// empty part has no first line to compare; resolution fails outright,
/// whichever part it is, rather than collapsing the shared header to
/// length zero.
async fn read_header(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    size: u64,
) -> DriverResult<Vec<u8>> {
    let mut line = Vec::new();
    let mut start = 0u64;
    while start < size {
        let end = (start + HEADER_PROBE_CHUNK).min(size) - 1;
        let chunk = store
            .get_object(bucket, key, Some(ByteRange::new(start, end)))
            .await?;
        if let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
            line.extend_from_slice(&chunk[..=pos]);
            break;
        }
        line.extend_from_slice(&chunk);
        start = end + 1;
    }

    if line.is_empty() {
        return Err(DriverError::Internal(format!("empty header in {key}")));
    }
    Ok(line)
}

/// Resolve `key_or_pattern` into a [`VirtualFile`].
///
/// Literal keys resolve through HeadObject; globs through a filtered,
/// paginated listing. An empty match set is `NotFound`.
pub async fn resolve(
    store: &dyn ObjectStore,
    bucket: &str,
    key_or_pattern: &str,
) -> DriverResult<VirtualFile> {
    let Some(first_special) = uri::first_special(key_or_pattern) else {
        let head = store.head_object(bucket, key_or_pattern).await?;
        return Ok(VirtualFile {
            bucket: bucket.to_string(),
            pattern: key_or_pattern.to_string(),
            parts: vec![Part {
                key: key_or_pattern.to_string(),
                size: head.content_length,
            }],
            cumulative_sizes: vec![head.content_length],
            common_header_length: 0,
        });
    };

    let matches = filter_list(store, bucket, key_or_pattern, first_special).await?;
    if matches.is_empty() {
        return Err(DriverError::Store(crate::store::StoreError::not_found(
            format!("no match for the file pattern: {key_or_pattern}"),
        )));
    }

    debug!(pattern = key_or_pattern, parts = matches.len(), "resolved pattern");

    let parts: Vec<Part> = matches
        .into_iter()
        .map(|obj| Part {
            key: obj.key,
            size: obj.size,
        })
        .collect();

    let mut common_header_length = 0u64;
    if parts.len() > 1 {
        let header = read_header(store, bucket, &parts[0].key, parts[0].size).await?;
        let mut same_header = true;
        for part in &parts[1..] {
            let current = read_header(store, bucket, &part.key, part.size).await?;
            if current != header {
                same_header = false;
                break;
            }
        }
        if same_header {
            common_header_length = header.len() as u64;
        }
    }

    let mut cumulative_sizes = Vec::with_capacity(parts.len());
    let mut running = 0u64;
    for (i, part) in parts.iter().enumerate() {
        let effective = if i == 0 {
            part.size
        } else {
            part.size - common_header_length
        };
        running += effective;
        cumulative_sizes.push(running);
    }

    Ok(VirtualFile {
        bucket: bucket.to_string(),
        pattern: key_or_pattern.to_string(),
        parts,
        cumulative_sizes,
        common_header_length,
    })
}

/// Logical size of the file designated by `key_or_pattern`.
pub async fn file_size(
    store: &dyn ObjectStore,
    bucket: &str,
    key_or_pattern: &str,
) -> DriverResult<u64> {
    Ok(resolve(store, bucket, key_or_pattern).await?.total_size())
}
