//! URI parsing and glob handling.
//!
//! Logical file names are `s3://bucket/key` URIs. The key component may be a
//! gitignore-style glob pattern; such a pattern designates a virtual file
//! made of every matching object.

use crate::error::{DriverError, DriverResult};
use globset::{GlobBuilder, GlobMatcher};

const URI_PREFIX: &str = "s3://";

/// Characters that make a key a glob pattern, unless backslash-escaped.
const GLOB_SPECIALS: &[char] = &['*', '?', '!', '[', '^'];

/// A parsed `s3://bucket/key` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUri {
    pub bucket: String,
    pub key: String,
}

/// Parse an `s3://` URI, substituting `default_bucket` when the bucket
/// component is empty.
pub fn parse(uri: &str, default_bucket: &str) -> DriverResult<ObjectUri> {
    let rest = uri
        .strip_prefix(URI_PREFIX)
        .ok_or_else(|| DriverError::InvalidUri(uri.to_string()))?;

    let slash = rest
        .find('/')
        .ok_or_else(|| DriverError::InvalidUri(format!("missing object name: {uri}")))?;

    let mut bucket = &rest[..slash];
    if bucket.is_empty() {
        if default_bucket.is_empty() {
            return Err(DriverError::MissingBucket);
        }
        bucket = default_bucket;
    }

    Ok(ObjectUri {
        bucket: bucket.to_string(),
        key: rest[slash + 1..].to_string(),
    })
}

/// Position of the first unescaped glob special in `pattern`, or `None`
/// for a literal key.
///
/// A backslash immediately before a special neutralizes it.
pub fn first_special(pattern: &str) -> Option<usize> {
    let bytes = pattern.as_bytes();
    let mut from = 0;
    while let Some(found) = pattern[from..]
        .find(GLOB_SPECIALS)
        .map(|rel| from + rel)
    {
        if found > 0 && bytes[found - 1] == b'\\' {
            from = found + 1;
        } else {
            return Some(found);
        }
    }
    None
}

/// Compile a gitignore-style matcher for `pattern`.
///
/// `*` and `?` stay within a path segment, `**` crosses segments, and
/// character classes and backslash escapes are honored. Matching is
/// case-sensitive and covers the whole key.
pub fn matcher(pattern: &str) -> DriverResult<GlobMatcher> {
    // globset spells class negation with `!`
    let normalized = pattern.replace("[^", "[!");
    let glob = GlobBuilder::new(&normalized)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map_err(|e| DriverError::InvalidParameter(format!("bad glob pattern: {e}")))?;
    Ok(glob.compile_matcher())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        let cases = [
            ("bucket", "data/file.txt"),
            ("b", "k"),
            ("my-bucket", "dir/sub/part-*.csv"),
        ];
        for (bucket, key) in cases {
            let parsed = parse(&format!("s3://{bucket}/{key}"), "").unwrap();
            assert_eq!(parsed.bucket, bucket);
            assert_eq!(parsed.key, key);
        }
    }

    #[test]
    fn test_parse_default_bucket_fallback() {
        let parsed = parse("s3:///data/file.txt", "fallback").unwrap();
        assert_eq!(parsed.bucket, "fallback");
        assert_eq!(parsed.key, "data/file.txt");

        let err = parse("s3:///data/file.txt", "").unwrap_err();
        assert!(matches!(err, DriverError::MissingBucket));
    }

    #[test]
    fn test_parse_rejects_bad_uris() {
        assert!(matches!(
            parse("http://bucket/key", ""),
            Err(DriverError::InvalidUri(_))
        ));
        assert!(matches!(
            parse("s3://bucket-without-key", ""),
            Err(DriverError::InvalidUri(_))
        ));
    }

    #[test]
    fn test_first_special_detection() {
        assert_eq!(first_special("plain/key.txt"), None);
        assert_eq!(first_special("data/part-*.csv"), Some(10));
        assert_eq!(first_special("a?b"), Some(1));
        assert_eq!(first_special("set[0-9]"), Some(3));
        assert_eq!(first_special("bang!"), Some(4));
    }

    #[test]
    fn test_first_special_respects_escapes() {
        // escaped specials are literal
        assert_eq!(first_special(r"literal\*star"), None);
        // the first unescaped special wins even after escaped ones
        assert_eq!(first_special(r"a\*b*c"), Some(4));
        assert_eq!(first_special(r"\?\[\!"), None);
    }

    #[test]
    fn test_match_within_segment() {
        let m = matcher("data/part-*").unwrap();
        assert!(m.is_match("data/part-0"));
        assert!(m.is_match("data/part-00017"));
        assert!(!m.is_match("data/part-0/nested"));
        assert!(!m.is_match("other/part-0"));
    }

    #[test]
    fn test_match_across_segments() {
        let m = matcher("data/**/part-?").unwrap();
        assert!(m.is_match("data/2024/01/part-3"));
        assert!(!m.is_match("data/2024/01/part-33"));
    }

    #[test]
    fn test_match_char_classes() {
        let m = matcher("shard[0-3].bin").unwrap();
        assert!(m.is_match("shard2.bin"));
        assert!(!m.is_match("shard7.bin"));

        let negated = matcher("shard[^0-3].bin").unwrap();
        assert!(negated.is_match("shard7.bin"));
        assert!(!negated.is_match("shard1.bin"));
    }

    #[test]
    fn test_match_is_anchored_and_case_sensitive() {
        let m = matcher("part-*").unwrap();
        assert!(!m.is_match("prefix/part-0"));
        let m = matcher("Data*").unwrap();
        assert!(!m.is_match("data0"));
    }
}
