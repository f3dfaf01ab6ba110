//! Reader and writer streams over resolved virtual files.

pub mod reader;
pub mod writer;

pub use reader::Reader;
pub use writer::Writer;

/// Minimum multipart part size (5 MiB) - S3 requirement for every part
/// except the last.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Maximum multipart part size (5 GiB).
pub const MAX_PART_SIZE: usize = 5 * 1024 * 1024 * 1024;

/// Origin of a seek operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// From the start of the file.
    Begin,
    /// Relative to the current cursor.
    Current,
    /// Relative to the last byte of the file.
    End,
}
