//! Mizuchi S3fd Library
//!
//! S3 file driver: POSIX-like streams over S3-compatible object storage.
//!
//! # Features
//!
//! - **Multi-object virtual files**: a glob pattern resolves to an ordered
//!   set of sibling objects read as one logical file, with a shared header
//!   line counted only once
//! - **Random-access reads**: inclusive byte-range requests that may span
//!   several objects
//! - **Multipart writes**: buffered uploads respecting the 5 MiB / 5 GiB
//!   part bounds, with append mode bootstrapped by server-side part copies
//! - **Pluggable store**: the S3 surface is a trait; production wraps the
//!   AWS SDK, tests run against an in-memory store
//!
//! # Example
//!
//! ```no_run
//! use mizuchi_s3fd::{Config, Driver, OpenMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut driver = Driver::new(Config::from_env()?);
//!     driver.connect().await?;
//!
//!     let size = driver.file_size("s3://data/shards/part-*.csv").await?;
//!     let handle = driver.open("s3://data/shards/part-*.csv", OpenMode::Read).await?;
//!     let mut buf = vec![0u8; size as usize];
//!     driver.read(handle, &mut buf).await?;
//!     driver.close(handle).await?;
//!
//!     driver.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod resolve;
pub mod store;
pub mod stream;
pub mod uri;

// Re-export commonly used types
pub use config::Config;
pub use driver::{Driver, Handle, OpenMode};
pub use error::{DriverError, DriverResult, ErrorKind};
pub use stream::Whence;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
