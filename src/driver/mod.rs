//! Driver facade.
//!
//! [`Driver`] ties the pieces together: it owns the object-store client, the
//! default bucket, the registry of live streams, and the last-error slot.
//! Hosts go through the POSIX-like surface — open/read/write/seek/close plus
//! whole-file copies — and address streams with opaque [`Handle`]s.
//!
//! Calls are serialized per driver by construction (`&mut self` receivers);
//! a handle is never usable from two tasks at once.

use crate::config::Config;
use crate::error::{DriverError, DriverResult};
use crate::logging;
use crate::resolve;
use crate::store::{AwsStore, ByteRange, CopySource, ObjectStore};
use crate::stream::{Reader, Whence, Writer};
use crate::uri;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

mod registry;

pub use registry::Handle;
use registry::Registry;

/// Driver name reported to hosts.
pub const NAME: &str = "mizuchi-s3fd";

/// URI scheme served by this driver.
pub const SCHEME: &str = "s3";

/// Buffer size suggested to hosts (4 MiB).
pub const PREFERRED_BUFFER_SIZE: u64 = 4 * 1024 * 1024;

/// Free-space constant reported for the virtual filesystem (5 TiB).
const DISK_FREE_SPACE: u64 = 5 * 1024 * 1024 * 1024 * 1024;

/// Chunk size for whole-file downloads (10 MiB).
const LOCAL_COPY_CHUNK: u64 = 10 * 1024 * 1024;

/// Mode of an [`Driver::open`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

struct State {
    store: Arc<dyn ObjectStore>,
    default_bucket: String,
    registry: Registry,
}

/// The S3 file driver.
///
/// Built from a [`Config`], connected with [`Driver::connect`] (or
/// [`Driver::connect_with_store`] to inject a custom [`ObjectStore`], e.g.
/// an in-memory one in tests). All operations fail with `NotConnected`
/// before `connect` and after `disconnect`.
pub struct Driver {
    config: Config,
    state: Option<State>,
    last_error: Option<String>,
}

impl Driver {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
            last_error: None,
        }
    }

    /// Crate version, reported to hosts.
    pub fn version() -> &'static str {
        crate::VERSION
    }

    /// This driver supports writes.
    pub fn is_read_only() -> bool {
        false
    }

    /// Message of the most recent failed operation, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_some()
    }

    /// Connect to the object store. Idempotent.
    pub async fn connect(&mut self) -> DriverResult<()> {
        if self.state.is_some() {
            debug!("driver is already connected");
            return Ok(());
        }
        logging::init(&self.config);
        let result = self.connect_inner().await;
        self.capture(result)
    }

    async fn connect_inner(&mut self) -> DriverResult<()> {
        self.config
            .validate()
            .map_err(|e| DriverError::InvalidParameter(e.to_string()))?;
        let store = AwsStore::connect(&self.config).await?;
        self.install_store(Arc::new(store));
        Ok(())
    }

    /// Connect with an externally built store.
    ///
    /// This is the seam tests and embedders use to run the driver against a
    /// [`MemoryStore`](crate::store::MemoryStore) or any other
    /// [`ObjectStore`] implementation.
    pub fn connect_with_store(&mut self, store: Arc<dyn ObjectStore>) {
        self.install_store(store);
    }

    fn install_store(&mut self, store: Arc<dyn ObjectStore>) {
        self.state = Some(State {
            store,
            default_bucket: self.config.default_bucket.clone().unwrap_or_default(),
            registry: Registry::new(),
        });
    }

    /// Tear down: abort every live writer's multipart upload, drop readers,
    /// release the client. Idempotent.
    ///
    /// Writers whose abort fails stay registered and the driver stays
    /// connected, so the host can retry the disconnect.
    pub async fn disconnect(&mut self) -> DriverResult<()> {
        let result = self.disconnect_inner().await;
        self.capture(result)
    }

    async fn disconnect_inner(&mut self) -> DriverResult<()> {
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        let store = state.store.clone();

        let mut failures = Vec::new();
        for (handle, writer) in state.registry.drain_writers() {
            match store
                .abort_multipart_upload(writer.bucket(), writer.key(), writer.upload_id())
                .await
            {
                Ok(()) => debug!(key = writer.key(), "aborted in-flight upload"),
                Err(e) => {
                    failures.push(e.to_string());
                    state.registry.restore_writer(handle, writer);
                }
            }
        }
        if !failures.is_empty() {
            return Err(DriverError::Internal(format!(
                "errors occurred during disconnection: {}",
                failures.join("; ")
            )));
        }

        state.registry.clear_readers();
        self.state = None;
        Ok(())
    }

    fn capture<T>(&mut self, result: DriverResult<T>) -> DriverResult<T> {
        if let Err(e) = &result {
            error!("{e}");
            self.last_error = Some(e.to_string());
        }
        result
    }

    fn state_mut(&mut self) -> DriverResult<&mut State> {
        self.state.as_mut().ok_or(DriverError::NotConnected)
    }

    /// True when `path` designates an existing file, or names a directory
    /// (trailing `/`; the directory notion is virtual and always exists).
    pub async fn exists(&mut self, path: &str) -> DriverResult<bool> {
        if path.ends_with('/') {
            self.dir_exists(path).await
        } else {
            self.file_exists(path).await
        }
    }

    /// Directories are virtual; any path is an existing directory.
    pub async fn dir_exists(&mut self, path: &str) -> DriverResult<bool> {
        let result = self.state_mut().map(|_| true);
        debug!(path, "dirExists");
        self.capture(result)
    }

    /// True when the literal key exists, or the glob matches at least one
    /// object.
    pub async fn file_exists(&mut self, path: &str) -> DriverResult<bool> {
        let result = self.file_exists_inner(path).await;
        self.capture(result)
    }

    async fn file_exists_inner(&mut self, path: &str) -> DriverResult<bool> {
        let state = self.state_mut()?;
        let store = state.store.clone();
        let parsed = uri::parse(path, &state.default_bucket)?;
        debug!(path, "fileExists");

        match uri::first_special(&parsed.key) {
            None => match store.head_object(&parsed.bucket, &parsed.key).await {
                Ok(_) => Ok(true),
                Err(e) if e.is_not_found() => Ok(false),
                Err(e) => Err(e.into()),
            },
            Some(pos) => {
                let matches =
                    resolve::filter_list(store.as_ref(), &parsed.bucket, &parsed.key, pos).await?;
                Ok(!matches.is_empty())
            }
        }
    }

    /// Logical size of the file at `path`: for a multi-object file this is
    /// the sum of part sizes minus the repeated-header savings.
    pub async fn file_size(&mut self, path: &str) -> DriverResult<u64> {
        let result = self.file_size_inner(path).await;
        self.capture(result)
    }

    async fn file_size_inner(&mut self, path: &str) -> DriverResult<u64> {
        let state = self.state_mut()?;
        let store = state.store.clone();
        let parsed = uri::parse(path, &state.default_bucket)?;
        debug!(path, "getFileSize");
        resolve::file_size(store.as_ref(), &parsed.bucket, &parsed.key).await
    }

    /// Open a stream on `path` and register it.
    ///
    /// `Append` resolves its concrete target first: a glob selects the last
    /// matching object in list order; a missing target falls back to plain
    /// write mode. The existing content is seeded into the new upload with
    /// server-side copies and a buffered tail.
    pub async fn open(&mut self, path: &str, mode: OpenMode) -> DriverResult<Handle> {
        let result = self.open_inner(path, mode).await;
        self.capture(result)
    }

    async fn open_inner(&mut self, path: &str, mode: OpenMode) -> DriverResult<Handle> {
        let state = self.state_mut()?;
        let store = state.store.clone();
        let parsed = uri::parse(path, &state.default_bucket)?;
        debug!(path, ?mode, "fopen");

        match mode {
            OpenMode::Read => {
                let file = resolve::resolve(store.as_ref(), &parsed.bucket, &parsed.key).await?;
                Ok(state.registry.insert_reader(Reader::new(file)))
            }
            OpenMode::Write => {
                let writer = Writer::create(store.as_ref(), parsed.bucket, parsed.key).await?;
                Ok(state.registry.insert_writer(writer))
            }
            OpenMode::Append => {
                let target = match uri::first_special(&parsed.key) {
                    Some(pos) => {
                        let matches =
                            resolve::filter_list(store.as_ref(), &parsed.bucket, &parsed.key, pos)
                                .await?;
                        match matches.last() {
                            Some(last) => last.key.clone(),
                            None => {
                                debug!("no match for the file pattern");
                                parsed.key.clone()
                            }
                        }
                    }
                    None => parsed.key.clone(),
                };

                let head = match store.head_object(&parsed.bucket, &target).await {
                    Ok(head) => head,
                    Err(e) if e.is_not_found() => {
                        // nothing to append to, plain write on the target
                        debug!("no source object to append to, falling back to write");
                        let writer =
                            Writer::create(store.as_ref(), parsed.bucket, target).await?;
                        return Ok(state.registry.insert_writer(writer));
                    }
                    Err(e) => return Err(e.into()),
                };

                let writer =
                    Writer::create(store.as_ref(), parsed.bucket.clone(), target.clone()).await?;
                let handle = state.registry.insert_writer(writer);

                // registered before seeding: a failed bootstrap leaves the
                // upload reachable for the disconnect-time abort
                let source = CopySource {
                    bucket: parsed.bucket,
                    key: target,
                    version_id: head.version_id,
                };
                let Some(writer) = state.registry.writer_mut(handle) else {
                    return Err(DriverError::Internal("writer vanished after insert".into()));
                };
                writer
                    .bootstrap_append(store.as_ref(), source, head.content_length)
                    .await?;
                Ok(handle)
            }
        }
    }

    /// Close a stream. For writers this uploads the residual buffer as the
    /// final part and completes the multipart upload; on failure the writer
    /// stays registered so disconnect can abort it.
    pub async fn close(&mut self, handle: Handle) -> DriverResult<()> {
        let result = self.close_inner(handle).await;
        self.capture(result)
    }

    async fn close_inner(&mut self, handle: Handle) -> DriverResult<()> {
        let state = self.state_mut()?;
        debug!(%handle, "fclose");
        if state.registry.remove_reader(handle).is_some() {
            return Ok(());
        }

        let store = state.store.clone();
        let Some(writer) = state.registry.writer_mut(handle) else {
            return Err(DriverError::InvalidParameter(format!(
                "cannot identify stream {handle}"
            )));
        };
        writer.close(store.as_ref()).await?;
        state.registry.remove_writer(handle);
        Ok(())
    }

    /// Reposition a read stream.
    pub async fn seek(&mut self, handle: Handle, offset: i64, whence: Whence) -> DriverResult<u64> {
        let result = self.seek_inner(handle, offset, whence);
        self.capture(result)
    }

    fn seek_inner(&mut self, handle: Handle, offset: i64, whence: Whence) -> DriverResult<u64> {
        let state = self.state_mut()?;
        debug!(%handle, offset, ?whence, "fseek");
        let Some(reader) = state.registry.reader_mut(handle) else {
            return Err(DriverError::InvalidParameter(format!(
                "cannot identify stream {handle}"
            )));
        };
        reader.seek(offset, whence)
    }

    /// Read up to `dst.len()` bytes from a read stream; 0 means end of
    /// file.
    pub async fn read(&mut self, handle: Handle, dst: &mut [u8]) -> DriverResult<usize> {
        let result = self.read_inner(handle, dst).await;
        self.capture(result)
    }

    async fn read_inner(&mut self, handle: Handle, dst: &mut [u8]) -> DriverResult<usize> {
        let state = self.state_mut()?;
        debug!(%handle, requested = dst.len(), "fread");
        let store = state.store.clone();
        let Some(reader) = state.registry.reader_mut(handle) else {
            return Err(DriverError::InvalidParameter(format!(
                "cannot identify stream {handle}"
            )));
        };
        reader.read(store.as_ref(), dst).await
    }

    /// Write all of `src` into a write stream.
    pub async fn write(&mut self, handle: Handle, src: &[u8]) -> DriverResult<usize> {
        let result = self.write_inner(handle, src).await;
        self.capture(result)
    }

    async fn write_inner(&mut self, handle: Handle, src: &[u8]) -> DriverResult<usize> {
        let state = self.state_mut()?;
        debug!(%handle, bytes = src.len(), "fwrite");
        let store = state.store.clone();
        let Some(writer) = state.registry.writer_mut(handle) else {
            return Err(DriverError::InvalidParameter(format!(
                "cannot identify stream {handle}"
            )));
        };
        writer.write(store.as_ref(), src).await
    }

    /// No-op; buffered data cannot be forced into a part early.
    pub async fn flush(&mut self, _handle: Handle) -> DriverResult<()> {
        let result = self.state_mut().map(|_| ());
        debug!("fflush (does nothing)");
        self.capture(result)
    }

    /// Delete the object at `path` (literal key).
    pub async fn remove(&mut self, path: &str) -> DriverResult<()> {
        let result = self.remove_inner(path).await;
        self.capture(result)
    }

    async fn remove_inner(&mut self, path: &str) -> DriverResult<()> {
        let state = self.state_mut()?;
        let store = state.store.clone();
        let parsed = uri::parse(path, &state.default_bucket)?;
        debug!(path, "remove");
        store.delete_object(&parsed.bucket, &parsed.key).await?;
        Ok(())
    }

    /// Directories are virtual; creation is a no-op.
    pub async fn mkdir(&mut self, path: &str) -> DriverResult<()> {
        let result = self.state_mut().map(|_| ());
        debug!(path, "mkdir (does nothing)");
        self.capture(result)
    }

    /// Directories are virtual; removal is a no-op.
    pub async fn rmdir(&mut self, path: &str) -> DriverResult<()> {
        let result = self.state_mut().map(|_| ());
        debug!(path, "rmdir (does nothing)");
        self.capture(result)
    }

    /// Fixed free-space figure for the virtual filesystem.
    pub fn disk_free_space(&self, path: &str) -> u64 {
        debug!(path, "diskFreeSpace");
        DISK_FREE_SPACE
    }

    /// Buffer size the host should prefer for streaming.
    pub fn preferred_buffer_size(&self) -> u64 {
        PREFERRED_BUFFER_SIZE
    }

    /// Download the whole (possibly multi-object) remote file into a local
    /// file, part by part in bounded chunks. Any failure removes the
    /// partial local file.
    pub async fn copy_to_local(
        &mut self,
        remote: &str,
        local: impl AsRef<Path>,
    ) -> DriverResult<()> {
        let result = self.copy_to_local_inner(remote, local.as_ref()).await;
        self.capture(result)
    }

    async fn copy_to_local_inner(&mut self, remote: &str, local: &Path) -> DriverResult<()> {
        let state = self.state_mut()?;
        let store = state.store.clone();
        let parsed = uri::parse(remote, &state.default_bucket)?;
        debug!(remote, local = %local.display(), "copyToLocal");

        let file = resolve::resolve(store.as_ref(), &parsed.bucket, &parsed.key).await?;

        let result = Self::download_parts(store.as_ref(), &file, local).await;
        if result.is_err() {
            debug!("removing partial local file");
            let _ = tokio::fs::remove_file(local).await;
        }
        result
    }

    async fn download_parts(
        store: &dyn ObjectStore,
        file: &resolve::VirtualFile,
        local: &Path,
    ) -> DriverResult<()> {
        let mut output = tokio::fs::File::create(local).await?;

        for (index, part) in file.parts.iter().enumerate() {
            let mut start = if index == 0 {
                0
            } else {
                file.common_header_length
            };
            if start >= part.size {
                continue;
            }
            let end_limit = part.size - 1;

            while start <= end_limit {
                let end = (start + LOCAL_COPY_CHUNK - 1).min(end_limit);
                let chunk = store
                    .get_object(&file.bucket, &part.key, Some(ByteRange::new(start, end)))
                    .await?;
                if chunk.is_empty() {
                    return Err(DriverError::Internal(format!(
                        "empty range response for {}",
                        part.key
                    )));
                }
                output.write_all(&chunk).await?;
                start += chunk.len() as u64;
            }
        }

        output.flush().await?;
        Ok(())
    }

    /// Upload a local file as one object (single PutObject; no multipart
    /// fallback for large files).
    pub async fn copy_from_local(
        &mut self,
        local: impl AsRef<Path>,
        remote: &str,
    ) -> DriverResult<()> {
        let result = self.copy_from_local_inner(local.as_ref(), remote).await;
        self.capture(result)
    }

    async fn copy_from_local_inner(&mut self, local: &Path, remote: &str) -> DriverResult<()> {
        let state = self.state_mut()?;
        let store = state.store.clone();
        let parsed = uri::parse(remote, &state.default_bucket)?;
        debug!(local = %local.display(), remote, "copyFromLocal");

        let body = tokio::fs::read(local).await?;
        store
            .put_object(&parsed.bucket, &parsed.key, Bytes::from(body))
            .await?;
        Ok(())
    }
}
