//! On-disk tier: one file per entry, serialized through a single worker task
//!
//! Every disk operation is queued to one worker that owns the cache
//! directory, so operations on the tier run strictly in submission order.
//! Writes and removals return a [`Pending`] handle that resolves once the
//! worker has attempted the operation; dropping it turns the call into
//! fire-and-forget.

use crate::cache::{
    config::DiskConfig,
    entry::{CacheEntry, Expiration},
    key::file_name_for,
};
use crate::error::{CacheError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Suffix of in-flight temporary files; such files are never treated as entries
const TEMP_SUFFIX: &str = ".cache-tmp";

/// Completion signal of a queued operation, resolving to its result
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Pending<T> {
    pub(crate) fn channel() -> (oneshot::Sender<Result<T>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    pub(crate) fn ready(result: Result<T>) -> Self {
        let (tx, pending) = Self::channel();
        let _ = tx.send(result);
        pending
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(CacheError::Unknown(
                    "operation was abandoned before completing".to_string(),
                ))
            })
        })
    }
}

type Completion<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

/// Work items processed by the disk worker
enum Command<V> {
    Save {
        name: String,
        entry: CacheEntry<V>,
        done: Completion<()>,
    },
    Retrieve {
        name: String,
        reply: oneshot::Sender<Result<Option<CacheEntry<V>>>>,
    },
    Remove {
        name: String,
        done: Completion<Option<V>>,
    },
    RemoveAll {
        done: Completion<()>,
    },
    RemoveExpired {
        reply: Option<oneshot::Sender<Result<usize>>>,
    },
    Count {
        reply: oneshot::Sender<Result<usize>>,
    },
}

impl<V> Command<V> {
    /// Signal `error` through whatever completion the command carries
    fn fail(self, error: CacheError) {
        match self {
            Command::Save { done, .. } => done(Err(error)),
            Command::Retrieve { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Command::Remove { done, .. } => done(Err(error)),
            Command::RemoveAll { done } => done(Err(error)),
            Command::RemoveExpired { reply } => {
                if let Some(reply) = reply {
                    let _ = reply.send(Err(error));
                }
            }
            Command::Count { reply } => {
                let _ = reply.send(Err(error));
            }
        }
    }
}

/// Durable cache tier storing one file per key.
///
/// File names are the key's `Display` form with `/` replaced by `-`; keys whose
/// names collide after that substitution overwrite each other.
pub struct DiskStorage<K, V> {
    directory: PathBuf,
    expiration: Expiration,
    commands: mpsc::UnboundedSender<Command<V>>,
    sweeper: Option<JoinHandle<()>>,
    _key: PhantomData<fn(&K)>,
}

impl<K, V> DiskStorage<K, V>
where
    K: Display,
    V: Serialize + DeserializeOwned + Send + 'static,
{
    /// Create the disk tier, its worker and its sweeper.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: DiskConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            CacheError::Unknown(format!("disk tier requires a tokio runtime: {}", e))
        })?;

        std::fs::create_dir_all(&config.directory).map_err(|e| {
            CacheError::DiskWriteFailure(format!("{}: {}", config.directory.display(), e))
        })?;

        info!(
            directory = %config.directory.display(),
            clean_interval = ?config.clean_interval,
            "Initializing disk tier"
        );

        let (commands, queue) = mpsc::unbounded_channel();
        runtime.spawn(run_worker(config.directory.clone(), queue));

        let sweeper = if config.clean_interval.is_zero() {
            None
        } else {
            let commands = commands.clone();
            let interval = config.clean_interval;
            Some(runtime.spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                // The first tick completes immediately
                ticker.tick().await;

                loop {
                    ticker.tick().await;
                    if commands.send(Command::RemoveExpired { reply: None }).is_err() {
                        break;
                    }
                }
            }))
        };

        Ok(Self {
            directory: config.directory,
            expiration: config.expiration,
            commands,
            sweeper,
            _key: PhantomData,
        })
    }

    /// Persist a value without waiting for the write.
    ///
    /// Writes whose expiration has already passed are dropped and complete
    /// successfully without touching the disk.
    pub fn save(&self, key: &K, value: V, expiration: Option<Expiration>) -> Pending<()> {
        let (tx, pending) = Pending::channel();
        self.save_then(key, value, expiration, move |result| {
            let _ = tx.send(result);
        });
        pending
    }

    /// Persist a value and invoke `done` exactly once with the outcome
    pub(crate) fn save_then<F>(&self, key: &K, value: V, expiration: Option<Expiration>, done: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let expiration = expiration.unwrap_or(self.expiration);
        if expiration.is_expired_on_arrival() {
            debug!(?expiration, "Dropping disk write that is already expired");
            done(Ok(()));
            return;
        }

        self.save_entry_then(key, CacheEntry::new(value, expiration), done);
    }

    /// Persist an already stamped entry without checking its expiration
    pub(crate) fn save_entry_then<F>(&self, key: &K, entry: CacheEntry<V>, done: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.dispatch(Command::Save {
            name: file_name_for(key),
            entry,
            done: Box::new(done),
        });
    }

    /// Read a live value.
    ///
    /// Returns `Ok(None)` when the stored entry is expired and
    /// [`CacheError::NotFound`] when nothing is stored.
    pub async fn retrieve(&self, key: &K) -> Result<Option<V>> {
        Ok(self.retrieve_entry(key).await?.map(|entry| entry.value))
    }

    /// Read a live entry including its expiration metadata
    pub(crate) async fn retrieve_entry(&self, key: &K) -> Result<Option<CacheEntry<V>>> {
        let (reply, pending) = Pending::channel();
        self.dispatch(Command::Retrieve {
            name: file_name_for(key),
            reply,
        });
        pending.await
    }

    /// Whether [`DiskStorage::retrieve`] would return a value
    pub async fn is_cached(&self, key: &K) -> bool {
        matches!(self.retrieve(key).await, Ok(Some(_)))
    }

    /// Delete the file for `key`; a missing file counts as success
    pub fn remove(&self, key: &K) -> Pending<()> {
        let (tx, pending) = Pending::channel();
        self.remove_then(key, move |result| {
            let _ = tx.send(result.map(|_| ()));
        });
        pending
    }

    /// Delete the file for `key`, handing `done` the live value it held
    pub(crate) fn remove_then<F>(&self, key: &K, done: F)
    where
        F: FnOnce(Result<Option<V>>) + Send + 'static,
    {
        self.dispatch(Command::Remove {
            name: file_name_for(key),
            done: Box::new(done),
        });
    }

    /// Delete every entry file
    pub fn remove_all(&self) -> Pending<()> {
        let (tx, pending) = Pending::channel();
        self.remove_all_then(move |result| {
            let _ = tx.send(result);
        });
        pending
    }

    pub(crate) fn remove_all_then<F>(&self, done: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.dispatch(Command::RemoveAll {
            done: Box::new(done),
        });
    }

    /// Delete every expired entry, returning how many files were removed.
    ///
    /// Files that cannot be decoded are left in place.
    pub async fn remove_expired(&self) -> Result<usize> {
        let (reply, pending) = Pending::channel();
        self.dispatch(Command::RemoveExpired { reply: Some(reply) });
        pending.await
    }

    /// Number of persisted entry files, expired ones included
    pub async fn len(&self) -> Result<usize> {
        let (reply, pending) = Pending::channel();
        self.dispatch(Command::Count { reply });
        pending.await
    }

    /// Directory holding the entry files
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Expiration used when a write does not specify one
    pub fn default_expiration(&self) -> Expiration {
        self.expiration
    }

    fn dispatch(&self, command: Command<V>) {
        if let Err(mpsc::error::SendError(command)) = self.commands.send(command) {
            command.fail(CacheError::Unknown("disk worker has stopped".to_string()));
        }
    }
}

impl<K, V> Drop for DiskStorage<K, V> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

/// Worker loop: drains the queue until every sender is gone
async fn run_worker<V>(directory: PathBuf, mut queue: mpsc::UnboundedReceiver<Command<V>>)
where
    V: Serialize + DeserializeOwned + Send + 'static,
{
    let worker = DiskWorker { directory };

    while let Some(command) = queue.recv().await {
        worker.handle(command).await;
    }

    debug!(directory = %worker.directory.display(), "Disk worker stopped");
}

struct DiskWorker {
    directory: PathBuf,
}

impl DiskWorker {
    async fn handle<V>(&self, command: Command<V>)
    where
        V: Serialize + DeserializeOwned,
    {
        match command {
            Command::Save { name, entry, done } => {
                let result = match entry.encode() {
                    Ok(bytes) => self.write(&name, bytes).await,
                    Err(e) => Err(e),
                };
                match &result {
                    Ok(()) => debug!(file = %name, "Saved disk entry"),
                    Err(e) => warn!(file = %name, error = %e, "Disk write failed"),
                }
                done(result);
            }
            Command::Retrieve { name, reply } => {
                let _ = reply.send(self.read(&name).await);
            }
            Command::Remove { name, done } => {
                let result = self.delete(&name).await;
                if let Err(e) = &result {
                    warn!(file = %name, error = %e, "Disk remove failed");
                }
                done(result);
            }
            Command::RemoveAll { done } => {
                let result = self.delete_all().await;
                if let Err(e) = &result {
                    warn!(error = %e, "Clearing disk tier failed");
                }
                done(result);
            }
            Command::RemoveExpired { reply } => {
                let result = self.delete_expired::<V>().await;
                match &result {
                    Ok(removed) if *removed > 0 => {
                        info!(removed, "Disk sweep removed expired entries")
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Disk sweep failed"),
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Command::Count { reply } => {
                let result = self
                    .entry_files()
                    .await
                    .map(|files| files.len())
                    .map_err(|e| CacheError::Unknown(e.to_string()));
                let _ = reply.send(result);
            }
        }
    }

    /// Write through a temporary file renamed into place
    async fn write(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let write_failure = |e: std::io::Error| CacheError::DiskWriteFailure(format!("{}: {}", name, e));

        fs::create_dir_all(&self.directory)
            .await
            .map_err(write_failure)?;

        let target = self.directory.join(name);
        let temp = self
            .directory
            .join(format!(".{}.{}{}", name, Uuid::new_v4(), TEMP_SUFFIX));

        fs::write(&temp, &bytes).await.map_err(write_failure)?;
        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(write_failure(e));
        }

        Ok(())
    }

    async fn read<V: DeserializeOwned>(&self, name: &str) -> Result<Option<CacheEntry<V>>> {
        let bytes = fs::read(self.directory.join(name))
            .await
            .map_err(|e| CacheError::NotFound(format!("{}: {}", name, e)))?;
        let entry = CacheEntry::<V>::decode(&bytes)?;

        if entry.is_expired() {
            debug!(file = %name, "Disk entry expired");
            Ok(None)
        } else {
            Ok(Some(entry))
        }
    }

    async fn delete<V: DeserializeOwned>(&self, name: &str) -> Result<Option<V>> {
        let path = self.directory.join(name);

        // The previous value is informational; unreadable files still get deleted.
        let previous = match fs::read(&path).await {
            Ok(bytes) => CacheEntry::<V>::decode(&bytes)
                .ok()
                .filter(|entry| !entry.is_expired())
                .map(|entry| entry.value),
            Err(_) => None,
        };

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(file = %name, "Removed disk entry");
                Ok(previous)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::DiskRemoveFailure(format!("{}: {}", name, e))),
        }
    }

    async fn delete_all(&self) -> Result<()> {
        let files = self
            .entry_files()
            .await
            .map_err(|e| CacheError::DiskRemoveFailure(e.to_string()))?;
        let count = files.len();

        for path in files {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(CacheError::DiskRemoveFailure(format!(
                        "{}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }

        debug!(count, "Cleared disk tier");
        Ok(())
    }

    async fn delete_expired<V: DeserializeOwned>(&self) -> Result<usize> {
        let files = self
            .entry_files()
            .await
            .map_err(|e| CacheError::Unknown(e.to_string()))?;
        let mut removed = 0;

        for path in files {
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping unreadable disk entry");
                    continue;
                }
            };

            // Undecodable entries are kept: the data may still be recoverable.
            let entry = match CacheEntry::<V>::decode(&bytes) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping undecodable disk entry");
                    continue;
                }
            };

            if entry.is_expired() {
                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "Failed to remove expired disk entry")
                    }
                }
            }
        }

        Ok(removed)
    }

    /// Paths of all entry files, skipping temporaries and subdirectories
    async fn entry_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut dir = match fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let is_temp = entry.file_name().to_str().is_some_and(is_temp_file);
            if !is_temp {
                files.push(entry.path());
            }
        }

        Ok(files)
    }
}

/// Matches the `.{name}.{uuid}.cache-tmp` shape produced by `DiskWorker::write`
fn is_temp_file(file_name: &str) -> bool {
    file_name
        .strip_prefix('.')
        .and_then(|rest| rest.strip_suffix(TEMP_SUFFIX))
        .and_then(|rest| rest.rsplit_once('.'))
        .is_some_and(|(_, id)| Uuid::parse_str(id).is_ok())
}
