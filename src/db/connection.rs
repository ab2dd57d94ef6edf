//! The relay's SQLite store.
//!
//! Token registrations and the delivery log both live in one file. rusqlite
//! connections are not `Sync`, so a single `sos-relay-db` thread owns the
//! connection and request handlers hand it jobs over a channel.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::{run_migrations, CURRENT_SCHEMA_VERSION};

const WORKER_NAME: &str = "sos-relay-db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Opens the store file and brings its schema up to date.
fn open_store(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open relay store {}", path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    // Delivery logging writes on every send; WAL keeps token lookups unblocked.
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("Relay store stays in rollback journal mode: {err}");
    }
    run_migrations(&mut conn).context("failed to migrate relay store")?;
    Ok(conn)
}

/// Owns the store thread. Dropping the job sender ends its loop.
struct StoreWorker {
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl StoreWorker {
    fn spawn(path: PathBuf) -> Result<Self> {
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let (opened_tx, opened_rx) = mpsc::sync_channel::<Result<()>>(1);

        let thread = thread::Builder::new()
            .name(WORKER_NAME.into())
            .spawn(move || {
                let mut conn = match open_store(&path) {
                    Ok(conn) => {
                        let _ = opened_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = opened_tx.send(Err(err));
                        return;
                    }
                };

                let mut handled: u64 = 0;
                for job in jobs_rx {
                    job(&mut conn);
                    handled += 1;
                }
                debug!("Relay store closing after {handled} jobs");
            })
            .context("failed to spawn relay store thread")?;

        let opened = opened_rx
            .recv()
            .map_err(|_| anyhow!("relay store thread exited while opening"))
            .and_then(|result| result);
        if let Err(err) = opened {
            let _ = thread.join();
            return Err(err);
        }

        Ok(Self {
            jobs: Mutex::new(Some(jobs_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    fn submit(&self, job: Job) -> Result<()> {
        let jobs = self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let sender = jobs
            .as_ref()
            .ok_or_else(|| anyhow!("relay store is closed"))?;
        sender
            .send(job)
            .map_err(|_| anyhow!("relay store thread is gone"))
    }
}

impl Drop for StoreWorker {
    fn drop(&mut self) {
        // Closing the channel lets queued jobs finish before the thread exits.
        drop(
            self.jobs
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take(),
        );
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Relay store thread panicked");
            }
        }
    }
}

/// Shared handle to the relay store. Clones submit to the same thread, which
/// stops once the last clone is dropped.
#[derive(Clone)]
pub struct Database {
    worker: Arc<StoreWorker>,
    path: Arc<PathBuf>,
}

impl Database {
    /// Opens (creating if needed) the store at `path`, including any missing
    /// parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create store directory {}", dir.display()))?;
        }

        let worker = StoreWorker::spawn(path.clone())?;
        info!(
            "Relay store ready at {} (schema v{CURRENT_SCHEMA_VERSION})",
            path.display()
        );
        Ok(Self {
            worker: Arc::new(worker),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `job` on the store thread and waits for its result.
    pub async fn execute<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.worker.submit(Box::new(move |conn| {
            // The caller may have given up waiting; the job still ran.
            let _ = reply_tx.send(job(conn));
        }))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("relay store dropped a job without replying"))?
    }

    pub async fn schema_version(&self) -> Result<i32> {
        self.execute(|conn| {
            conn.pragma_query_value(None, "user_version", |row| row.get(0))
                .context("failed to read schema version")
        })
        .await
    }
}
