//! Flat-file JSON implementation of [`UserStore`].

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Snapshot, StoreError, UserStore};

/// Stores the snapshot as pretty-printed JSON at a single path.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a reader sees either the old or the new file. Saves and
/// quarantines of unparseable files are serialized on `io_lock`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    io_lock: Arc<Mutex<()>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy an unparseable store file aside so a later save cannot overwrite it.
    async fn quarantine(&self, failed: Vec<u8>) {
        let _guard = self.io_lock.lock().await;
        let path = self.path.clone();

        let result = tokio::task::spawn_blocking(move || quarantine_file(&path, &failed))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))
            .and_then(|r| r);

        match result {
            Ok(Some(target)) => warn!(
                path = %self.path.display(),
                moved_to = %target.display(),
                "User store was unreadable and has been moved aside"
            ),
            Ok(None) => debug!(
                path = %self.path.display(),
                "User store changed since it failed to parse, leaving it in place"
            ),
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to move unreadable user store aside"
            ),
        }
    }
}

#[async_trait]
impl UserStore for JsonFileStore {
    async fn load(&self) -> Snapshot {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "User store not found, starting empty");
                return Snapshot::default();
            }
            Err(e) => {
                // save() refuses to replace a file it cannot read
                warn!(path = %self.path.display(), error = %e, "Failed to read user store");
                return Snapshot::default();
            }
        };

        match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to parse user store");
                self.quarantine(bytes).await;
                Snapshot::default()
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(snapshot)?;
        let path = self.path.clone();

        let _guard = self.io_lock.lock().await;
        tokio::task::spawn_blocking(move || write_atomic(&path, &data))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

        debug!(path = %self.path.display(), users = snapshot.len(), "User store saved");
        Ok(())
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    // An existing file we cannot read may still hold users
    match std::fs::read(path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(StoreError::Unreadable {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    let dir = parent_dir(path);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "Created data directory");
    }

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

/// Preserve `failed` under a fresh `<file>.corrupt-<ts>-<random>` name and remove
/// the store file, provided it still holds exactly those bytes.
///
/// Returns the quarantine path, or `None` when the file has changed meanwhile.
fn quarantine_file(path: &Path, failed: &[u8]) -> Result<Option<PathBuf>, StoreError> {
    match std::fs::read(path) {
        Ok(current) if current == failed => {}
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "users.json".to_string());
    let prefix = format!("{}.corrupt-{}-", file_name, chrono::Utc::now().timestamp());

    // Created with O_EXCL, so an earlier quarantine is never overwritten
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .tempfile_in(parent_dir(path))?;
    tmp.write_all(failed)?;
    tmp.as_file().sync_all()?;
    let (_, target) = tmp.keep()?;

    std::fs::remove_file(path)?;
    Ok(Some(target))
}
