//! Durable room records.
//!
//! One JSON file per room under the rooms directory. Writes go to a
//! temporary file that is synced and renamed over the record, so a reader
//! only ever sees a complete file. Records that fail to parse are moved
//! aside, never deleted.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::room::{now_ms, Room};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read directory {0}: {1}")]
    DirectoryRead(PathBuf, #[source] std::io::Error),

    #[error("failed to read {0}: {1}")]
    FileRead(PathBuf, #[source] std::io::Error),

    #[error("failed to write {0}: {1}")]
    FileWrite(PathBuf, #[source] std::io::Error),

    #[error("failed to rename {0} to {1}: {2}")]
    FileRename(PathBuf, PathBuf, #[source] std::io::Error),

    #[error("failed to serialize room {0}: {1}")]
    Serialization(String, #[source] serde_json::Error),

    #[error("failed to parse {0}: {1}")]
    Deserialization(PathBuf, #[source] serde_json::Error),
}

/// On-disk shape of one room
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRoom {
    pub schema_version: u32,
    pub saved_at: u64,
    pub room: Room,
}

/// What a startup load found
#[derive(Debug, Default)]
pub struct LoadReport {
    pub rooms: Vec<Room>,
    pub quarantined: Vec<PathBuf>,
    pub expired: usize,
}

#[derive(Debug, Clone)]
pub struct RoomStore {
    dir: PathBuf,
}

impl RoomStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn room_path(&self, code: &str) -> PathBuf {
        self.dir.join(format!("{code}.json"))
    }

    pub async fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::FileWrite(self.dir.clone(), e))
    }

    #[instrument(skip(self, room), fields(code = %room.room_code))]
    pub async fn save(&self, room: &Room) -> Result<(), StoreError> {
        let json = encode(room)?;
        self.write_atomic(&room.room_code, &json).await
    }

    async fn write_atomic(&self, code: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.room_path(code);
        let temp_path = path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StoreError::FileWrite(temp_path.clone(), e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| StoreError::FileWrite(temp_path.clone(), e))?;
        file.sync_all()
            .await
            .map_err(|e| StoreError::FileWrite(temp_path.clone(), e))?;
        drop(file);

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StoreError::FileRename(temp_path, path.clone(), e))?;
        debug!("Saved room {}", code);
        Ok(())
    }

    pub async fn delete(&self, code: &str) -> Result<(), StoreError> {
        let path = self.room_path(code);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::FileWrite(path, e)),
        }
    }

    /// Load every stored room. Broken files are quarantined and skipped;
    /// records idle past `ttl` are deleted.
    #[instrument(skip(self))]
    pub async fn load_all(&self, ttl: Option<Duration>) -> Result<LoadReport, StoreError> {
        self.ensure_dir().await?;
        let now = now_ms();
        let mut report = LoadReport::default();

        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| StoreError::DirectoryRead(self.dir.clone(), e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::DirectoryRead(self.dir.clone(), e))?
        {
            let path = entry.path();
            let Some(code) = record_code(&path) else {
                continue;
            };

            let stored = match self.read_record(&path).await {
                Ok(stored) => stored,
                Err(e) => {
                    error!("Failed to load room from {}: {}", path.display(), e);
                    match self.quarantine(&path, &code, now).await {
                        Ok(moved) => report.quarantined.push(moved),
                        Err(e) => error!("Failed to quarantine {}: {}", path.display(), e),
                    }
                    continue;
                }
            };

            let mut room = stored.room;
            let idle = Duration::from_millis(now.saturating_sub(room.last_activity_at));
            if ttl.is_some_and(|ttl| idle > ttl) {
                if let Err(e) = self.delete(&code).await {
                    warn!("Failed to delete expired room {}: {}", code, e);
                }
                report.expired += 1;
                continue;
            }

            room.mark_restored();
            report.rooms.push(room);
        }

        info!(
            "Loaded {} rooms ({} quarantined, {} expired)",
            report.rooms.len(),
            report.quarantined.len(),
            report.expired
        );
        Ok(report)
    }

    async fn read_record(&self, path: &Path) -> Result<StoredRoom, StoreError> {
        let bytes = fs::read(path)
            .await
            .map_err(|e| StoreError::FileRead(path.to_path_buf(), e))?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Deserialization(path.to_path_buf(), e))
    }

    async fn quarantine(&self, path: &Path, code: &str, now: u64) -> Result<PathBuf, StoreError> {
        let target = self.dir.join(format!("{code}.corrupt.{now}.json"));
        fs::rename(path, &target)
            .await
            .map_err(|e| StoreError::FileRename(path.to_path_buf(), target.clone(), e))?;
        warn!("Quarantined {} as {}", path.display(), target.display());
        Ok(target)
    }
}

/// `ABCDE.json` -> `ABCDE`; temporaries and quarantined files are skipped
fn record_code(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let code = name.strip_suffix(".json")?;
    if code.is_empty() || code.contains('.') {
        return None;
    }
    Some(code.to_string())
}

/// Borrowing twin of [`StoredRoom`] so saving does not clone the room
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredRoomRef<'a> {
    schema_version: u32,
    saved_at: u64,
    room: &'a Room,
}

fn encode(room: &Room) -> Result<Vec<u8>, StoreError> {
    let record = StoredRoomRef {
        schema_version: SCHEMA_VERSION,
        saved_at: now_ms(),
        room,
    };
    serde_json::to_vec(&record).map_err(|e| StoreError::Serialization(room.room_code.clone(), e))
}

// ==================== Debounced writer ====================

#[derive(Debug, Default)]
struct WriteSlot {
    scheduled: AtomicBool,
    /// One writer per room at a time
    writing: Mutex<()>,
}

/// Coalesces bursts of room changes into one write per debounce window.
#[derive(Debug)]
pub struct Persister {
    store: RoomStore,
    debounce: Duration,
    slots: DashMap<String, Arc<WriteSlot>>,
}

impl Persister {
    pub fn new(store: RoomStore, debounce: Duration) -> Self {
        Self {
            store,
            debounce,
            slots: DashMap::new(),
        }
    }

    pub fn store(&self) -> &RoomStore {
        &self.store
    }

    /// Schedule a write of `room`. Calls inside the window collapse into one.
    pub fn schedule(self: &Arc<Self>, code: &str, room: Arc<Mutex<Room>>) {
        let slot = self
            .slots
            .entry(code.to_string())
            .or_default()
            .value()
            .clone();
        if slot.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.debounce).await;
            let _writing = slot.writing.lock().await;
            slot.scheduled.store(false, Ordering::Release);
            this.write_now(&room).await;
        });
    }

    /// Write immediately, skipping the debounce
    pub async fn flush(&self, room: &Mutex<Room>) {
        let code = room.lock().await.room_code.clone();
        let slot = self.slots.entry(code).or_default().value().clone();
        let _writing = slot.writing.lock().await;
        self.write_now(room).await;
    }

    /// Encodes under the room lock, writes after releasing it.
    async fn write_now(&self, room: &Mutex<Room>) {
        let (code, encoded) = {
            let room = room.lock().await;
            if room.deleted {
                return;
            }
            (room.room_code.clone(), encode(&room))
        };
        let result = match encoded {
            Ok(bytes) => self.store.write_atomic(&code, &bytes).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Failed to persist room {}: {}", code, e);
        }
    }

    /// Remove a room's record and bookkeeping
    pub async fn forget(&self, code: &str) {
        self.slots.remove(code);
        if let Err(e) = self.store.delete(code).await {
            warn!("Failed to delete room {}: {}", code, e);
        }
    }
}
