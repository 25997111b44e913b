//! File-based task store.
//!
//! Layout under the base directory:
//!
//! ```text
//! <task-id>/
//!   metadata.json     task metadata
//!   journal.jsonl     append-only journal, one JSON event per line
//!   checkpoint.json   most recent checkpoint
//!   .lock             advisory lock serializing access to the task
//! .store.lock         shared by per-task operations, exclusive for deletes
//! ```
//!
//! - Every per-task operation holds an exclusive file lock, so status swaps are
//!   atomic across threads and processes
//! - Journal appends are fsynced line by line, after a torn final line left by
//!   a crash has been repaired
//! - Metadata and checkpoints are written via temp file + rename

use crate::domain::{StoreError, TaskEvent, TaskId, TaskMetadata, TaskStatus};
use crate::event_store::{Checkpoint, TaskStore};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const METADATA_FILE: &str = "metadata.json";
const JOURNAL_FILE: &str = "journal.jsonl";
const CHECKPOINT_FILE: &str = "checkpoint.json";
const LOCK_FILE: &str = ".lock";
const STORE_LOCK_FILE: &str = ".store.lock";

#[derive(Debug, Clone)]
pub struct FileTaskStore {
    base_dir: PathBuf,
}

impl FileTaskStore {
    /// Opens a store rooted at `base_dir`, creating the directory if needed.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| StoreError::io(&base_dir, e))?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn task_dir(&self, task_id: TaskId) -> PathBuf {
        self.base_dir.join(task_id.to_string())
    }

    /// Locks the whole store: shared for per-task operations, exclusive while
    /// a task directory is removed.
    fn lock_store(&self, exclusive: bool) -> Result<File, StoreError> {
        let path = self.base_dir.join(STORE_LOCK_FILE);
        let lock = open_lock_file(&path)?;
        let locked = if exclusive {
            lock.lock_exclusive()
        } else {
            lock.lock_shared()
        };
        locked.map_err(|e| StoreError::io(&path, e))?;
        Ok(lock)
    }

    /// Runs `f` on the task directory while holding the task's exclusive lock.
    ///
    /// With `create == false` and no directory on disk, `f` runs unlocked:
    /// there is nothing to protect yet.
    fn with_task_lock<T>(
        &self,
        task_id: TaskId,
        create: bool,
        f: impl FnOnce(&Path) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _store_lock = self.lock_store(false)?;
        let dir = self.task_dir(task_id);
        if !dir.exists() {
            if !create {
                return f(&dir);
            }
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }

        let lock_path = dir.join(LOCK_FILE);
        let lock = open_lock_file(&lock_path)?;
        lock.lock_exclusive()
            .map_err(|e| StoreError::io(&lock_path, e))?;

        // Both locks are released when dropped.
        f(&dir)
    }
}

impl TaskStore for FileTaskStore {
    fn save_metadata(&self, metadata: &TaskMetadata) -> Result<(), StoreError> {
        self.with_task_lock(metadata.id, true, |dir| {
            write_json_atomic(&dir.join(METADATA_FILE), metadata)
        })
    }

    fn load_metadata(&self, task_id: TaskId) -> Result<Option<TaskMetadata>, StoreError> {
        self.with_task_lock(task_id, false, |dir| read_json(&dir.join(METADATA_FILE)))
    }

    fn append_event(&self, event: &TaskEvent) -> Result<(), StoreError> {
        self.with_task_lock(event.task_id, true, |dir| {
            append_journal_line(&dir.join(JOURNAL_FILE), event)
        })
    }

    fn append_event_if_status(
        &self,
        event: &TaskEvent,
        expected: TaskStatus,
    ) -> Result<bool, StoreError> {
        self.with_task_lock(event.task_id, false, |dir| {
            let metadata = read_json::<TaskMetadata>(&dir.join(METADATA_FILE))?;
            if metadata.map(|m| m.status) != Some(expected) {
                return Ok(false);
            }
            append_journal_line(&dir.join(JOURNAL_FILE), event)?;
            Ok(true)
        })
    }

    fn load_events(&self, task_id: TaskId) -> Result<Vec<TaskEvent>, StoreError> {
        self.with_task_lock(task_id, false, |dir| {
            let path = dir.join(JOURNAL_FILE);
            let content = match fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(StoreError::io(&path, e)),
            };
            parse_journal(&path, &content)
        })
    }

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        self.with_task_lock(checkpoint.task_id, true, |dir| {
            write_json_atomic(&dir.join(CHECKPOINT_FILE), checkpoint)
        })
    }

    fn load_checkpoint(&self, task_id: TaskId) -> Result<Option<Checkpoint>, StoreError> {
        self.with_task_lock(task_id, false, |dir| read_json(&dir.join(CHECKPOINT_FILE)))
    }

    fn task_ids(&self) -> Result<Vec<TaskId>, StoreError> {
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.base_dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.join(METADATA_FILE).is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match TaskId::parse(name) {
                Ok(id) => ids.push(id),
                Err(_) => tracing::debug!("Ignoring non-task directory {}", path.display()),
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn delete(&self, task_id: TaskId) -> Result<bool, StoreError> {
        // No per-task operation can run while the exclusive store lock is held,
        // so nothing recreates the directory halfway through the removal.
        let _store_lock = self.lock_store(true)?;
        let dir = self.task_dir(task_id);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(true)
    }

    fn compare_and_set_status(
        &self,
        task_id: TaskId,
        expected: TaskStatus,
        next: TaskStatus,
        failure_reason: Option<&str>,
    ) -> Result<Option<TaskMetadata>, StoreError> {
        self.with_task_lock(task_id, false, |dir| {
            let path = dir.join(METADATA_FILE);
            let Some(mut metadata) = read_json::<TaskMetadata>(&path)? else {
                return Ok(None);
            };
            if !metadata.compare_and_transition(expected, next, failure_reason) {
                return Ok(None);
            }
            write_json_atomic(&path, &metadata)?;
            Ok(Some(metadata))
        })
    }
}

/// Parses journal lines in order.
///
/// A final line without its trailing newline is a write torn by a crash and is
/// skipped. Any other malformed line is an error.
fn parse_journal(path: &Path, content: &str) -> Result<Vec<TaskEvent>, StoreError> {
    let complete = content.ends_with('\n');
    let lines: Vec<&str> = content.lines().collect();
    let mut events = Vec::with_capacity(lines.len());

    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<TaskEvent>(trimmed) {
            Ok(event) => events.push(event),
            Err(e) if !complete && idx + 1 == lines.len() => {
                tracing::warn!(
                    "Skipping torn final journal line in {}: {}",
                    path.display(),
                    e
                );
            }
            Err(e) => return Err(StoreError::serialization(path, e)),
        }
    }

    Ok(events)
}

fn open_lock_file(path: &Path) -> Result<File, StoreError> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))
}

/// Appends one event as a JSON line and fsyncs the journal.
fn append_journal_line(path: &Path, event: &TaskEvent) -> Result<(), StoreError> {
    let line = serde_json::to_string(event).map_err(|e| StoreError::serialization(path, e))?;

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    repair_torn_tail(path, &mut file)?;
    writeln!(file, "{}", line).map_err(|e| StoreError::io(path, e))?;
    file.flush().map_err(|e| StoreError::io(path, e))?;
    file.sync_all().map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

/// Makes sure the journal ends with a newline before the next append.
///
/// A final line that still parses only lost its newline and is terminated.
/// Anything else is a torn write and is cut off, matching what
/// [`parse_journal`] already skips.
fn repair_torn_tail(path: &Path, file: &mut File) -> Result<(), StoreError> {
    let len = file
        .metadata()
        .map_err(|e| StoreError::io(path, e))?
        .len();
    if len == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))
        .and_then(|_| file.read_exact(&mut last))
        .map_err(|e| StoreError::io(path, e))?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let mut content = Vec::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut content))
        .map_err(|e| StoreError::io(path, e))?;
    let keep = content
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos + 1);

    if serde_json::from_slice::<TaskEvent>(&content[keep..]).is_ok() {
        tracing::warn!("Terminating final journal line in {}", path.display());
        file.write_all(b"\n").map_err(|e| StoreError::io(path, e))?;
    } else {
        tracing::warn!(
            "Truncating torn final journal line in {} ({} bytes)",
            path.display(),
            content.len() - keep
        );
        file.set_len(keep as u64)
            .map_err(|e| StoreError::io(path, e))?;
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StoreError::serialization(path, e))
}

/// Writes pretty JSON to a temp file, then renames it over `path`.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let content =
        serde_json::to_string_pretty(value).map_err(|e| StoreError::serialization(path, e))?;

    let tmp_path = path.with_extension("json.tmp");
    if let Err(e) = fs::write(&tmp_path, content) {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::io(&tmp_path, e));
    }
    fs::rename(&tmp_path, path).map_err(|e| StoreError::io(path, e))
}

#[cfg(test)]
#[path = "tests/file_store_tests.rs"]
mod tests;
