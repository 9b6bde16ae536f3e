use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use spool_api::error::PluginError;
use spool_api::metadata::TopicMetadata;
use spool_api::record::TopicRecord;
use spool_api::storage::{OpenMode, StorageBackend, StorageFactory};

use super::config::{DiskRecord, FileStorageConfig, LOCK_FILE, RECORDS_FILE, TOPICS_FILE};

pub const BACKEND_ID: &str = "file";

// ════════════════════════════════════════════════════════════════
//  FileStorageFactory
// ════════════════════════════════════════════════════════════════

/// Containers as directories: `uri` is the directory path.
#[derive(Debug, Clone, Default)]
pub struct FileStorageFactory {
    config: FileStorageConfig,
}

impl FileStorageFactory {
    pub fn new(config: FileStorageConfig) -> Self {
        Self { config }
    }
}

impl StorageFactory for FileStorageFactory {
    fn id(&self) -> &str {
        BACKEND_ID
    }

    fn open(&self, uri: &str, mode: OpenMode) -> Result<Box<dyn StorageBackend>, PluginError> {
        if uri.is_empty() {
            return Err(PluginError::open("empty container path"));
        }
        let storage = match mode {
            OpenMode::Write => FileStorage::create(uri, self.config)?,
            OpenMode::Append => FileStorage::append(uri, self.config)?,
            OpenMode::Read => FileStorage::read(uri)?,
        };
        tracing::debug!(uri = %uri, mode = %mode, "file container opened");
        Ok(Box::new(storage))
    }
}

// ════════════════════════════════════════════════════════════════
//  Lock file
// ════════════════════════════════════════════════════════════════

/// `.lock` inside the container, present while a writer holds it.
struct LockFile {
    path: PathBuf,
    held: bool,
}

impl LockFile {
    fn acquire(dir: &Path) -> Result<Self, PluginError> {
        let path = dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut f) => {
                let _ = writeln!(f, "{}", std::process::id());
                Ok(Self { path, held: true })
            }
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => Err(PluginError::open(format!(
                "{} is held by another writer",
                dir.display()
            ))),
            Err(e) => Err(PluginError::open(format!("lock {}: {e}", path.display()))),
        }
    }

    fn release(&mut self) -> Result<(), PluginError> {
        if !self.held {
            return Ok(());
        }
        self.held = false;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "lock file vanished before release");
                Ok(())
            }
            Err(e) => Err(PluginError::io(format!("unlock {}: {e}", self.path.display()))),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "failed to release lock");
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  FileStorage
// ════════════════════════════════════════════════════════════════

struct Writers {
    topics: BufWriter<File>,
    records: BufWriter<File>,
}

/// Line cursor over `records.jsonl`. Lines are read as raw bytes and a
/// line that fails to decode stays peeked, so a corrupt record is reported
/// on every attempt, never skipped.
struct RecordCursor {
    reader: BufReader<File>,
    line_no: usize,
    peeked: Option<(usize, Vec<u8>)>,
}

impl RecordCursor {
    fn new(file: File) -> Self {
        Self {
            reader: BufReader::new(file),
            line_no: 0,
            peeked: None,
        }
    }

    fn fill(&mut self) -> Result<bool, PluginError> {
        if self.peeked.is_some() {
            return Ok(true);
        }
        loop {
            let mut line = Vec::new();
            let n = self
                .reader
                .read_until(b'\n', &mut line)
                .map_err(|e| PluginError::io(format!("read line {}: {e}", self.line_no + 1)))?;
            if n == 0 {
                return Ok(false);
            }
            self.line_no += 1;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            self.peeked = Some((self.line_no, line));
            return Ok(true);
        }
    }

    /// Decodes the peeked line without consuming it.
    fn decode_peeked(&self) -> Result<Option<TopicRecord>, PluginError> {
        let Some((line_no, line)) = self.peeked.as_ref() else {
            return Ok(None);
        };
        let corrupt = |e: &dyn std::fmt::Display| {
            PluginError::corrupt(format!("{RECORDS_FILE} line {line_no}: {e}"))
        };
        let text = std::str::from_utf8(line).map_err(|e| corrupt(&e))?;
        let disk: DiskRecord = serde_json::from_str(text).map_err(|e| corrupt(&e))?;
        Ok(Some(disk.into()))
    }
}

pub struct FileStorage {
    uri: String,
    dir: PathBuf,
    mode: OpenMode,
    topics: Vec<TopicMetadata>,
    writers: Option<Writers>,
    cursor: Option<RecordCursor>,
    lock: Option<LockFile>,
    size_bytes: u64,
    sync_on_write: bool,
    /// A write failed; buffered bytes may hold a partial line.
    poisoned: bool,
    closed: bool,
}

impl FileStorage {
    fn create(uri: &str, config: FileStorageConfig) -> Result<Self, PluginError> {
        let dir = PathBuf::from(uri);
        std::fs::create_dir_all(&dir)
            .map_err(|e| PluginError::open(format!("mkdir {}: {e}", dir.display())))?;

        let lock = LockFile::acquire(&dir)?;
        if dir.join(RECORDS_FILE).exists() {
            return Err(PluginError::open(format!(
                "{} already holds a container",
                dir.display()
            )));
        }

        let writers = Writers {
            topics: BufWriter::new(open_new(&dir.join(TOPICS_FILE))?),
            records: BufWriter::new(open_new(&dir.join(RECORDS_FILE))?),
        };

        Ok(Self {
            uri: uri.to_string(),
            dir,
            mode: OpenMode::Write,
            topics: Vec::new(),
            writers: Some(writers),
            cursor: None,
            lock: Some(lock),
            size_bytes: 0,
            sync_on_write: config.sync_on_write,
            poisoned: false,
            closed: false,
        })
    }

    fn append(uri: &str, config: FileStorageConfig) -> Result<Self, PluginError> {
        let dir = PathBuf::from(uri);
        ensure_container(&dir)?;
        let lock = LockFile::acquire(&dir)?;
        let topics = load_topics(&dir)?;

        let records_path = dir.join(RECORDS_FILE);
        let size_bytes = std::fs::metadata(&records_path)
            .map_err(|e| PluginError::io(format!("stat {}: {e}", records_path.display())))?
            .len();

        let writers = Writers {
            topics: BufWriter::new(open_append(&dir.join(TOPICS_FILE))?),
            records: BufWriter::new(open_append(&records_path)?),
        };

        Ok(Self {
            uri: uri.to_string(),
            dir,
            mode: OpenMode::Append,
            topics,
            writers: Some(writers),
            cursor: None,
            lock: Some(lock),
            size_bytes,
            sync_on_write: config.sync_on_write,
            poisoned: false,
            closed: false,
        })
    }

    fn read(uri: &str) -> Result<Self, PluginError> {
        let dir = PathBuf::from(uri);
        ensure_container(&dir)?;
        if dir.join(LOCK_FILE).exists() {
            return Err(PluginError::open(format!(
                "{} is being written",
                dir.display()
            )));
        }
        let topics = load_topics(&dir)?;

        let records_path = dir.join(RECORDS_FILE);
        let file = File::open(&records_path)
            .map_err(|e| PluginError::io(format!("open {}: {e}", records_path.display())))?;
        let size_bytes = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            uri: uri.to_string(),
            dir,
            mode: OpenMode::Read,
            topics,
            writers: None,
            cursor: Some(RecordCursor::new(file)),
            lock: None,
            size_bytes,
            sync_on_write: false,
            poisoned: false,
            closed: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn writers(&mut self) -> Result<&mut Writers, PluginError> {
        if self.closed {
            return Err(PluginError::logic(format!("{} is closed", self.uri)));
        }
        if self.poisoned {
            return Err(PluginError::io(format!("{} failed an earlier write", self.uri)));
        }
        self.writers
            .as_mut()
            .ok_or_else(|| PluginError::logic(format!("{} is open for reading", self.uri)))
    }

    fn cursor(&mut self) -> Result<&mut RecordCursor, PluginError> {
        if self.closed {
            return Err(PluginError::logic(format!("{} is closed", self.uri)));
        }
        self.cursor
            .as_mut()
            .ok_or_else(|| PluginError::logic(format!("{} is open for writing", self.uri)))
    }
}

impl StorageBackend for FileStorage {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }

    fn write_metadata(&mut self, metadata: &TopicMetadata) -> Result<(), PluginError> {
        if let Some(existing) = self.topics.iter().find(|t| t.name == metadata.name) {
            if existing.conflicts_with(metadata) {
                return Err(PluginError::conflict(format!(
                    "topic '{}' already stored as {} ({})",
                    existing.name, existing.message_type, existing.serialization_format
                )));
            }
            return Ok(());
        }

        let line = serde_json::to_string(metadata)?;
        let sync = self.sync_on_write;
        let writers = self.writers()?;
        if let Err(e) = write_line(&mut writers.topics, &line, sync) {
            self.poisoned = true;
            return Err(e);
        }
        self.topics.push(metadata.clone());
        Ok(())
    }

    fn write_record(&mut self, record: &TopicRecord) -> Result<(), PluginError> {
        if !self.topics.iter().any(|t| t.name == record.topic_name) {
            return Err(PluginError::topic_not_found(&record.topic_name));
        }

        let line = serde_json::to_string(&DiskRecord::from(record))?;
        let sync = self.sync_on_write;
        let writers = self.writers()?;
        if let Err(e) = write_line(&mut writers.records, &line, sync) {
            self.poisoned = true;
            return Err(e);
        }
        self.size_bytes += line.len() as u64 + 1;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, PluginError> {
        self.cursor()?.fill()
    }

    fn read_next(&mut self) -> Result<TopicRecord, PluginError> {
        let cursor = self.cursor()?;
        if !cursor.fill()? {
            return Err(PluginError::end_of_storage());
        }
        let record = cursor
            .decode_peeked()?
            .ok_or_else(PluginError::end_of_storage)?;
        cursor.peeked = None;
        Ok(record)
    }

    fn topics(&self) -> Vec<TopicMetadata> {
        self.topics.clone()
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    fn close(&mut self) -> Result<(), PluginError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cursor = None;

        let mut result = Ok(());
        if let Some(mut writers) = self.writers.take() {
            if self.poisoned {
                // Drop whatever the failed write left buffered.
                let (_, _) = writers.topics.into_parts();
                let (_, _) = writers.records.into_parts();
                tracing::warn!(uri = %self.uri, "discarded buffered data after failed write");
            } else {
                result = flush_and_sync(&mut writers.topics).and(flush_and_sync(&mut writers.records));
            }
        }
        if let Some(mut lock) = self.lock.take() {
            let released = lock.release();
            if result.is_ok() {
                result = released;
            }
        }
        if result.is_ok() {
            tracing::debug!(uri = %self.uri, bytes = self.size_bytes, "file container closed");
        }
        result
    }
}

impl Drop for FileStorage {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(uri = %self.uri, error = %e, "failed to close file container");
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Helpers
// ════════════════════════════════════════════════════════════════

fn ensure_container(dir: &Path) -> Result<(), PluginError> {
    for file in [TOPICS_FILE, RECORDS_FILE] {
        if !dir.join(file).is_file() {
            return Err(PluginError::not_found(format!(
                "{} is not a container (missing {file})",
                dir.display()
            )));
        }
    }
    Ok(())
}

fn load_topics(dir: &Path) -> Result<Vec<TopicMetadata>, PluginError> {
    let path = dir.join(TOPICS_FILE);
    let f = File::open(&path).map_err(|e| PluginError::io(format!("open {}: {e}", path.display())))?;

    let mut topics: Vec<TopicMetadata> = Vec::new();
    for (index, line) in BufReader::new(f).lines().enumerate() {
        let line = line.map_err(|e| PluginError::io(format!("read {}: {e}", path.display())))?;
        if line.trim().is_empty() {
            continue;
        }
        let metadata: TopicMetadata = serde_json::from_str(&line)
            .map_err(|e| PluginError::corrupt(format!("{TOPICS_FILE} line {}: {e}", index + 1)))?;
        if !topics.iter().any(|t| t.name == metadata.name) {
            topics.push(metadata);
        }
    }
    Ok(topics)
}

fn open_new(path: &Path) -> Result<File, PluginError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| PluginError::open(format!("create {}: {e}", path.display())))
}

fn open_append(path: &Path) -> Result<File, PluginError> {
    OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| PluginError::io(format!("open {}: {e}", path.display())))
}

fn write_line(w: &mut BufWriter<File>, line: &str, sync: bool) -> Result<(), PluginError> {
    writeln!(w, "{line}").map_err(|e| PluginError::io(format!("write: {e}")))?;
    if sync {
        flush_and_sync(w)
    } else {
        w.flush().map_err(|e| PluginError::io(format!("flush: {e}")))
    }
}

fn flush_and_sync(w: &mut BufWriter<File>) -> Result<(), PluginError> {
    w.flush().map_err(|e| PluginError::io(format!("flush: {e}")))?;
    w.get_ref()
        .sync_data()
        .map_err(|e| PluginError::io(format!("fsync: {e}")))
}
