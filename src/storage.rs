//! Filesystem storage layer.
//!
//! One file per pending message in a single directory. The directory is the
//! only source of truth: no index is kept, and the id-to-path mapping is a
//! pure function. Anything still on disk after a crash is still pending.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fd_lock::RwLock;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::id::{IdGenerator, TimestampIdGenerator};
use crate::model::{MESSAGE_EXTENSION, MessageId, PendingMessage, Record, Status};
use crate::outcome::{DiagnosticSink, OutcomeLog, TracingSink};
use crate::reader::QueueReader;
use crate::telemetry::queue::operation_span;

/// Suffix of in-flight writes. Never matches [`MESSAGE_EXTENSION`].
const TEMP_SUFFIX: &str = ".tmp";

/// Storage backend. Owns the queue directory.
pub struct MessageStore {
    directory: PathBuf,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    outcomes: OutcomeLog,
}

/// Builder for [`MessageStore`]. Everything but the directory has a default.
pub struct StoreBuilder {
    directory: PathBuf,
    log: bool,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl StoreBuilder {
    /// Enable or disable the outcome log. Off by default.
    pub fn log(mut self, enabled: bool) -> Self {
        self.log = enabled;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Where outcome-log write failures are reported.
    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Create the directory if needed and return the store.
    pub fn open(self) -> Result<MessageStore> {
        ensure_directory(&self.directory)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(TimestampIdGenerator::new(clock.clone())));
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));

        debug!(directory = %self.directory.display(), log = self.log, "message store opened");

        Ok(MessageStore {
            outcomes: OutcomeLog::new(&self.directory, self.log, clock.clone(), sink),
            directory: self.directory,
            clock,
            ids,
        })
    }
}

impl MessageStore {
    pub fn builder(directory: impl Into<PathBuf>) -> StoreBuilder {
        StoreBuilder {
            directory: directory.into(),
            log: false,
            clock: None,
            ids: None,
            sink: None,
        }
    }

    /// Open a store with default collaborators.
    pub fn open(config: &TransportConfig) -> Result<Self> {
        Self::builder(&config.directory).log(config.log).open()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn outcomes(&self) -> &OutcomeLog {
        &self.outcomes
    }

    /// A reader over this store's directory.
    pub fn reader(&self) -> QueueReader<'_> {
        QueueReader::new(self)
    }

    /// `directory/id.message`.
    pub fn path_for(&self, id: &MessageId) -> PathBuf {
        self.directory.join(format!("{id}{MESSAGE_EXTENSION}"))
    }

    fn temp_path_for(&self, id: &MessageId) -> PathBuf {
        self.directory
            .join(format!(".{id}{MESSAGE_EXTENSION}{TEMP_SUFFIX}"))
    }

    // -----------------------------------------------------------------------
    // Enqueue / Read
    // -----------------------------------------------------------------------

    /// Persist a record as a new pending message and return its id.
    ///
    /// The content goes to a hidden temporary file under an exclusive lock
    /// and is renamed into place once flushed, so readers see either the
    /// whole message or nothing.
    pub fn enqueue(&self, record: &Record) -> Result<MessageId> {
        let id = self.ids.generate(&|id| self.path_for(id).exists());
        let span = operation_span("enqueue", &id);
        let _enter = span.enter();

        let path = self.path_for(&id);
        let temp = self.temp_path_for(&id);

        // Record is strings only, so this cannot fail.
        let content = serde_json::to_vec(record)
            .map_err(|e| Error::Codec(Box::new(e)))?;

        if let Err(source) = write_locked(&temp, &content) {
            let _ = fs::remove_file(&temp);
            return Err(Error::Write { path, source });
        }
        if let Err(source) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(Error::Write { path, source });
        }

        debug!(bytes = content.len(), "message enqueued");
        Ok(id)
    }

    /// Read and parse a pending message. The file is left in place.
    pub fn read(&self, id: &MessageId) -> Result<Record> {
        read_record(&self.path_for(id))
    }

    // -----------------------------------------------------------------------
    // Ack / Reject
    // -----------------------------------------------------------------------

    /// Finish a message successfully. Absent files are already finished.
    pub fn ack(&self, id: &MessageId, message_type: &str) -> Result<()> {
        self.finalize(id, message_type, Status::Processed)
    }

    /// Give up on a message. Absent files are already finished.
    pub fn reject(&self, id: &MessageId, message_type: &str) -> Result<()> {
        self.finalize(id, message_type, Status::Failed)
    }

    fn finalize(&self, id: &MessageId, message_type: &str, status: Status) -> Result<()> {
        let span = operation_span(if status == Status::Processed { "ack" } else { "reject" }, id);
        let _enter = span.enter();

        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(%status, "message finalized");
                self.outcomes.record(status, id, message_type);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(%status, "message already finalized");
                Ok(())
            }
            Err(source) => Err(Error::Remove { path, source }),
        }
    }

    // -----------------------------------------------------------------------
    // Listing / Maintenance
    // -----------------------------------------------------------------------

    /// Every pending message file, in directory order.
    pub fn pending(&self) -> Result<Vec<PendingMessage>> {
        let entries = fs::read_dir(&self.directory).map_err(|source| Error::Read {
            path: self.directory.clone(),
            source,
        })?;

        let mut pending = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| Error::Read {
                path: self.directory.clone(),
                source,
            })?;
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(MessageId::from_file_name) else {
                continue;
            };

            let path = entry.path();
            let modified = match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => meta.modified().map_err(|source| Error::Read {
                    path: path.clone(),
                    source,
                })?,
                Ok(_) => continue,
                // Acked by someone else since read_dir.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(source) => return Err(Error::Read { path, source }),
            };

            pending.push(PendingMessage { id, path, modified });
        }
        Ok(pending)
    }

    /// Number of pending messages.
    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.pending()?.len())
    }

    /// Remove temporary write files older than `older_than`, left behind by
    /// producers that died mid-write. Returns how many were removed.
    pub fn sweep_incomplete(&self, older_than: Duration) -> Result<usize> {
        let cutoff = SystemTime::from(self.clock.now())
            .checked_sub(older_than)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let entries = fs::read_dir(&self.directory).map_err(|source| Error::Read {
            path: self.directory.clone(),
            source,
        })?;

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !(name.starts_with('.') && name.ends_with(TEMP_SUFFIX)) {
                continue;
            }

            let path = entry.path();
            let stale = fs::metadata(&path)
                .and_then(|m| m.modified())
                .is_ok_and(|modified| modified <= cutoff);
            if !stale {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    warn!(path = %path.display(), "removed incomplete message write");
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => return Err(Error::Remove { path, source }),
            }
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// Create the queue directory (and parents) if missing, then check that it
/// is a directory this process can create files in.
fn ensure_directory(path: &Path) -> Result<()> {
    let fail = |source| Error::DirectoryCreation {
        path: path.to_path_buf(),
        source,
    };

    if !path.is_dir() {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o777);
        }
        builder.create(path).map_err(fail)?;
    }

    let meta = fs::metadata(path).map_err(fail)?;
    if !meta.is_dir() {
        return Err(fail(std::io::Error::other("path exists but is not a directory")));
    }
    if meta.permissions().readonly() {
        return Err(fail(std::io::Error::new(
            ErrorKind::PermissionDenied,
            "directory is read-only",
        )));
    }

    // Mode bits say nothing about ownership; only a real create does.
    let probe = path.join(format!(".{}.probe{TEMP_SUFFIX}", std::process::id()));
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe)
        .map_err(fail)?;
    fs::remove_file(&probe).map_err(fail)
}

fn write_locked(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let mut lock = RwLock::new(file);
    let mut guard = lock.write()?;
    guard.write_all(content)?;
    guard.sync_all()
}

pub(crate) fn read_record(path: &Path) -> Result<Record> {
    let bytes = fs::read(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| Error::CorruptData {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_mapping_is_directory_id_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::builder(dir.path()).open().unwrap();
        let id = MessageId::parse("abc_1").unwrap();

        assert_eq!(store.path_for(&id), dir.path().join("abc_1.message"));
        assert_eq!(store.temp_path_for(&id), dir.path().join(".abc_1.message.tmp"));
    }

    #[test]
    fn enqueue_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::builder(dir.path()).open().unwrap();

        let id = store.enqueue(&Record::new("hello")).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![format!("{id}.message")]);
    }

    #[test]
    fn file_content_is_a_json_object_with_body() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::builder(dir.path()).open().unwrap();

        let id = store
            .enqueue(&Record::new("{\"x\":1}").header("type", "Ping"))
            .unwrap();

        let raw = fs::read_to_string(store.path_for(&id)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["body"], "{\"x\":1}");
        assert_eq!(value["headers"]["type"], "Ping");
    }

    #[test]
    fn non_message_files_are_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::builder(dir.path()).open().unwrap();
        fs::write(dir.path().join("processed.2025-01-01.log"), "{}\n").unwrap();
        fs::write(dir.path().join(".x.message.tmp"), "partial").unwrap();
        fs::create_dir(dir.path().join("sub.message")).unwrap();
        store.enqueue(&Record::new("a")).unwrap();

        assert_eq!(store.pending_count().unwrap(), 1);
    }

    #[test]
    fn sweep_removes_only_stale_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::builder(dir.path()).open().unwrap();
        let id = store.enqueue(&Record::new("keep")).unwrap();
        fs::write(dir.path().join(".dead.message.tmp"), "partial").unwrap();

        assert_eq!(store.sweep_incomplete(Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(store.sweep_incomplete(Duration::ZERO).unwrap(), 1);

        assert!(!dir.path().join(".dead.message.tmp").exists());
        assert!(store.path_for(&id).exists());
    }

    #[test]
    fn sweep_measures_age_against_the_store_clock() {
        use crate::clock::FixedClock;
        use chrono::{Local, TimeZone};

        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join(".dead.message.tmp");

        let past = Local.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        let store = MessageStore::builder(dir.path())
            .clock(Arc::new(FixedClock::new(past)))
            .open()
            .unwrap();
        fs::write(&temp, "partial").unwrap();
        assert_eq!(store.sweep_incomplete(Duration::ZERO).unwrap(), 0);
        assert!(temp.exists());

        let future = Local::now() + chrono::Duration::days(2);
        let store = MessageStore::builder(dir.path())
            .clock(Arc::new(FixedClock::new(future)))
            .open()
            .unwrap();
        assert_eq!(store.sweep_incomplete(Duration::from_secs(86_400)).unwrap(), 1);
        assert!(!temp.exists());
    }

    #[test]
    fn open_leaves_no_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        MessageStore::builder(dir.path()).open().unwrap();

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn open_fails_when_directory_rejects_new_files() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let queue = dir.path().join("locked");
        fs::create_dir(&queue).unwrap();
        fs::set_permissions(&queue, fs::Permissions::from_mode(0o555)).unwrap();

        // root ignores mode bits; nothing to check then.
        let writable = fs::write(queue.join(".check"), "").is_ok();
        if writable {
            fs::set_permissions(&queue, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = MessageStore::builder(&queue).open();
        fs::set_permissions(&queue, fs::Permissions::from_mode(0o755)).unwrap();

        let err = result.err().unwrap();
        assert!(matches!(err, Error::DirectoryCreation { .. }), "got {err:?}");
    }

    #[test]
    fn open_fails_when_path_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, "").unwrap();

        let err = MessageStore::builder(&file).open().err().unwrap();
        assert!(matches!(err, Error::DirectoryCreation { .. }), "got {err:?}");
    }
}
