//! # Mirror Logs
//!
//! Per-run log files for mirror and comparator results.
//!
//! - Paths ending in `.json` get a [`JsonMirrorLog`]: one JSON object per line.
//! - Any other path gets a [`FileMirrorLog`]: a title line, then one
//!   `[SEVERITY] message` line per record.
//!
//! Logs are written from mirror worker threads and therefore take `&self`.
//! [`LogGuard`] closes a log when it goes out of scope, so logs are finalized
//! on every exit path of a run.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::warn;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::status::{Status, StatusEntry};

/// A sink for status records.
pub trait MirrorLog: Send + Sync {
    fn log(&self, entry: &StatusEntry) -> Result<()>;

    fn log_status(&self, status: &Status) -> Result<()> {
        for entry in status.entries() {
            self.log(entry)?;
        }
        Ok(())
    }

    /// Flushes and releases the log. Later records are dropped.
    fn close(&self) -> Result<()>;
}

/// Opens the log at `path` in the format its extension selects.
pub fn open_log(path: &Path, title: &str) -> Result<Arc<dyn MirrorLog>> {
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        Ok(Arc::new(JsonMirrorLog::create(path, title)?))
    } else {
        Ok(Arc::new(FileMirrorLog::create(path, title)?))
    }
}

fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(BufWriter::new(File::create(path)?))
}

type SharedWriter = Mutex<Option<BufWriter<File>>>;

fn with_writer<F>(writer: &SharedWriter, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let mut guard = writer.lock().map_err(|_| Error::LockPoisoned {
        context: "mirror log".to_string(),
    })?;
    match guard.as_mut() {
        Some(w) => write(w),
        None => Ok(()),
    }
}

fn close_writer(writer: &SharedWriter) -> Result<()> {
    let mut guard = writer.lock().map_err(|_| Error::LockPoisoned {
        context: "mirror log".to_string(),
    })?;
    if let Some(mut w) = guard.take() {
        w.flush()?;
    }
    Ok(())
}

/// Plain-text log.
pub struct FileMirrorLog {
    writer: SharedWriter,
}

impl FileMirrorLog {
    pub fn create(path: &Path, title: &str) -> Result<Self> {
        let mut writer = create_writer(path)?;
        writeln!(writer, "{}", title)?;
        Ok(FileMirrorLog {
            writer: Mutex::new(Some(writer)),
        })
    }
}

impl MirrorLog for FileMirrorLog {
    fn log(&self, entry: &StatusEntry) -> Result<()> {
        with_writer(&self.writer, |w| {
            writeln!(w, "{}", entry)?;
            Ok(())
        })
    }

    fn close(&self) -> Result<()> {
        close_writer(&self.writer)
    }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    log: &'a str,
    #[serde(flatten)]
    entry: &'a StatusEntry,
}

/// JSON-lines log.
pub struct JsonMirrorLog {
    title: String,
    writer: SharedWriter,
}

impl JsonMirrorLog {
    pub fn create(path: &Path, title: &str) -> Result<Self> {
        Ok(JsonMirrorLog {
            title: title.to_string(),
            writer: Mutex::new(Some(create_writer(path)?)),
        })
    }
}

impl MirrorLog for JsonMirrorLog {
    fn log(&self, entry: &StatusEntry) -> Result<()> {
        let record = JsonRecord {
            log: &self.title,
            entry,
        };
        with_writer(&self.writer, |w| {
            serde_json::to_writer(&mut *w, &record)?;
            w.write_all(b"\n")?;
            Ok(())
        })
    }

    fn close(&self) -> Result<()> {
        close_writer(&self.writer)
    }
}

/// Closes the wrapped log when dropped.
pub struct LogGuard {
    log: Option<Arc<dyn MirrorLog>>,
}

impl LogGuard {
    pub fn new(log: Option<Arc<dyn MirrorLog>>) -> Self {
        LogGuard { log }
    }

    pub fn get(&self) -> Option<&Arc<dyn MirrorLog>> {
        self.log.as_ref()
    }

    /// Logs `entry`, reporting failures through the `log` facade only.
    pub fn record(&self, entry: &StatusEntry) {
        if let Some(log) = &self.log {
            if let Err(e) = log.log(entry) {
                warn!("Failed to write mirror log: {}", e);
            }
        }
    }

    pub fn record_status(&self, status: &Status) {
        for entry in status.entries() {
            self.record(entry);
        }
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(log) = self.log.take() {
            if let Err(e) = log.close() {
                warn!("Failed to close mirror log: {}", e);
            }
        }
    }
}
