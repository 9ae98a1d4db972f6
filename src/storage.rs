use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::PersistenceError;
use crate::types::{HistoryEntry, MetricRecord, ServiceTarget};

/// Append-only history, one JSON-lines file per service.
///
/// Layout: `<root>/<kind>/<name>.jsonl`, one entry per line. Appends never
/// rewrite existing bytes, so a torn write can only damage the final line,
/// which readers skip.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    root: PathBuf,
}

impl HistoryStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| PersistenceError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn series_path(&self, service: &ServiceTarget) -> PathBuf {
        self.root
            .join(service.kind.as_str())
            .join(format!("{}.jsonl", sanitize(&service.name)))
    }

    /// The `count` most recent entries by window end, oldest first.
    pub fn load_recent(&self, service: &ServiceTarget, count: usize) -> Result<Vec<HistoryEntry>, PersistenceError> {
        let path = self.series_path(service);
        let mut entries = match read_series(&path)? {
            Some(series) => series.entries,
            None => return Ok(Vec::new()),
        };
        entries.retain(|e| e.record.service.same_series(service));
        entries.sort_by(|a, b| {
            a.record
                .window_end
                .cmp(&b.record.window_end)
                .then(a.seq.cmp(&b.seq))
        });
        let skip = entries.len().saturating_sub(count);
        Ok(entries.split_off(skip))
    }

    /// Append `record` to its series. Out-of-order windows are stored as given.
    pub fn append(&self, service: &ServiceTarget, record: &MetricRecord) -> Result<HistoryEntry, PersistenceError> {
        let pending = self.prepare(service, record)?;
        self.commit(service, pending)
    }

    /// Read the series and encode the next entry against what was read.
    fn prepare(&self, service: &ServiceTarget, record: &MetricRecord) -> Result<PendingAppend, PersistenceError> {
        let path = self.series_path(service);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| PersistenceError::io(dir, e))?;
        }

        let existing = read_series(&path)?;
        let (seq, observed_len, needs_newline) = match existing {
            Some(ref s) => (s.last_seq.map_or(0, |n| n + 1), s.len, s.len > 0 && !s.ends_with_newline),
            None => (0, 0, false),
        };

        let entry = HistoryEntry {
            seq,
            record: record.clone(),
        };
        let mut line = serde_json::to_string(&entry).map_err(|source| PersistenceError::Encode {
            target: service.to_string(),
            source,
        })?;
        line.push('\n');
        if needs_newline {
            // Isolate a torn tail left by an interrupted earlier write.
            line.insert(0, '\n');
        }

        Ok(PendingAppend {
            path,
            entry,
            line,
            observed_len,
        })
    }

    /// Write a prepared entry, unless the file changed since it was read.
    fn commit(&self, service: &ServiceTarget, pending: PendingAppend) -> Result<HistoryEntry, PersistenceError> {
        let PendingAppend {
            path,
            entry,
            line,
            observed_len,
        } = pending;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PersistenceError::io(&path, e))?;
        let found = file.metadata().map_err(|e| PersistenceError::io(&path, e))?.len();
        if found != observed_len {
            return Err(PersistenceError::ConcurrentModification {
                path,
                expected: observed_len,
                found,
            });
        }

        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| PersistenceError::io(&path, e))?;

        debug!(service = %service, seq = entry.seq, path = %path.display(), "Appended history entry");
        Ok(entry)
    }
}

struct PendingAppend {
    path: PathBuf,
    entry: HistoryEntry,
    line: String,
    observed_len: u64,
}

struct Series {
    entries: Vec<HistoryEntry>,
    last_seq: Option<u64>,
    len: u64,
    ends_with_newline: bool,
}

fn read_series(path: &Path) -> Result<Option<Series>, PersistenceError> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PersistenceError::io(path, e)),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| PersistenceError::io(path, e))?;
    let len = bytes.len() as u64;
    let content = String::from_utf8_lossy(&bytes);

    let mut entries = Vec::new();
    let mut last_seq: Option<u64> = None;
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryEntry>(line) {
            Ok(entry) => {
                last_seq = Some(last_seq.map_or(entry.seq, |s| s.max(entry.seq)));
                entries.push(entry);
            }
            Err(e) => {
                warn!(path = %path.display(), line = lineno + 1, error = %e, "Skipping unreadable history line");
            }
        }
    }

    Ok(Some(Series {
        entries,
        last_seq,
        len,
        ends_with_newline: content.ends_with('\n'),
    }))
}

/// Service names become file names; keep them portable.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}
