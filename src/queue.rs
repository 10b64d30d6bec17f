// Copyright (C) 2026 tracing-scribe developers
//
// This file is part of tracing-scribe.
//
// tracing-scribe is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// tracing-scribe is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See
// the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with tracing-scribe.  If
// not, see <http://www.gnu.org/licenses/>.

//! The durable queue: a crash-durable ordered map from integer keys to [`LogEntry`]s.
//!
//! Entries that could not be delivered are parked here, keyed by a strictly increasing sequence
//! number, and drained in ascending key order on the next delivery attempt. The backing store is
//! a single flat file holding an append-only log of `Put`/`Del` frames:
//!
//! ```text
//! [len: u32 LE][crc32: u32 LE][bincode-encoded frame]
//! ```
//!
//! Opening replays the log into an in-memory [`BTreeMap`]; every mutation appends a frame and
//! syncs before returning; [`close`](DurableQueue::close) compacts the file down to the live
//! records when anything was deleted. A torn final frame (crash mid-append) is truncated away on
//! open, losing at most the one record whose enqueue never completed; the caller still holds that
//! record in memory at that point, so delivery remains at-least-once. A frame that checksums
//! correctly but does not decode indicates real corruption and fails the open.
//!
//! Keys are serialized as their decimal string representation. Within one open session a key is
//! never reused, even after deletion: the next key always exceeds the largest key observed at
//! open time or assigned since.
//!
//! The handle is *not* safe for concurrent use; the delivery engine opens it, works, and closes
//! it within the span of a single delivery attempt, under the handler lock.

use crate::{
    error::{Error, Result},
    record::LogEntry,
};

use backtrace::Backtrace;
use serde::{Deserialize, Serialize};

use std::{
    collections::BTreeMap,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// Upper bound on a single frame; anything larger in the length field is treated as damage.
const MAX_FRAME: u32 = 1 << 24;

#[derive(Serialize, Deserialize)]
enum Frame {
    Put { key: String, entry: LogEntry },
    Del { key: String },
}

fn queue_err(
    path: &Path,
    source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> Error {
    Error::QueueOpen {
        path: path.to_path_buf(),
        source: source.into(),
        back: Backtrace::new(),
    }
}

fn frame_bytes(path: &Path, frame: &Frame) -> Result<Vec<u8>> {
    let payload = bincode::serialize(frame).map_err(|err| queue_err(path, err))?;
    let mut buf = Vec::with_capacity(payload.len() + 8);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

fn write_compacted(path: &Path, tmp: &Path, live: &BTreeMap<u64, LogEntry>) -> Result<()> {
    let mut out = File::create(tmp).map_err(|err| queue_err(path, err))?;
    for (key, entry) in live {
        let frame = Frame::Put {
            key: key.to_string(),
            entry: entry.clone(),
        };
        out.write_all(&frame_bytes(path, &frame)?)
            .map_err(|err| queue_err(path, err))?;
    }
    out.sync_all().map_err(|err| queue_err(path, err))
}

/// An open handle to the durable queue at one path.
pub struct DurableQueue {
    path: PathBuf,
    file: File,
    live: BTreeMap<u64, LogEntry>,
    next_key: u64,
    deletes: u64,
}

impl DurableQueue {
    /// Open (or create) the queue backed by the file at `path`, replaying any existing log.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<DurableQueue> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|err| queue_err(&path, err))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|err| queue_err(&path, err))?;

        let mut live = BTreeMap::new();
        let mut next_key = 0u64;
        let mut pos = 0usize;
        let mut good = 0usize;
        while bytes.len() - pos >= 8 {
            let len = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
            let crc = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap());
            let end = pos + 8 + len as usize;
            if len == 0 || len > MAX_FRAME || end > bytes.len() {
                break; // torn tail
            }
            let payload = &bytes[pos + 8..end];
            if crc32fast::hash(payload) != crc {
                break; // torn tail
            }
            let frame: Frame = bincode::deserialize(payload).map_err(|err| {
                queue_err(&path, format!("corrupt frame at offset {}: {}", pos, err))
            })?;
            let key = match &frame {
                Frame::Put { key, .. } | Frame::Del { key } => {
                    key.parse::<u64>().map_err(|_| {
                        queue_err(
                            &path,
                            format!("non-numeric key {:?} at offset {}", key, pos),
                        )
                    })?
                }
            };
            match frame {
                Frame::Put { entry, .. } => {
                    live.insert(key, entry);
                }
                Frame::Del { .. } => {
                    live.remove(&key);
                }
            }
            next_key = next_key.max(key + 1);
            pos = end;
            good = pos;
        }
        if good < bytes.len() {
            // Drop the torn tail so the next append starts at a clean frame boundary.
            file.set_len(good as u64).map_err(|err| queue_err(&path, err))?;
            file.sync_all().map_err(|err| queue_err(&path, err))?;
        }
        file.seek(SeekFrom::End(0))
            .map_err(|err| queue_err(&path, err))?;

        Ok(DurableQueue {
            path,
            file,
            live,
            next_key,
            deletes: 0,
        })
    }

    /// All pending keys, in ascending order.
    pub fn keys(&self) -> Vec<u64> {
        self.live.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn get(&self, key: u64) -> Result<LogEntry> {
        self.live.get(&key).cloned().ok_or(Error::QueueKey {
            key,
            back: Backtrace::new(),
        })
    }

    /// Persist `entry` under the next key; durable once this returns.
    pub fn enqueue(&mut self, entry: &LogEntry) -> Result<u64> {
        let key = self.next_key;
        self.append(&Frame::Put {
            key: key.to_string(),
            entry: entry.clone(),
        })?;
        self.live.insert(key, entry.clone());
        self.next_key = key + 1;
        Ok(key)
    }

    /// Remove the record at `key`; durable once this returns.
    pub fn dequeue(&mut self, key: u64) -> Result<()> {
        if !self.live.contains_key(&key) {
            return Err(Error::QueueKey {
                key,
                back: Backtrace::new(),
            });
        }
        self.append(&Frame::Del {
            key: key.to_string(),
        })?;
        self.live.remove(&key);
        self.deletes += 1;
        Ok(())
    }

    /// Flush and release the handle.
    ///
    /// If anything was deleted this session, the log is compacted: only live records survive, so
    /// the file does not grow without bound across fail/retry cycles.
    pub fn close(self) -> Result<()> {
        let DurableQueue {
            path,
            file,
            live,
            deletes,
            ..
        } = self;
        if deletes == 0 {
            return file.sync_all().map_err(|err| queue_err(&path, err));
        }
        let tmp = path.with_extension("compact");
        if let Err(err) = write_compacted(&path, &tmp, &live) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err);
        }
        drop(file);
        if let Err(err) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(queue_err(&path, err));
        }
        // The rename needs the directory entry itself made durable.
        if let Some(dir) = path.parent() {
            if let Ok(dir) = File::open(dir) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }

    fn append(&mut self, frame: &Frame) -> Result<()> {
        let buf = frame_bytes(&self.path, frame)?;
        self.file
            .write_all(&buf)
            .map_err(|err| queue_err(&self.path, err))?;
        self.file
            .sync_data()
            .map_err(|err| queue_err(&self.path, err))
    }
}

#[cfg(test)]
mod test {

    use super::*;

    fn entry(n: usize) -> LogEntry {
        LogEntry::new("h1-svc", &format!("message {}", n))
    }

    #[test]
    fn test_key_assignment() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = DurableQueue::open(dir.path().join("buf")).unwrap();
        assert!(q.is_empty());
        assert_eq!(q.enqueue(&entry(0)).unwrap(), 0);
        assert_eq!(q.enqueue(&entry(1)).unwrap(), 1);
        assert_eq!(q.enqueue(&entry(2)).unwrap(), 2);
        assert_eq!(q.keys(), vec![0, 1, 2]);
        q.close().unwrap();
    }

    #[test]
    fn test_reopen_preserves_records_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buf");
        let mut q = DurableQueue::open(&path).unwrap();
        q.enqueue(&entry(0)).unwrap();
        q.enqueue(&entry(1)).unwrap();
        q.close().unwrap();

        let q = DurableQueue::open(&path).unwrap();
        assert_eq!(q.keys(), vec![0, 1]);
        assert_eq!(q.get(0).unwrap(), entry(0));
        assert_eq!(q.get(1).unwrap(), entry(1));
        q.close().unwrap();
    }

    #[test]
    fn test_key_not_reused_within_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = DurableQueue::open(dir.path().join("buf")).unwrap();
        assert_eq!(q.enqueue(&entry(0)).unwrap(), 0);
        q.dequeue(0).unwrap();
        assert_eq!(q.enqueue(&entry(1)).unwrap(), 1);
        q.close().unwrap();
    }

    #[test]
    fn test_key_exceeds_prior_max_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buf");
        let mut q = DurableQueue::open(&path).unwrap();
        q.enqueue(&entry(0)).unwrap();
        q.enqueue(&entry(1)).unwrap();
        q.dequeue(0).unwrap();
        q.close().unwrap();

        let mut q = DurableQueue::open(&path).unwrap();
        assert_eq!(q.keys(), vec![1]);
        assert_eq!(q.enqueue(&entry(2)).unwrap(), 2);
        q.close().unwrap();
    }

    #[test]
    fn test_empty_queue_restarts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buf");
        let mut q = DurableQueue::open(&path).unwrap();
        q.enqueue(&entry(0)).unwrap();
        q.dequeue(0).unwrap();
        q.close().unwrap();

        let mut q = DurableQueue::open(&path).unwrap();
        assert!(q.is_empty());
        assert_eq!(q.enqueue(&entry(1)).unwrap(), 0);
        q.close().unwrap();
    }

    #[test]
    fn test_absent_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = DurableQueue::open(dir.path().join("buf")).unwrap();
        assert!(matches!(q.get(7), Err(Error::QueueKey { key: 7, .. })));
        assert!(matches!(q.dequeue(7), Err(Error::QueueKey { key: 7, .. })));
        q.close().unwrap();
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buf");
        let mut q = DurableQueue::open(&path).unwrap();
        q.enqueue(&entry(0)).unwrap();
        q.enqueue(&entry(1)).unwrap();
        q.close().unwrap();

        // Simulate a crash mid-append: a frame header whose payload never made it out.
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[64, 0, 0, 0, 1, 2, 3]).unwrap();
        drop(f);

        let q = DurableQueue::open(&path).unwrap();
        assert_eq!(q.keys(), vec![0, 1]);
        q.close().unwrap();
    }

    #[test]
    fn test_checksummed_garbage_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buf");
        let mut q = DurableQueue::open(&path).unwrap();
        q.enqueue(&entry(0)).unwrap();
        q.close().unwrap();

        // A frame that checksums but doesn't decode is not a torn tail; it's damage.
        let junk = b"not a frame";
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&(junk.len() as u32).to_le_bytes()).unwrap();
        f.write_all(&crc32fast::hash(junk).to_le_bytes()).unwrap();
        f.write_all(junk).unwrap();
        drop(f);

        assert!(matches!(
            DurableQueue::open(&path),
            Err(Error::QueueOpen { .. })
        ));
    }

    #[test]
    fn test_failed_compaction_preserves_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buf");
        let mut q = DurableQueue::open(&path).unwrap();
        q.enqueue(&entry(0)).unwrap();
        q.enqueue(&entry(1)).unwrap();
        q.dequeue(0).unwrap();

        // A directory squatting on the temp-file path makes the compaction write fail.
        let tmp = path.with_extension("compact");
        std::fs::create_dir(&tmp).unwrap();
        assert!(matches!(q.close(), Err(Error::QueueOpen { .. })));

        // The uncompacted log is untouched and still replays.
        std::fs::remove_dir(&tmp).unwrap();
        let q = DurableQueue::open(&path).unwrap();
        assert_eq!(q.keys(), vec![1]);
        assert_eq!(q.get(1).unwrap(), entry(1));
        q.close().unwrap();
        assert!(!tmp.exists());
    }

    #[test]
    fn test_close_compacts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buf");
        let mut q = DurableQueue::open(&path).unwrap();
        for n in 0..8 {
            q.enqueue(&entry(n)).unwrap();
        }
        q.close().unwrap();
        let grown = std::fs::metadata(&path).unwrap().len();

        let mut q = DurableQueue::open(&path).unwrap();
        for key in q.keys() {
            if key != 3 {
                q.dequeue(key).unwrap();
            }
        }
        q.close().unwrap();

        let compacted = std::fs::metadata(&path).unwrap().len();
        assert!(compacted < grown);
        let q = DurableQueue::open(&path).unwrap();
        assert_eq!(q.keys(), vec![3]);
        assert_eq!(q.get(3).unwrap(), entry(3));
        q.close().unwrap();
    }
}
