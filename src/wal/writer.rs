//! WAL Writer
//!
//! Appends batch frames to size-bounded segment files.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, TideError};

use super::entry::encode_frame;
use super::segment::{list_segments, segment_path};
use super::Batch;

/// Durable sink for batches
///
/// Called only from the log worker thread. A successful return means the
/// batch survives a process restart.
pub trait BatchWriter: Send {
    fn write_batch(&mut self, batch: &Batch) -> Result<()>;
}

/// The segment currently being appended to
struct ActiveSegment {
    id: u64,
    file: File,
    size: u64,
}

/// Writes batches to `segment_*.wal` files in a directory
pub struct SegmentWriter {
    dir: PathBuf,
    max_segment_size: u64,
    active: Option<ActiveSegment>,
}

impl SegmentWriter {
    /// Create a writer; the directory is created if missing and segments
    /// are opened lazily on the first write, after recovery has run
    pub fn new(dir: impl Into<PathBuf>, max_segment_size: u64) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_segment_size,
            active: None,
        })
    }

    /// Id of the segment receiving writes, if one is open
    pub fn active_segment_id(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.id)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Return a segment with room for `frame_len` more bytes
    ///
    /// An oversize frame still gets written, alone in a fresh segment.
    fn segment_for(&mut self, frame_len: u64) -> Result<&mut ActiveSegment> {
        if self.active.is_none() {
            self.active = self.reopen_latest()?;
        }

        let rotate_to = match &self.active {
            Some(active) if active.size == 0 || active.size + frame_len <= self.max_segment_size => {
                None
            }
            Some(active) => Some(active.id + 1),
            None => Some(1),
        };

        if let Some(id) = rotate_to {
            self.active = Some(self.create_segment(id)?);
        }

        self.active
            .as_mut()
            .ok_or_else(|| TideError::Durability("no active segment".to_string()))
    }

    /// Continue appending to the newest segment left by a previous run
    fn reopen_latest(&self) -> Result<Option<ActiveSegment>> {
        match list_segments(&self.dir)?.pop() {
            Some((id, path)) => {
                let file = OpenOptions::new().append(true).open(&path)?;
                let size = file.metadata()?.len();
                Ok(Some(ActiveSegment { id, file, size }))
            }
            None => Ok(None),
        }
    }

    fn create_segment(&self, id: u64) -> Result<ActiveSegment> {
        let path = segment_path(&self.dir, id);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        sync_dir(&self.dir)?;
        tracing::debug!(segment = id, path = %path.display(), "Started WAL segment");
        Ok(ActiveSegment { id, file, size: 0 })
    }
}

impl BatchWriter for SegmentWriter {
    fn write_batch(&mut self, batch: &Batch) -> Result<()> {
        let frame = encode_frame(batch)?;
        let frame_len = frame.len() as u64;
        let active = self.segment_for(frame_len)?;

        let written = active
            .file
            .write_all(&frame)
            .and_then(|_| active.file.sync_data());

        match written {
            Ok(()) => {
                active.size += frame_len;
                Ok(())
            }
            Err(e) => {
                // Cut off any torn tail so later frames stay contiguous;
                // if that fails too, move on to a fresh segment.
                let (id, size) = (active.id, active.size);
                let trimmed = active.file.set_len(size).and_then(|_| active.file.sync_data());
                if trimmed.is_err() {
                    self.active = None;
                    self.active = Some(self.create_segment(id + 1)?);
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
