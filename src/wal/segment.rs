//! Segment file naming
//!
//! `segment_000001.wal`, `segment_000002.wal`, ... Ids only grow, so
//! sorting by id yields append order.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Generate the path of segment `id` inside `dir`
pub fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("segment_{:06}.wal", id))
}

/// Parse a segment id from its filename
/// "segment_000042.wal" → Some(42)
pub fn parse_segment_id(path: &Path) -> Option<u64> {
    if path.extension()? != "wal" {
        return None;
    }
    let name = path.file_stem()?.to_string_lossy();
    let id_str = name.strip_prefix("segment_")?;
    id_str.parse().ok()
}

/// All segments in `dir`, oldest first; a missing directory has none
pub fn list_segments(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(id) = parse_segment_id(&path) {
            segments.push((id, path));
        }
    }

    segments.sort_by_key(|(id, _)| *id);
    Ok(segments)
}
