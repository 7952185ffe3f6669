//! Snapshot persistence.
//!
//! A run produces exactly one artifact: a pretty-printed JSON
//! [`ResultSnapshot`]. Each run overwrites it. Writes go to a temporary file
//! in the target directory which is then renamed over the old snapshot, so a
//! reader (the dashboard server) never sees a half-written file.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::models::ResultSnapshot;
use crate::{Error, Result};

/// Default snapshot file name, relative to the working directory.
pub const DEFAULT_SNAPSHOT_FILE: &str = "res.json";

/// Write `snapshot` to `path`, replacing any previous snapshot.
pub fn write_snapshot(path: &Path, snapshot: &ResultSnapshot) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, snapshot)?;
    tmp.write_all(b"\n")?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::debug!(path = %path.display(), records = snapshot.data.len(), "snapshot written");
    Ok(())
}

/// Read the snapshot stored at `path`.
pub fn read_snapshot(path: &Path) -> Result<ResultSnapshot> {
    let content = read_snapshot_text(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Read the raw snapshot text, mapping a missing file to [`Error::NotFound`].
pub fn read_snapshot_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            Error::NotFound(format!("{} not found", path.display()))
        } else {
            Error::Io(e)
        }
    })
}
