use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::TrainingCache;
use crate::snapshot::ModelSnapshot;

/// On-disk layout version written into every state file.
pub const STATE_FORMAT: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("state file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed state file {}: {source}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("state file {} has unsupported format {found}", .path.display())]
    UnsupportedFormat { path: PathBuf, found: u32 },
}

/// Snapshot, cache and cursor as restored from disk.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub format: u32,
    #[serde(default)]
    pub snapshot: Option<ModelSnapshot>,
    #[serde(default)]
    pub cache: TrainingCache,
}

#[derive(Serialize)]
struct PersistedStateRef<'a> {
    format: u32,
    snapshot: Option<&'a ModelSnapshot>,
    cache: &'a TrainingCache,
}

/// Write the state file atomically: a temp file in the target directory is
/// synced and then renamed over `path`.
pub fn save(
    path: &Path,
    snapshot: Option<&ModelSnapshot>,
    cache: &TrainingCache,
) -> Result<(), PersistError> {
    let io_err = |source: std::io::Error| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let body = serde_json::to_vec(&PersistedStateRef {
        format: STATE_FORMAT,
        snapshot,
        cache,
    })
    .map_err(|source| PersistError::Format {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(&body).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|err| io_err(err.error))?;
    debug!(target: "wki::store", path = %path.display(), bytes = body.len(), "state persisted");
    Ok(())
}

/// Read the state file; `Ok(None)` when it does not exist yet.
pub fn load(path: &Path) -> Result<Option<PersistedState>, PersistError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let state: PersistedState =
        serde_json::from_slice(&bytes).map_err(|source| PersistError::Format {
            path: path.to_path_buf(),
            source,
        })?;
    if state.format != STATE_FORMAT {
        return Err(PersistError::UnsupportedFormat {
            path: path.to_path_buf(),
            found: state.format,
        });
    }
    Ok(Some(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::{tests::cache_with, train};

    #[test]
    fn round_trip_preserves_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("model.json");
        let cache = cache_with(&[
            (1, "bremsen wechseln", 60.0),
            (2, "zahnriemen tauschen", 245.5),
            (3, "oelwechsel", 30.25),
        ]);
        let snapshot = train(&cache).expect("trained");

        save(&path, Some(&snapshot), &cache).expect("save");
        let restored = load(&path).expect("load").expect("present");

        assert_eq!(restored.cache, cache);
        assert_eq!(restored.cache.cursor(), 3);
        assert_eq!(restored.snapshot.as_ref(), Some(&snapshot));
    }

    #[test]
    fn cache_without_snapshot_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        let cache = cache_with(&[(4, "reifen wechseln", 40.0)]);
        save(&path, None, &cache).expect("save");
        let restored = load(&path).expect("load").expect("present");
        assert!(restored.snapshot.is_none());
        assert_eq!(restored.cache, cache);
    }

    #[test]
    fn missing_file_is_clean_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load(&dir.path().join("absent.json")).expect("load").is_none());
    }

    #[test]
    fn garbage_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"{not json").expect("write");
        assert!(matches!(load(&path), Err(PersistError::Format { .. })));

        std::fs::write(&path, br#"{"format": 99}"#).expect("write");
        assert!(matches!(
            load(&path),
            Err(PersistError::UnsupportedFormat { found: 99, .. })
        ));
    }
}
