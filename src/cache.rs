use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::IngestError;
use crate::ingest::{load_sessions, IngestOptions};
use crate::models::SessionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SourceStamp {
    modified: Option<SystemTime>,
    len: u64,
}

#[derive(Debug)]
struct CachedTable {
    stamp: SourceStamp,
    options: IngestOptions,
    sessions: Arc<[SessionRecord]>,
}

/// Loaded tables keyed by source path. An entry is reused while the file's
/// modification time and length are unchanged.
#[derive(Debug, Default)]
pub struct SourceCache {
    entries: HashMap<PathBuf, CachedTable>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(
        &mut self,
        path: &Path,
        options: &IngestOptions,
    ) -> Result<Arc<[SessionRecord]>, IngestError> {
        let stamp = stamp_of(path)?;

        if let Some(cached) = self.entries.get(path) {
            if cached.stamp == stamp && cached.options == *options {
                tracing::debug!(source = %path.display(), "session table cache hit");
                return Ok(Arc::clone(&cached.sessions));
            }
        }

        tracing::debug!(source = %path.display(), "session table cache miss");
        let sessions: Arc<[SessionRecord]> = load_sessions(path, options)?.into();
        self.entries.insert(
            path.to_path_buf(),
            CachedTable {
                stamp,
                options: *options,
                sessions: Arc::clone(&sessions),
            },
        );
        Ok(sessions)
    }

    pub fn invalidate(&mut self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn stamp_of(path: &Path) -> Result<SourceStamp, IngestError> {
    let metadata = std::fs::metadata(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(SourceStamp {
        modified: metadata.modified().ok(),
        len: metadata.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::header_line;
    use std::io::Write;

    fn write_source(rows: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", header_line()).unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn repeated_loads_share_one_table() {
        let file = write_source(&["1,A,T,2024-01-01,,30,4,4,4,4,4,"]);
        let mut cache = SourceCache::new();
        let options = IngestOptions::default();

        let first = cache.load(file.path(), &options).unwrap();
        let second = cache.load(file.path(), &options).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn reload_after_clear_is_identical() {
        let file = write_source(&[
            "1,A,T,2024-01-01,2024-01-01 08:00,30,4,,5,,3,ok",
            "2,B,,bad,,x,,,,,,",
        ]);
        let mut cache = SourceCache::new();
        let options = IngestOptions::default();

        let first = cache.load(file.path(), &options).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        let second = cache.load(file.path(), &options).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&*first).unwrap(),
            serde_json::to_vec(&*second).unwrap()
        );
    }

    #[test]
    fn changed_file_is_reloaded() {
        let mut file = write_source(&["1,A,T,2024-01-01,,30,,,,,,"]);
        let mut cache = SourceCache::new();
        let options = IngestOptions::default();

        assert_eq!(cache.load(file.path(), &options).unwrap().len(), 1);
        writeln!(file, "2,A,T,2024-01-02,,45,,,,,,").unwrap();
        file.flush().unwrap();
        assert_eq!(cache.load(file.path(), &options).unwrap().len(), 2);
    }

    #[test]
    fn invalidate_drops_a_single_entry() {
        let file = write_source(&["1,A,T,,,,,,,,,"]);
        let mut cache = SourceCache::new();
        cache.load(file.path(), &IngestOptions::default()).unwrap();

        assert!(cache.invalidate(file.path()));
        assert!(!cache.invalidate(file.path()));
        assert!(cache.is_empty());
    }
}
