// crates/multiscreen-core/src/control.rs
//
// Trait boundaries for the external control surface: the piece that edits
// the stream list and persists it to disk. The engine and binary only
// depend on these traits; a real deployment can swap in a database-backed
// implementation without touching the ingest core.

use crate::stats::StreamSpec;
use std::path::{Path, PathBuf};

pub trait StreamListSource: Send + Sync {
    fn load(&self) -> anyhow::Result<Vec<StreamSpec>>;
}

pub trait ConfigPersistence: Send + Sync {
    fn save_stream(&self, spec: &StreamSpec) -> anyhow::Result<()>;
    fn remove_stream(&self, name: &str) -> anyhow::Result<()>;
}

/// Reads the streams config file described in the external-interfaces
/// section: either a bare array of `{name, url}` objects, or an object
/// `{"streams": [...]}`. Entries missing name/url are skipped.
pub struct FileStreamListSource {
    path: PathBuf,
}

impl FileStreamListSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl StreamListSource for FileStreamListSource {
    fn load(&self) -> anyhow::Result<Vec<StreamSpec>> {
        let body = std::fs::read_to_string(&self.path)?;
        let value: serde_json::Value = serde_json::from_str(&body)?;
        let entries = match &value {
            serde_json::Value::Array(arr) => arr.clone(),
            serde_json::Value::Object(obj) => obj
                .get("streams")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        Ok(entries
            .iter()
            .filter_map(|e| {
                let name = e.get("name")?.as_str()?.to_string();
                let url = e.get("url")?.as_str()?.to_string();
                if name.is_empty() || url.is_empty() {
                    None
                } else {
                    Some(StreamSpec::new(name, url))
                }
            })
            .collect())
    }
}

/// Rewrites the whole streams file on every edit. No rotation, no atomic
/// replace, no file locking beyond "one file, best effort" — a real control
/// plane is expected to layer that on top.
pub struct FileConfigPersistence {
    path: PathBuf,
}

impl FileConfigPersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn read_all(&self) -> anyhow::Result<Vec<StreamSpec>> {
        match std::fs::read_to_string(&self.path) {
            Ok(body) => {
                let specs: Vec<StreamSpec> = serde_json::from_str(&body).unwrap_or_default();
                Ok(specs)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, specs: &[StreamSpec]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(specs)?;
        std::fs::write(&self.path, body)?;
        Ok(())
    }
}

impl ConfigPersistence for FileConfigPersistence {
    fn save_stream(&self, spec: &StreamSpec) -> anyhow::Result<()> {
        let mut specs = self.read_all()?;
        if let Some(existing) = specs.iter_mut().find(|s| s.name == spec.name) {
            *existing = spec.clone();
        } else {
            specs.push(spec.clone());
        }
        self.write_all(&specs)
    }

    fn remove_stream(&self, name: &str) -> anyhow::Result<()> {
        let mut specs = self.read_all()?;
        specs.retain(|s| s.name != name);
        self.write_all(&specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_persistence_round_trips_through_save_and_remove() {
        let dir = std::env::temp_dir().join(format!("multiscreen-control-test-{}", std::process::id()));
        let path = dir.join("streams.json");
        let persistence = FileConfigPersistence::new(&path);

        persistence.save_stream(&StreamSpec::new("A", "url://a")).unwrap();
        persistence.save_stream(&StreamSpec::new("B", "url://b")).unwrap();

        let source = FileStreamListSource::new(&path);
        let loaded = source.load().unwrap();
        assert_eq!(loaded.len(), 2);

        persistence.remove_stream("A").unwrap();
        let loaded = source.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "B");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
