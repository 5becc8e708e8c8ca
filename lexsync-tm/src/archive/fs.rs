//! Filesystem-backed archive store

use super::store::ArchiveStore;
use async_trait::async_trait;
use lexsync_common::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Archive store rooted at a local directory
///
/// Object paths map directly to files under the root, so the on-disk layout
/// matches the archive layout one to one.
pub struct FsArchiveStore {
    root: PathBuf,
}

impl FsArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an object path under the root, rejecting escapes
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || path.is_empty() {
            return Err(Error::Validation(format!("invalid archive path: {}", path)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArchiveStore for FsArchiveStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve(prefix.trim_end_matches('/'))?;

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::ArchiveUnavailable(format!(
                    "cannot list {}: {}",
                    prefix, e
                )))
            }
        };

        let normalized = if prefix.ends_with('/') || prefix.is_empty() {
            prefix.to_string()
        } else {
            format!("{}/", prefix)
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::ArchiveUnavailable(format!("cannot list {}: {}", prefix, e)))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::ArchiveUnavailable(format!("cannot list {}: {}", prefix, e)))?;
            if !file_type.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                paths.push(format!("{}{}", normalized, name));
            }
        }

        paths.sort();
        Ok(paths)
    }

    async fn get(&self, path: &str) -> Result<String> {
        let file = self.resolve(path)?;
        match tokio::fs::read_to_string(&file).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "archive object not found: {}",
                path
            ))),
            Err(e) => Err(Error::ArchiveUnavailable(format!(
                "cannot read {}: {}",
                path, e
            ))),
        }
    }

    async fn put(&self, path: &str, content: &str) -> Result<()> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::ArchiveUnavailable(format!("cannot write {}: {}", path, e)))?;
        }
        tokio::fs::write(&file, content)
            .await
            .map_err(|e| Error::ArchiveUnavailable(format!("cannot write {}: {}", path, e)))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let file = self.resolve(path)?;
        tokio::fs::try_exists(&file)
            .await
            .map_err(|e| Error::ArchiveUnavailable(format!("cannot stat {}: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FsArchiveStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArchiveStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let (_dir, store) = store();

        store
            .put("migrations/mobile/a.json", "{\"translations\":{}}")
            .await
            .unwrap();

        let content = store.get("migrations/mobile/a.json").await.unwrap();
        assert_eq!(content, "{\"translations\":{}}");
        assert!(store.exists("migrations/mobile/a.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, store) = store();

        let err = store.get("migrations/mobile/missing.json").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_missing_prefix_is_empty() {
        let (_dir, store) = store();

        let files = store.list("migrations/mobile/").await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_prefixed() {
        let (_dir, store) = store();

        store.put("migrations/mobile/b.json", "{}").await.unwrap();
        store.put("migrations/mobile/a.json", "{}").await.unwrap();

        let files = store.list("migrations/mobile/").await.unwrap();
        assert_eq!(
            files,
            vec![
                "migrations/mobile/a.json".to_string(),
                "migrations/mobile/b.json".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_list_skips_subdirectories() {
        let (_dir, store) = store();

        store.put("migrations/mobile/a.json", "{}").await.unwrap();
        store.put("migrations/mobile/nested/b.json", "{}").await.unwrap();

        let files = store.list("migrations/mobile").await.unwrap();
        assert_eq!(files, vec!["migrations/mobile/a.json".to_string()]);
    }

    #[tokio::test]
    async fn test_path_escape_rejected() {
        let (_dir, store) = store();

        assert!(store.get("../outside.json").await.is_err());
        assert!(store.put("/etc/passwd", "x").await.is_err());
    }
}
