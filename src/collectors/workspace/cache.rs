//! Line-per-entry caches of users and groups kept between runs.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

/// Cache folder holding one subject per line per file.
#[derive(Debug, Clone)]
pub struct SubjectCache {
    folder: PathBuf,
}

impl SubjectCache {
    pub fn new(folder: &Path) -> Self {
        Self {
            folder: folder.to_path_buf(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.folder.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    /// Subjects stored under `name`, `None` when nothing was cached yet
    pub fn load(&self, name: &str) -> Result<Option<Vec<String>>> {
        let path = self.path(name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read cache file {}", path.display())),
        };

        let subjects: Vec<String> = content
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        debug!("Loaded {} entries from {}", subjects.len(), path.display());
        Ok(Some(subjects))
    }

    /// Replace the entries stored under `name`
    pub fn store(&self, name: &str, subjects: &[String]) -> Result<()> {
        fs::create_dir_all(&self.folder)
            .with_context(|| format!("Failed to create cache folder {}", self.folder.display()))?;

        let path = self.path(name);
        let mut content = String::new();
        for subject in subjects {
            content.push_str(subject);
            content.push('\n');
        }
        fs::write(&path, content).with_context(|| format!("Failed to write cache file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_temp_dir;

    #[test]
    fn test_missing_cache_is_none() {
        let dir = create_temp_dir().unwrap();
        let cache = SubjectCache::new(dir.path());
        assert!(cache.load("active_users.tmp").unwrap().is_none());
        assert!(!cache.exists("active_users.tmp"));
    }

    #[test]
    fn test_store_and_load() {
        let dir = create_temp_dir().unwrap();
        let cache = SubjectCache::new(&dir.path().join("cache"));
        let users = vec!["a@example.com".to_string(), "b@example.com".to_string()];

        cache.store("active_users.tmp", &users).unwrap();
        assert_eq!(cache.load("active_users.tmp").unwrap(), Some(users));

        cache.store("active_users.tmp", &["c@example.com".to_string()]).unwrap();
        assert_eq!(cache.load("active_users.tmp").unwrap().unwrap(), vec!["c@example.com"]);
    }

    #[test]
    fn test_empty_cache_file_loads_empty() {
        let dir = create_temp_dir().unwrap();
        let cache = SubjectCache::new(dir.path());
        cache.store("groups.tmp", &[]).unwrap();
        assert_eq!(cache.load("groups.tmp").unwrap(), Some(Vec::new()));
    }
}
