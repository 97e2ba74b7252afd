//! Flash filesystem and preference store seams, with directory-backed
//! implementations for running on a host

use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("filesystem not mounted")]
    NotMounted,

    #[error("mount failed: {0}")]
    MountFailed(String),

    #[error("namespace {0:?} is open read-only")]
    ReadOnly(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt preference data: {0}")]
    Json(#[from] serde_json::Error),
}

/// One stored file as listed after mounting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

/// A flat flash filesystem
pub trait FlashFilesystem {
    /// Mount, formatting first if the medium cannot be mounted as is
    fn mount(&mut self, format_on_fail: bool) -> Result<(), StorageError>;

    fn entries(&self) -> Result<Vec<FileEntry>, StorageError>;

    /// Delete every stored entry
    fn format(&mut self) -> Result<(), StorageError>;

    fn unmount(&mut self);
}

/// An open preference namespace
pub trait Namespace {
    /// Remove every key; fails on a read-only handle
    fn clear(&mut self) -> Result<(), StorageError>;

    /// Stored length of `key` in bytes, 0 when absent
    fn bytes_len(&self, key: &str) -> usize;

    /// Persist pending changes and release the handle
    fn close(self) -> Result<(), StorageError>;
}

/// Key/value preferences grouped into namespaces
pub trait PreferenceStore {
    type Namespace: Namespace;

    fn open(&self, namespace: &str, read_only: bool) -> Result<Self::Namespace, StorageError>;
}

/// Filesystem backed by a host directory
pub struct DirFilesystem {
    root: PathBuf,
    mounted: bool,
}

impl DirFilesystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounted: false,
        }
    }

    fn ensure_mounted(&self) -> Result<(), StorageError> {
        if self.mounted {
            Ok(())
        } else {
            Err(StorageError::NotMounted)
        }
    }
}

impl FlashFilesystem for DirFilesystem {
    fn mount(&mut self, format_on_fail: bool) -> Result<(), StorageError> {
        if !self.root.is_dir() {
            if !format_on_fail {
                return Err(StorageError::MountFailed(format!(
                    "{} is not a directory",
                    self.root.display()
                )));
            }
            if self.root.exists() {
                fs::remove_file(&self.root)?;
            }
            debug!("Creating fresh filesystem at {}", self.root.display());
            fs::create_dir_all(&self.root)?;
        }
        self.mounted = true;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<FileEntry>, StorageError> {
        self.ensure_mounted()?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            entries.push(FileEntry {
                name: format!("/{}", entry.file_name().to_string_lossy()),
                size: entry.metadata()?.len(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn format(&mut self) -> Result<(), StorageError> {
        self.ensure_mounted()?;
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn unmount(&mut self) {
        self.mounted = false;
    }
}

/// Preferences stored as one JSON object file per namespace
pub struct FilePreferences {
    root: PathBuf,
}

impl FilePreferences {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, namespace: &str) -> PathBuf {
        self.root.join(format!("{}.json", namespace))
    }
}

impl PreferenceStore for FilePreferences {
    type Namespace = FileNamespace;

    fn open(&self, namespace: &str, read_only: bool) -> Result<FileNamespace, StorageError> {
        let path = self.path_for(namespace);
        let entries = load(&path)?;
        Ok(FileNamespace {
            name: namespace.to_string(),
            path,
            entries,
            read_only,
            dirty: false,
        })
    }
}

fn load(path: &Path) -> Result<Map<String, Value>, StorageError> {
    match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(Map::new()),
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Map::new()),
        Err(e) => Err(e.into()),
    }
}

pub struct FileNamespace {
    name: String,
    path: PathBuf,
    entries: Map<String, Value>,
    read_only: bool,
    dirty: bool,
}

impl Namespace for FileNamespace {
    fn clear(&mut self) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly(self.name.clone()));
        }
        self.entries.clear();
        self.dirty = true;
        Ok(())
    }

    fn bytes_len(&self, key: &str) -> usize {
        match self.entries.get(key) {
            None | Some(Value::Null) => 0,
            Some(Value::String(s)) => s.len(),
            Some(other) => other.to_string().len(),
        }
    }

    fn close(self) -> Result<(), StorageError> {
        if self.dirty {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dir_filesystem_lists_and_formats() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.json"), b"{\"a\":1}").unwrap();
        fs::write(dir.path().join("log.txt"), b"hello").unwrap();

        let mut flash = DirFilesystem::new(dir.path());
        flash.mount(true).unwrap();
        let entries = flash.entries().unwrap();
        assert_eq!(
            entries,
            vec![
                FileEntry { name: "/config.json".into(), size: 7 },
                FileEntry { name: "/log.txt".into(), size: 5 },
            ]
        );

        flash.format().unwrap();
        assert!(flash.entries().unwrap().is_empty());
        flash.unmount();
        assert!(matches!(flash.entries(), Err(StorageError::NotMounted)));
    }

    #[test]
    fn test_mount_missing_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("flash");

        let mut flash = DirFilesystem::new(&root);
        assert!(matches!(flash.mount(false), Err(StorageError::MountFailed(_))));
        flash.mount(true).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_namespace_clear_persists() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("vehicle_config.json"),
            r#"{"ngrokHost":"example.ngrok.app","port":443}"#,
        )
        .unwrap();
        let prefs = FilePreferences::new(dir.path());

        let ns = prefs.open("vehicle_config", true).unwrap();
        assert_eq!(ns.bytes_len("ngrokHost"), 17);
        assert_eq!(ns.bytes_len("missing"), 0);

        let mut ns = prefs.open("vehicle_config", false).unwrap();
        ns.clear().unwrap();
        ns.close().unwrap();

        let ns = prefs.open("vehicle_config", true).unwrap();
        assert_eq!(ns.bytes_len("ngrokHost"), 0);
    }

    #[test]
    fn test_read_only_namespace_refuses_clear() {
        let dir = TempDir::new().unwrap();
        let prefs = FilePreferences::new(dir.path());

        let mut ns = prefs.open("vehicle_config", true).unwrap();
        assert!(matches!(ns.clear(), Err(StorageError::ReadOnly(_))));
        ns.close().unwrap();
        assert!(!dir.path().join("vehicle_config.json").exists());
    }
}
