// Last-synced fingerprint persistence

use std::path::PathBuf;
use std::sync::Mutex;

pub trait FingerprintStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, fingerprint: &str) -> std::io::Result<()>;
}

/// Single-line file, replaced atomically through a sibling temp file
pub struct FileFingerprintStore {
    path: PathBuf,
}

impl FileFingerprintStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FingerprintStore for FileFingerprintStore {
    fn load(&self) -> Option<String> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn save(&self, fingerprint: &str) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, fingerprint)?;
        std::fs::rename(&tmp, &self.path)
    }
}

#[derive(Default)]
pub struct MemoryFingerprintStore {
    value: Mutex<Option<String>>,
}

impl MemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FingerprintStore for MemoryFingerprintStore {
    fn load(&self) -> Option<String> {
        match self.value.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn save(&self, fingerprint: &str) -> std::io::Result<()> {
        let mut guard = match self.value.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(fingerprint.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileFingerprintStore::new(dir.path().join("nested/fingerprint"));
        assert_eq!(store.load(), None);
        store.save("abc123").unwrap();
        assert_eq!(store.load().as_deref(), Some("abc123"));
        store.save("def456").unwrap();
        assert_eq!(store.load().as_deref(), Some("def456"));
        assert!(!dir.path().join("nested/fingerprint.tmp").exists());
    }
}
