//! Sources of unit bytes

use dashmap::DashMap;
use std::path::{Path, PathBuf};

/// File extension of encoded units on disk
pub const UNIT_EXTENSION: &str = "unit";

/// External supplier of compiled units
///
/// Consulted by a pool only after its own cache and its parents miss.
pub trait UnitProvider: Send + Sync {
    /// Encoded bytes of the unit named `name` (slash form), if known
    fn get_bytes(&self, name: &str) -> Option<Vec<u8>>;
}

/// Units compiled in memory
#[derive(Debug, Default)]
pub struct MemoryProvider {
    units: DashMap<String, Vec<u8>>,
}

impl MemoryProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a unit
    pub fn insert(&self, name: impl Into<String>, bytes: Vec<u8>) {
        self.units.insert(name.into(), bytes);
    }

    /// Number of registered units
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Check if no unit is registered
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, Vec<u8>)> for MemoryProvider {
    fn from_iter<I: IntoIterator<Item = (N, Vec<u8>)>>(iter: I) -> Self {
        let provider = Self::new();
        for (name, bytes) in iter {
            provider.insert(name, bytes);
        }
        provider
    }
}

impl UnitProvider for MemoryProvider {
    fn get_bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.units.get(name).map(|entry| entry.value().clone())
    }
}

/// Units stored as `<root>/<slash/name>.unit`
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    /// Serve units below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a unit name maps to
    pub fn path_of(&self, name: &str) -> Option<PathBuf> {
        unit_path(&self.root, name)
    }
}

impl UnitProvider for DirectoryProvider {
    fn get_bytes(&self, name: &str) -> Option<Vec<u8>> {
        let path = self.path_of(name)?;
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %err, "unreadable unit file");
                }
                None
            }
        }
    }
}

/// `<root>/<slash/name>.unit`, or `None` for names that would escape `root`
pub(crate) fn unit_path(root: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty()
        || name.starts_with('/')
        || name.split('/').any(|part| part.is_empty() || part == "." || part == "..")
    {
        return None;
    }
    let mut path = root.to_path_buf();
    for part in name.split('/') {
        path.push(part);
    }
    path.set_extension(UNIT_EXTENSION);
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_provider() {
        let provider: MemoryProvider = [("pkg/A", vec![1, 2, 3])].into_iter().collect();
        assert_eq!(provider.get_bytes("pkg/A"), Some(vec![1, 2, 3]));
        assert_eq!(provider.get_bytes("pkg/B"), None);
        assert_eq!(provider.len(), 1);
    }

    #[test]
    fn test_directory_provider() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg").join("Outer$Inner.unit"), b"bytes").unwrap();

        let provider = DirectoryProvider::new(dir.path());
        assert_eq!(provider.get_bytes("pkg/Outer$Inner"), Some(b"bytes".to_vec()));
        assert_eq!(provider.get_bytes("pkg/Missing"), None);
    }

    #[test]
    fn test_path_rejects_escapes() {
        let root = Path::new("/units");
        assert!(unit_path(root, "../etc/passwd").is_none());
        assert!(unit_path(root, "/abs").is_none());
        assert!(unit_path(root, "pkg//A").is_none());
        assert_eq!(
            unit_path(root, "pkg/A").unwrap(),
            PathBuf::from("/units/pkg/A.unit")
        );
    }
}
