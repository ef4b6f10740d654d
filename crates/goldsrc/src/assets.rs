use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// File-system-like store the client reads local resources from and
/// writes downloads into. Paths are relative and `/` separated.
pub trait AssetStore {
    fn exists(&self, path: &str) -> bool;
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;
    fn write(&mut self, path: &str, data: &[u8]) -> io::Result<()>;
}

/// Assets rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins `path` onto the root, refusing anything that would escape it.
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });

        if escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("asset path {:?} escapes the asset root", path),
            ));
        }

        Ok(self.root.join(relative))
    }
}

impl AssetStore for DirectoryAssets {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path)?)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> io::Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, data)
    }
}

/// In-memory assets, mostly useful for tests and tools.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), data.into());
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl AssetStore for MemoryAssets {
    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }

    fn write(&mut self, path: &str, data: &[u8]) -> io::Result<()> {
        self.files.insert(path.to_string(), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_round_trip() {
        let mut assets = MemoryAssets::new();
        assert!(!assets.exists("valve/sound/a.wav"));

        assets.write("valve/sound/a.wav", b"RIFF").unwrap();
        assert!(assets.exists("valve/sound/a.wav"));
        assert_eq!(assets.read("valve/sound/a.wav").unwrap(), b"RIFF");
        assert_eq!(
            assets.read("missing").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_directory_creates_parents() {
        let root = std::env::temp_dir().join(format!("goldsrc-assets-{}", std::process::id()));
        let mut assets = DirectoryAssets::new(&root);

        assets.write("cstrike/maps/de_test.bsp", b"BSP").unwrap();
        assert!(assets.exists("cstrike/maps/de_test.bsp"));
        assert_eq!(assets.read("cstrike/maps/de_test.bsp").unwrap(), b"BSP");

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_directory_rejects_escape() {
        let mut assets = DirectoryAssets::new(std::env::temp_dir());
        assert!(!assets.exists("../etc/passwd"));
        assert!(assets.write("/tmp/evil", b"x").is_err());
    }
}
