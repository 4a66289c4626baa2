use std::{
    fs, io,
    path::{Path, PathBuf},
};

use hearttrack_device::{MemoryStorage, Storage, StorageError};

/// Storage image kept in a single file. Every write replaces the file
/// atomically through a temporary sibling and a rename, so a crash leaves
/// either the old or the new image.
pub struct FileStorage {
    path: PathBuf,
    image: MemoryStorage,
}

impl FileStorage {
    /// A missing file is an empty (all zero) image.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(error) => return Err(error.into()),
        };

        Ok(Self {
            path,
            image: MemoryStorage::from_bytes(bytes),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StorageError> {
        let temp = self.path.with_extension("tmp");
        fs::write(&temp, self.image.as_bytes())?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        self.image.read(offset, buf)
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StorageError> {
        self.image.write(offset, bytes)?;
        self.flush()
    }
}
