use crate::StorageError;

/// Byte-addressed persistent image. Writes replace the addressed range in
/// full.
pub trait Storage {
    /// Bytes never written read back as zero.
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    bytes: Vec<u8>,
    limit: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes, limit: None }
    }

    /// Image that rejects access past `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit: Some(limit),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn check(&self, offset: usize, len: usize) -> Result<(), StorageError> {
        match self.limit {
            Some(limit) if offset + len > limit => Err(StorageError::OutOfBounds { offset, len }),
            _ => Ok(()),
        }
    }
}

impl Storage for MemoryStorage {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        self.check(offset, buf.len())?;
        buf.fill(0);
        if let Some(stored) = self.bytes.get(offset..) {
            let len = stored.len().min(buf.len());
            buf[..len].copy_from_slice(&stored[..len]);
        }
        Ok(())
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StorageError> {
        self.check(offset, bytes.len())?;
        let end = offset + bytes.len();
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
        self.bytes[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}
