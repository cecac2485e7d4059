//! Byte-stream stores that hold index artifacts.

use crate::error::IndexError;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Named byte streams: sequential writes, seekable reads.
///
/// Writers do not need to seek; the index writer tracks its own offset.
pub trait Storage: Send + Sync {
    type Reader: io::Read + io::Seek + Send;
    type Writer: io::Write + Send;

    fn open_read(&self, name: &str) -> Result<Self::Reader>;
    /// Create or truncate `name`.
    fn open_write(&self, name: &str) -> Result<Self::Writer>;
    fn exists(&self, name: &str) -> bool;
    fn remove(&self, name: &str) -> Result<()>;
}

/// Artifacts stored as files under one directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    pub root: PathBuf,
}

impl FsStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn path(&self, name: &str) -> PathBuf { self.root.join(name) }
}

impl Storage for FsStore {
    type Reader = BufReader<File>;
    type Writer = BufWriter<File>;

    fn open_read(&self, name: &str) -> Result<Self::Reader> {
        let path = self.path(name);
        match File::open(&path) {
            Ok(f) => Ok(BufReader::new(f)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(IndexError::Missing(path.display().to_string()).into()),
            Err(e) => Err(e).with_context(|| format!("opening {}", path.display())),
        }
    }

    fn open_write(&self, name: &str) -> Result<Self::Writer> {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let f = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        Ok(BufWriter::new(f))
    }

    fn exists(&self, name: &str) -> bool { self.path(name).is_file() }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.path(name);
        fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))
    }
}

type Blobs = Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>;

/// In-process store. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: Blobs,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn size(&self, name: &str) -> Option<usize> { self.blobs.read().get(name).map(|b| b.len()) }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blobs.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Buffers writes and publishes the blob on `flush` and on drop.
pub struct MemoryWriter {
    name: String,
    buf: Vec<u8>,
    blobs: Blobs,
}

impl Write for MemoryWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.blobs.write().insert(self.name.clone(), Arc::new(self.buf.clone()));
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.blobs.write().insert(std::mem::take(&mut self.name), Arc::new(buf));
    }
}

impl Storage for MemoryStore {
    type Reader = Cursor<Vec<u8>>;
    type Writer = MemoryWriter;

    fn open_read(&self, name: &str) -> Result<Self::Reader> {
        let blob = self.blobs.read().get(name).cloned().ok_or_else(|| IndexError::Missing(name.to_string()))?;
        Ok(Cursor::new(blob.as_ref().clone()))
    }

    fn open_write(&self, name: &str) -> Result<Self::Writer> {
        self.blobs.write().insert(name.to_string(), Arc::new(Vec::new()));
        Ok(MemoryWriter { name: name.to_string(), buf: Vec::new(), blobs: self.blobs.clone() })
    }

    fn exists(&self, name: &str) -> bool { self.blobs.read().contains_key(name) }

    fn remove(&self, name: &str) -> Result<()> {
        self.blobs.write().remove(name).map(|_| ()).ok_or_else(|| IndexError::Missing(name.to_string()).into())
    }
}
