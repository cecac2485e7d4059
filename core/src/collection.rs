//! Document collections, organised as blocks of documents.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A collection enumerated block by block. Enumeration order must be stable
/// so that indexing runs are reproducible.
pub trait Collection {
    /// Block names in sorted order.
    fn blocks(&self) -> Result<Vec<String>>;
    /// Document keys of one block in sorted order.
    fn documents(&self, block: &str) -> Result<Vec<String>>;
    fn read_document(&self, doc_key: &str) -> Result<String>;
}

/// Every immediate subdirectory of `root` is a block; every file inside it is
/// a document keyed as `block/file_name`.
#[derive(Debug, Clone)]
pub struct DirCollection {
    pub root: PathBuf,
}

impl DirCollection {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn children(&self, dir: &Path, want_dirs: bool) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
            let ft = entry.file_type();
            if (want_dirs && ft.is_dir()) || (!want_dirs && ft.is_file()) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }
}

impl Collection for DirCollection {
    fn blocks(&self) -> Result<Vec<String>> { self.children(&self.root, true) }

    fn documents(&self, block: &str) -> Result<Vec<String>> {
        let files = self.children(&self.root.join(block), false)?;
        Ok(files.into_iter().map(|f| format!("{block}/{f}")).collect())
    }

    fn read_document(&self, doc_key: &str) -> Result<String> {
        let path = self.root.join(doc_key);
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))
    }
}

/// Collection held in memory, keyed by block then document key.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCollection {
    blocks: BTreeMap<String, BTreeMap<String, String>>,
}

impl InMemoryCollection {
    pub fn new() -> Self { Self::default() }

    /// Add a document; its key is `block/name`.
    pub fn insert(&mut self, block: &str, name: &str, text: &str) -> &mut Self {
        self.blocks
            .entry(block.to_string())
            .or_default()
            .insert(format!("{block}/{name}"), text.to_string());
        self
    }
}

impl Collection for InMemoryCollection {
    fn blocks(&self) -> Result<Vec<String>> { Ok(self.blocks.keys().cloned().collect()) }

    fn documents(&self, block: &str) -> Result<Vec<String>> {
        let docs = self.blocks.get(block).with_context(|| format!("no block named {block}"))?;
        Ok(docs.keys().cloned().collect())
    }

    fn read_document(&self, doc_key: &str) -> Result<String> {
        let block = doc_key.split('/').next().unwrap_or_default();
        self.blocks
            .get(block)
            .and_then(|docs| docs.get(doc_key))
            .cloned()
            .with_context(|| format!("no document named {doc_key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_collection_lists_sorted_blocks_and_documents() {
        let dir = tempfile::tempdir().unwrap();
        for (block, file) in [("2", "b.txt"), ("1", "z.txt"), ("1", "a.txt")] {
            fs::create_dir_all(dir.path().join(block)).unwrap();
            fs::write(dir.path().join(block).join(file), "x").unwrap();
        }
        fs::write(dir.path().join("stray.txt"), "not a block").unwrap();

        let c = DirCollection::new(dir.path());
        assert_eq!(c.blocks().unwrap(), vec!["1", "2"]);
        assert_eq!(c.documents("1").unwrap(), vec!["1/a.txt", "1/z.txt"]);
        assert_eq!(c.read_document("2/b.txt").unwrap(), "x");
        assert!(c.read_document("2/missing.txt").is_err());
    }

    #[test]
    fn in_memory_collection_round_trips() {
        let mut c = InMemoryCollection::new();
        c.insert("b", "d2", "two").insert("a", "d1", "one");
        assert_eq!(c.blocks().unwrap(), vec!["a", "b"]);
        assert_eq!(c.documents("b").unwrap(), vec!["b/d2"]);
        assert_eq!(c.read_document("a/d1").unwrap(), "one");
        assert!(c.documents("c").is_err());
    }
}
