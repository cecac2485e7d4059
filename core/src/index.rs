//! On-disk inverted index: a postings blob (`{name}.index`) plus a bincode
//! metadata file (`{name}.dict`) that locates every term's spans in the blob.

use crate::codec::PostingsCodec;
use crate::error::IndexError;
use crate::merge::merge_by_doc_id;
use crate::storage::Storage;
use crate::{DocId, TermId};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

pub fn index_file_name(index_name: &str) -> String { format!("{index_name}.index") }

pub fn metadata_file_name(index_name: &str) -> String { format!("{index_name}.dict") }

/// Location of one term's postings in the blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingsEntry {
    /// Byte offset of the encoded doc ids; the encoded tfs follow immediately.
    pub offset: u64,
    /// Document frequency.
    pub count: u32,
    pub postings_len: u32,
    pub tf_len: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub codec: String,
    pub postings_dict: HashMap<TermId, PostingsEntry>,
    /// Term ids in append order, which is strictly ascending.
    pub terms: Vec<TermId>,
    /// Tokens per document, summed over appended term frequencies.
    pub doc_length: HashMap<DocId, u32>,
}

impl IndexMetadata {
    pub fn load<S: Storage>(store: &S, index_name: &str) -> Result<Self> {
        let name = metadata_file_name(index_name);
        let f = store.open_read(&name)?;
        let meta = bincode::deserialize_from(f).with_context(|| format!("decoding {name}"))?;
        Ok(meta)
    }

    pub fn num_docs(&self) -> usize { self.doc_length.len() }

    pub fn num_terms(&self) -> usize { self.terms.len() }

    pub fn avg_doc_length(&self) -> f64 {
        if self.doc_length.is_empty() {
            return 0.0;
        }
        let total: u64 = self.doc_length.values().map(|&l| l as u64).sum();
        total as f64 / self.doc_length.len() as f64
    }

    pub fn contains(&self, term_id: TermId) -> bool { self.postings_dict.contains_key(&term_id) }

    pub fn entry(&self, term_id: TermId) -> Option<&PostingsEntry> { self.postings_dict.get(&term_id) }
}

/// Doc ids (ascending) and their term frequencies, index-aligned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingsList {
    pub doc_ids: Vec<DocId>,
    pub tfs: Vec<u32>,
}

impl PostingsList {
    pub fn new(doc_ids: Vec<DocId>, tfs: Vec<u32>) -> Self { Self { doc_ids, tfs } }

    pub fn len(&self) -> usize { self.doc_ids.len() }

    pub fn is_empty(&self) -> bool { self.doc_ids.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, u32)> + '_ {
        self.doc_ids.iter().copied().zip(self.tfs.iter().copied())
    }

    /// Interleave two lists by doc id. Shared doc ids have their tfs summed.
    pub fn merge(&self, other: &PostingsList) -> PostingsList {
        let (doc_ids, tfs) = merge_by_doc_id(&self.doc_ids, &self.tfs, &other.doc_ids, &other.tfs);
        PostingsList { doc_ids, tfs }
    }
}

/// Append-only writer. Metadata becomes visible only through [`finish`](Self::finish).
pub struct InvertedIndexWriter<'a, S: Storage, C: PostingsCodec> {
    store: &'a S,
    name: String,
    codec: C,
    index_file: S::Writer,
    offset: u64,
    metadata: IndexMetadata,
    finished: bool,
}

impl<'a, S: Storage, C: PostingsCodec> InvertedIndexWriter<'a, S, C> {
    /// Any metadata left by an earlier index of the same name is removed first,
    /// so the new blob is never paired with stale offsets.
    pub fn create(store: &'a S, index_name: &str, codec: C) -> Result<Self> {
        let meta_name = metadata_file_name(index_name);
        if store.exists(&meta_name) {
            store.remove(&meta_name)?;
        }
        let index_file = store.open_write(&index_file_name(index_name))?;
        let metadata = IndexMetadata { codec: codec.name().to_string(), ..Default::default() };
        Ok(Self { store, name: index_name.to_string(), codec, index_file, offset: 0, metadata, finished: false })
    }

    pub fn name(&self) -> &str { &self.name }

    /// Number of blob bytes written so far.
    pub fn tell(&self) -> u64 { self.offset }

    /// Append one term. Terms must arrive in strictly ascending order, each at most once.
    pub fn append(&mut self, term_id: TermId, doc_ids: &[DocId], tfs: &[u32]) -> Result<()> {
        if let Some(&last) = self.metadata.terms.last() {
            if term_id <= last {
                return Err(IndexError::TermOutOfOrder { term: term_id, last }.into());
            }
        }
        if doc_ids.len() != tfs.len() {
            return Err(IndexError::LengthMismatch { term: term_id, postings: doc_ids.len(), tfs: tfs.len() }.into());
        }
        if doc_ids.is_empty() {
            return Err(IndexError::EmptyPostings(term_id).into());
        }
        if let Some(w) = doc_ids.windows(2).find(|w| w[1] <= w[0]) {
            return Err(IndexError::UnsortedPostings { term: term_id, doc_id: w[1] }.into());
        }

        let encoded_postings = self.codec.encode(doc_ids);
        let encoded_tf = self.codec.encode_tf(tfs);
        let entry = PostingsEntry {
            offset: self.offset,
            count: doc_ids.len() as u32,
            postings_len: encoded_postings.len() as u32,
            tf_len: encoded_tf.len() as u32,
        };

        self.index_file.write_all(&encoded_postings)?;
        self.index_file.write_all(&encoded_tf)?;
        self.offset += (encoded_postings.len() + encoded_tf.len()) as u64;

        self.metadata.terms.push(term_id);
        self.metadata.postings_dict.insert(term_id, entry);
        for (&doc_id, &tf) in doc_ids.iter().zip(tfs) {
            *self.metadata.doc_length.entry(doc_id).or_insert(0) += tf;
        }
        Ok(())
    }

    pub fn append_list(&mut self, term_id: TermId, list: &PostingsList) -> Result<()> {
        self.append(term_id, &list.doc_ids, &list.tfs)
    }

    /// Flush the blob, then persist metadata. Until this succeeds the index cannot be opened.
    pub fn finish(mut self) -> Result<IndexMetadata> {
        self.index_file.flush()?;
        let meta_name = metadata_file_name(&self.name);
        let mut f = self.store.open_write(&meta_name)?;
        bincode::serialize_into(&mut f, &self.metadata).with_context(|| format!("encoding {meta_name}"))?;
        f.flush()?;
        self.finished = true;
        tracing::debug!(index = %self.name, terms = self.metadata.terms.len(), bytes = self.offset, "index finished");
        Ok(std::mem::take(&mut self.metadata))
    }
}

impl<S: Storage, C: PostingsCodec> Drop for InvertedIndexWriter<'_, S, C> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.index_file.flush();
            tracing::warn!(index = %self.name, "index writer dropped before finish; metadata not written");
        }
    }
}

/// Reader over a finished index. Metadata is held in memory; postings are
/// streamed from storage one term at a time.
pub struct InvertedIndexReader<R: Read + Seek, C: PostingsCodec> {
    name: String,
    codec: C,
    index_file: R,
    position: u64,
    metadata: Arc<IndexMetadata>,
    cursor: usize,
}

impl<R: Read + Seek, C: PostingsCodec> InvertedIndexReader<R, C> {
    pub fn open<S: Storage<Reader = R>>(store: &S, index_name: &str, codec: C) -> Result<Self> {
        let metadata = Arc::new(IndexMetadata::load(store, index_name)?);
        Self::with_metadata(store, index_name, codec, metadata)
    }

    /// Open the blob stream against metadata that was already loaded.
    pub fn with_metadata<S: Storage<Reader = R>>(
        store: &S,
        index_name: &str,
        codec: C,
        metadata: Arc<IndexMetadata>,
    ) -> Result<Self> {
        if metadata.codec != codec.name() {
            return Err(IndexError::CodecMismatch { expected: codec.name().to_string(), found: metadata.codec.clone() }.into());
        }
        let index_file = store.open_read(&index_file_name(index_name))?;
        Ok(Self { name: index_name.to_string(), codec, index_file, position: 0, metadata, cursor: 0 })
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn metadata(&self) -> &Arc<IndexMetadata> { &self.metadata }

    pub fn doc_length(&self) -> &HashMap<DocId, u32> { &self.metadata.doc_length }

    /// Rewind both the blob cursor and the term cursor.
    pub fn reset(&mut self) -> Result<()> {
        self.index_file.seek(SeekFrom::Start(0))?;
        self.position = 0;
        self.cursor = 0;
        Ok(())
    }

    /// Next term in ascending order with its postings, or `None` at the end.
    pub fn next_term(&mut self) -> Result<Option<(TermId, PostingsList)>> {
        let Some(&term_id) = self.metadata.terms.get(self.cursor) else {
            return Ok(None);
        };
        let entry = *self.metadata.entry(term_id).ok_or(IndexError::TermNotFound(term_id))?;
        let list = self.read_entry(&entry)?;
        self.cursor += 1;
        Ok(Some((term_id, list)))
    }

    /// Single seek to the term's recorded offset, then one read of both spans.
    pub fn get_postings_list(&mut self, term_id: TermId) -> Result<PostingsList> {
        let entry = *self.metadata.entry(term_id).ok_or(IndexError::TermNotFound(term_id))?;
        self.read_entry(&entry)
    }

    fn read_entry(&mut self, entry: &PostingsEntry) -> Result<PostingsList> {
        if self.position != entry.offset {
            self.index_file.seek(SeekFrom::Start(entry.offset))?;
        }
        let mut buf = vec![0u8; (entry.postings_len + entry.tf_len) as usize];
        if let Err(e) = self.index_file.read_exact(&mut buf) {
            // stream position is unknown after a partial read
            self.position = u64::MAX;
            return Err(IndexError::Corrupt(format!("{}: short read at offset {}: {e}", self.name, entry.offset)).into());
        }
        self.position = entry.offset + buf.len() as u64;

        let (postings_bytes, tf_bytes) = buf.split_at(entry.postings_len as usize);
        let doc_ids = self.codec.decode(postings_bytes)?;
        let tfs = self.codec.decode_tf(tf_bytes)?;
        if doc_ids.len() != entry.count as usize || tfs.len() != entry.count as usize {
            return Err(IndexError::Corrupt(format!(
                "{}: expected {} postings, decoded {} doc ids and {} tfs",
                self.name,
                entry.count,
                doc_ids.len(),
                tfs.len()
            ))
            .into());
        }
        Ok(PostingsList { doc_ids, tfs })
    }
}

impl<R: Read + Seek, C: PostingsCodec> Iterator for InvertedIndexReader<R, C> {
    type Item = Result<(TermId, PostingsList)>;

    fn next(&mut self) -> Option<Self::Item> { self.next_term().transpose() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecKind, StandardPostings, VbePostings};
    use crate::storage::MemoryStore;

    fn write_sample<C: PostingsCodec>(store: &MemoryStore, codec: C) {
        let mut w = InvertedIndexWriter::create(store, "sample", codec).unwrap();
        w.append(1, &[2, 3, 4, 8, 10], &[2, 4, 2, 3, 30]).unwrap();
        w.append(2, &[3, 4, 5], &[34, 23, 56]).unwrap();
        w.append(7, &[1, 700, 70_000], &[1, 1, 1]).unwrap();
        w.finish().unwrap();
    }

    #[test]
    fn metadata_records_offsets_and_doc_lengths() {
        let store = MemoryStore::new();
        write_sample(&store, VbePostings);
        let meta = IndexMetadata::load(&store, "sample").unwrap();
        assert_eq!(meta.codec, "vbe");
        assert_eq!(meta.terms, vec![1, 2, 7]);
        assert_eq!(meta.postings_dict[&1], PostingsEntry { offset: 0, count: 5, postings_len: 5, tf_len: 5 });
        assert_eq!(meta.postings_dict[&2], PostingsEntry { offset: 10, count: 3, postings_len: 3, tf_len: 3 });
        assert_eq!(meta.postings_dict[&7].offset, 16);
        assert_eq!(meta.doc_length[&3], 4 + 34);
        assert_eq!(meta.doc_length[&10], 30);
        assert_eq!(meta.num_docs(), 9);
        let blob_len = store.size("sample.index").unwrap() as u64;
        let last = meta.postings_dict[&7];
        assert_eq!(blob_len, last.offset + (last.postings_len + last.tf_len) as u64);
    }

    #[test]
    fn random_access_matches_sequential_scan() {
        for codec in [CodecKind::Vbe, CodecKind::Standard] {
            let store = MemoryStore::new();
            write_sample(&store, codec);
            let mut reader = InvertedIndexReader::open(&store, "sample", codec).unwrap();
            let scanned: Vec<(TermId, PostingsList)> = reader.by_ref().collect::<Result<_>>().unwrap();
            assert_eq!(scanned.len(), 3);
            for (term, list) in scanned.iter().rev() {
                assert_eq!(&reader.get_postings_list(*term).unwrap(), list);
            }
            assert_eq!(scanned[2].1.doc_ids, vec![1, 700, 70_000]);
        }
    }

    #[test]
    fn reset_rewinds_iteration_after_random_access() {
        let store = MemoryStore::new();
        write_sample(&store, VbePostings);
        let mut reader = InvertedIndexReader::open(&store, "sample", VbePostings).unwrap();
        let (first, _) = reader.next_term().unwrap().unwrap();
        assert_eq!(first, 1);
        reader.get_postings_list(7).unwrap();
        let (second, list) = reader.next_term().unwrap().unwrap();
        assert_eq!(second, 2);
        assert_eq!(list.tfs, vec![34, 23, 56]);
        reader.reset().unwrap();
        let terms: Vec<TermId> = reader.map(|r| r.unwrap().0).collect();
        assert_eq!(terms, vec![1, 2, 7]);
    }

    #[test]
    fn absent_term_is_not_found() {
        let store = MemoryStore::new();
        write_sample(&store, VbePostings);
        let mut reader = InvertedIndexReader::open(&store, "sample", VbePostings).unwrap();
        let err = reader.get_postings_list(3).unwrap_err();
        assert_eq!(err.downcast_ref::<IndexError>(), Some(&IndexError::TermNotFound(3)));
    }

    #[test]
    fn append_rejects_precondition_violations() {
        let store = MemoryStore::new();
        let mut w = InvertedIndexWriter::create(&store, "bad", VbePostings).unwrap();
        w.append(5, &[1], &[1]).unwrap();
        let err = w.append(5, &[2], &[1]).unwrap_err();
        assert_eq!(err.downcast_ref::<IndexError>(), Some(&IndexError::TermOutOfOrder { term: 5, last: 5 }));
        let err = w.append(6, &[1, 2], &[1]).unwrap_err();
        assert!(matches!(err.downcast_ref::<IndexError>(), Some(IndexError::LengthMismatch { .. })));
        let err = w.append(6, &[4, 2], &[1, 1]).unwrap_err();
        assert_eq!(err.downcast_ref::<IndexError>(), Some(&IndexError::UnsortedPostings { term: 6, doc_id: 2 }));
        let err = w.append(6, &[], &[]).unwrap_err();
        assert_eq!(err.downcast_ref::<IndexError>(), Some(&IndexError::EmptyPostings(6)));
        assert_eq!(w.tell(), 2);
    }

    #[test]
    fn unfinished_writer_publishes_no_metadata() {
        let store = MemoryStore::new();
        {
            let mut w = InvertedIndexWriter::create(&store, "partial", VbePostings).unwrap();
            w.append(0, &[0], &[1]).unwrap();
        }
        assert!(store.exists("partial.index"));
        assert!(!store.exists("partial.dict"));
        let err = InvertedIndexReader::open(&store, "partial", VbePostings).err().unwrap();
        assert!(matches!(err.downcast_ref::<IndexError>(), Some(IndexError::Missing(_))));
    }

    #[test]
    fn recreating_an_index_drops_its_old_metadata() {
        let store = MemoryStore::new();
        write_sample(&store, VbePostings);
        {
            let mut w = InvertedIndexWriter::create(&store, "sample", VbePostings).unwrap();
            w.append(0, &[0], &[1]).unwrap();
        }
        assert!(!store.exists("sample.dict"));
        let err = InvertedIndexReader::open(&store, "sample", VbePostings).err().unwrap();
        assert!(matches!(err.downcast_ref::<IndexError>(), Some(IndexError::Missing(_))));
    }

    #[test]
    fn failed_read_does_not_desync_the_next_one() {
        let store = MemoryStore::new();
        write_sample(&store, VbePostings);
        let mut blob = Vec::new();
        store.open_read("sample.index").unwrap().read_to_end(&mut blob).unwrap();
        // keep terms 1 and 2, cut term 7
        let mut f = store.open_write("sample.index").unwrap();
        f.write_all(&blob[..16]).unwrap();
        f.flush().unwrap();
        drop(f);

        let mut reader = InvertedIndexReader::open(&store, "sample", VbePostings).unwrap();
        assert_eq!(reader.get_postings_list(1).unwrap().doc_ids, vec![2, 3, 4, 8, 10]);
        let err = reader.get_postings_list(7).unwrap_err();
        assert!(matches!(err.downcast_ref::<IndexError>(), Some(IndexError::Corrupt(_))));
        assert_eq!(reader.get_postings_list(2).unwrap().tfs, vec![34, 23, 56]);
    }

    #[test]
    fn reader_rejects_other_codec() {
        let store = MemoryStore::new();
        write_sample(&store, StandardPostings);
        let err = InvertedIndexReader::open(&store, "sample", VbePostings).err().unwrap();
        assert_eq!(
            err.downcast_ref::<IndexError>(),
            Some(&IndexError::CodecMismatch { expected: "vbe".into(), found: "standard".into() })
        );
    }

    #[test]
    fn merge_interleaves_lists() {
        let a = PostingsList::new(vec![1, 3], vec![2, 1]);
        let b = PostingsList::new(vec![2, 4], vec![5, 3]);
        let m = a.merge(&b);
        assert_eq!(m.doc_ids, vec![1, 2, 3, 4]);
        assert_eq!(m.tfs, vec![2, 5, 1, 3]);
        assert_eq!(m.iter().nth(1), Some((2, 5)));
    }
}
