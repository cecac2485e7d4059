//! Blocked sort-based indexing: each block is parsed and inverted in memory
//! into its own intermediate index, then all intermediates are merged.

use crate::codec::{CodecKind, PostingsCodec};
use crate::collection::Collection;
use crate::error::IndexError;
use crate::idmap::IdMap;
use crate::index::{index_file_name, metadata_file_name, InvertedIndexReader, InvertedIndexWriter};
use crate::merge::merge_indices;
use crate::persist::{self, Manifest, DOCS_FILE, MANIFEST_FILE, MANIFEST_VERSION, TERMS_FILE};
use crate::storage::Storage;
use crate::tokenizer::{Normalizer, NormalizerConfig, TextNormalizer};
use crate::{DocId, TermId};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Name of the merged index.
    pub index_name: String,
    pub codec: CodecKind,
    /// Remove intermediate indices once the merge has succeeded.
    pub cleanup_intermediate: bool,
    /// Recorded in the manifest so searchers normalize queries the same way.
    pub normalizer: NormalizerConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_name: "main_index".to_string(),
            codec: CodecKind::Vbe,
            cleanup_intermediate: false,
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl IndexConfig {
    /// The merged index must not share a file with the id maps or an intermediate index.
    pub fn validate(&self) -> Result<()> {
        let meta = metadata_file_name(&self.index_name);
        let name = &self.index_name;
        if name.is_empty() || meta == TERMS_FILE || meta == DOCS_FILE || name.starts_with(INTERMEDIATE_PREFIX) {
            return Err(IndexError::ReservedName(name.clone()).into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    pub blocks: usize,
    pub num_docs: usize,
    pub num_terms: usize,
    pub skipped_docs: usize,
}

const INTERMEDIATE_PREFIX: &str = "intermediate_index_";

pub fn intermediate_name(block: &str) -> String { format!("{INTERMEDIATE_PREFIX}{block}") }

pub struct BsbiIndexer<'a, S: Storage> {
    store: &'a S,
    config: IndexConfig,
    normalizer: Arc<dyn Normalizer>,
    pub term_id_map: IdMap,
    pub doc_id_map: IdMap,
    intermediate_indices: Vec<String>,
    skipped_docs: usize,
}

impl<'a, S: Storage> BsbiIndexer<'a, S> {
    pub fn new(store: &'a S, config: IndexConfig, normalizer: Arc<dyn Normalizer>) -> Self {
        Self {
            store,
            config,
            normalizer,
            term_id_map: IdMap::new(),
            doc_id_map: IdMap::new(),
            intermediate_indices: Vec::new(),
            skipped_docs: 0,
        }
    }

    /// Indexer using [`TextNormalizer`] configured from `config.normalizer`.
    pub fn with_text_normalizer(store: &'a S, config: IndexConfig) -> Self {
        let normalizer = Arc::new(TextNormalizer::new(config.normalizer));
        Self::new(store, config, normalizer)
    }

    pub fn config(&self) -> &IndexConfig { &self.config }

    pub fn intermediate_indices(&self) -> &[String] { &self.intermediate_indices }

    /// Parse one block into `(term_id, doc_id)` pairs, one per token occurrence.
    ///
    /// Unreadable or blank documents are skipped and never receive a doc id.
    pub fn parse_block(&mut self, collection: &dyn Collection, block: &str) -> Result<Vec<(TermId, DocId)>> {
        let mut td_pairs = Vec::new();
        for doc_key in collection.documents(block).with_context(|| format!("listing block {block}"))? {
            let content = match collection.read_document(&doc_key) {
                Ok(c) if !c.trim().is_empty() => c,
                Ok(_) => {
                    tracing::warn!(doc = %doc_key, "skipping empty document");
                    self.skipped_docs += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(doc = %doc_key, error = %e, "skipping unreadable document");
                    self.skipped_docs += 1;
                    continue;
                }
            };
            let doc_id = self.doc_id_map.get_or_insert(&doc_key);
            for token in self.normalizer.normalize(&content) {
                td_pairs.push((self.term_id_map.get_or_insert(&token), doc_id));
            }
        }
        Ok(td_pairs)
    }

    /// Invert one block's pairs and append every term, in ascending term id
    /// order, to `index`.
    pub fn invert_block<C: PostingsCodec>(
        td_pairs: &[(TermId, DocId)],
        index: &mut InvertedIndexWriter<'_, S, C>,
    ) -> Result<()> {
        let mut term_dict: HashMap<TermId, HashMap<DocId, u32>> = HashMap::new();
        for &(term_id, doc_id) in td_pairs {
            *term_dict.entry(term_id).or_default().entry(doc_id).or_insert(0) += 1;
        }

        let mut term_ids: Vec<TermId> = term_dict.keys().copied().collect();
        term_ids.sort_unstable();
        for term_id in term_ids {
            let mut docs: Vec<(DocId, u32)> = term_dict.remove(&term_id).unwrap_or_default().into_iter().collect();
            docs.sort_unstable_by_key(|&(doc_id, _)| doc_id);
            let (doc_ids, tfs): (Vec<DocId>, Vec<u32>) = docs.into_iter().unzip();
            index.append(term_id, &doc_ids, &tfs)?;
        }
        Ok(())
    }

    /// External merge of the named intermediate indices into `merged`.
    pub fn merge<C: PostingsCodec>(&self, names: &[String], merged: &mut InvertedIndexWriter<'_, S, C>) -> Result<usize> {
        let mut readers = names
            .iter()
            .map(|name| InvertedIndexReader::open(self.store, name, self.config.codec))
            .collect::<Result<Vec<_>>>()?;
        merge_indices(&mut readers, merged)
    }

    /// Persist the term and document id maps.
    pub fn save(&self) -> Result<()> {
        persist::save_id_map(self.store, TERMS_FILE, &self.term_id_map)?;
        persist::save_id_map(self.store, DOCS_FILE, &self.doc_id_map)?;
        Ok(())
    }

    /// Index every block of `collection`, then merge the intermediates into the
    /// configured index. The merge only starts after every block succeeded.
    ///
    /// A previous index of the same name is unpublished before any block is
    /// read, so a failed run leaves nothing that can be opened.
    pub fn do_indexing(&mut self, collection: &dyn Collection) -> Result<IndexSummary> {
        self.config.validate()?;
        self.intermediate_indices.clear();
        self.skipped_docs = 0;
        for stale in [metadata_file_name(&self.config.index_name), MANIFEST_FILE.to_string()] {
            if self.store.exists(&stale) {
                self.store.remove(&stale)?;
            }
        }

        let blocks = collection.blocks()?;
        for block in &blocks {
            let td_pairs = self.parse_block(collection, block)?;
            let index_name = intermediate_name(block);
            let mut writer = InvertedIndexWriter::create(self.store, &index_name, self.config.codec)?;
            Self::invert_block(&td_pairs, &mut writer).with_context(|| format!("inverting block {block}"))?;
            let meta = writer.finish()?;
            tracing::info!(block = %block, pairs = td_pairs.len(), terms = meta.terms.len(), "block indexed");
            self.intermediate_indices.push(index_name);
        }

        self.save()?;

        let mut merged = InvertedIndexWriter::create(self.store, &self.config.index_name, self.config.codec)?;
        self.merge(&self.intermediate_indices, &mut merged)?;
        let meta = merged.finish()?;

        let manifest = Manifest {
            version: MANIFEST_VERSION,
            created_at: persist::now_rfc3339(),
            index_name: self.config.index_name.clone(),
            codec: self.config.codec.name().to_string(),
            num_docs: meta.num_docs() as u32,
            num_terms: meta.num_terms() as u32,
            blocks: blocks.clone(),
            normalizer: self.config.normalizer,
        };
        persist::save_manifest(self.store, &manifest)?;

        if self.config.cleanup_intermediate {
            for name in &self.intermediate_indices {
                self.store.remove(&index_file_name(name))?;
                self.store.remove(&metadata_file_name(name))?;
            }
        }

        let summary = IndexSummary {
            blocks: blocks.len(),
            num_docs: meta.num_docs(),
            num_terms: meta.num_terms(),
            skipped_docs: self.skipped_docs,
        };
        tracing::info!(
            index = %self.config.index_name,
            blocks = summary.blocks,
            num_docs = summary.num_docs,
            num_terms = summary.num_terms,
            skipped = summary.skipped_docs,
            "merge complete"
        );
        Ok(summary)
    }
}
