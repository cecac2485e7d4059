//! Term-at-a-time ranked retrieval over a merged index.

use crate::codec::CodecKind;
use crate::error::IndexError;
use crate::idmap::IdMap;
use crate::index::{IndexMetadata, InvertedIndexReader, PostingsList};
use crate::merge::merge_by_doc_id;
use crate::persist::{self, DOCS_FILE, TERMS_FILE};
use crate::storage::Storage;
use crate::tokenizer::{Normalizer, NormalizerConfig, TextNormalizer};
use crate::{DocId, TermId};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const DEFAULT_K1: f64 = 1.2;
pub const DEFAULT_B: f64 = 0.75;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum Scoring {
    #[default]
    TfIdf,
    Bm25 { k1: f64, b: f64 },
}

impl Scoring {
    pub fn bm25() -> Self { Scoring::Bm25 { k1: DEFAULT_K1, b: DEFAULT_B } }

    /// `log10(n / df)`. A term with no postings contributes nothing.
    pub fn idf(num_docs: usize, df: usize) -> f64 {
        if df == 0 || num_docs == 0 {
            return 0.0;
        }
        (num_docs as f64 / df as f64).log10()
    }

    /// Contribution of one term to one document's score.
    pub fn term_score(&self, tf: u32, idf: f64, doc_len: f64, avg_doc_len: f64) -> f64 {
        match *self {
            Scoring::TfIdf => {
                let w = if tf > 0 { 1.0 + (tf as f64).log10() } else { 0.0 };
                w * idf
            }
            Scoring::Bm25 { k1, b } => {
                let tf = tf as f64;
                let rel_len = if avg_doc_len > 0.0 { doc_len / avg_doc_len } else { 1.0 };
                idf * ((k1 + 1.0) * tf) / (k1 * ((1.0 - b) + b * rel_len) + tf)
            }
        }
    }
}

impl FromStr for Scoring {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tfidf" | "tf-idf" => Ok(Scoring::TfIdf),
            "bm25" => Ok(Scoring::bm25()),
            other => Err(format!("unknown scoring scheme `{other}` (expected tfidf or bm25)")),
        }
    }
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scoring::TfIdf => f.write_str("tfidf"),
            Scoring::Bm25 { k1, b } => write!(f, "bm25(k1={k1}, b={b})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub score: f64,
    /// Document key, e.g. `block/file.txt`.
    pub doc: String,
    pub doc_id: DocId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    /// Documents that matched at least one query term.
    pub total_hits: usize,
    pub hits: Vec<SearchHit>,
}

/// Read-only query handle. Metadata and id maps are loaded once; every query
/// opens its own postings stream, so one `Searcher` can serve concurrent queries.
pub struct Searcher<S: Storage> {
    store: S,
    index_name: String,
    codec: CodecKind,
    metadata: Arc<IndexMetadata>,
    term_id_map: IdMap,
    doc_id_map: IdMap,
    avg_doc_length: f64,
    normalizer: Arc<dyn Normalizer>,
}

impl<S: Storage> Searcher<S> {
    pub fn open(store: S, index_name: &str, normalizer: Arc<dyn Normalizer>) -> Result<Self> {
        let metadata = IndexMetadata::load(&store, index_name)?;
        let codec: CodecKind = metadata.codec.parse()?;
        let term_id_map = persist::load_id_map(&store, TERMS_FILE)?;
        let doc_id_map = persist::load_id_map(&store, DOCS_FILE)?;
        let avg_doc_length = metadata.avg_doc_length();
        tracing::info!(
            index = index_name,
            %codec,
            num_docs = metadata.num_docs(),
            num_terms = metadata.num_terms(),
            "index opened"
        );
        Ok(Self {
            store,
            index_name: index_name.to_string(),
            codec,
            metadata: Arc::new(metadata),
            term_id_map,
            doc_id_map,
            avg_doc_length,
            normalizer,
        })
    }

    /// Open with a [`TextNormalizer`] configured as recorded in the index manifest.
    pub fn open_with_manifest(store: S, index_name: &str) -> Result<Self> {
        let manifest = persist::load_manifest(&store)?;
        let config = if manifest.index_name == index_name {
            manifest.normalizer
        } else {
            tracing::warn!(index = index_name, manifest = %manifest.index_name, "manifest describes another index; default normalizer");
            NormalizerConfig::default()
        };
        Self::open(store, index_name, Arc::new(TextNormalizer::new(config)))
    }

    pub fn num_docs(&self) -> usize { self.metadata.num_docs() }

    pub fn num_terms(&self) -> usize { self.metadata.num_terms() }

    pub fn avg_doc_length(&self) -> f64 { self.avg_doc_length }

    pub fn codec(&self) -> CodecKind { self.codec }

    pub fn doc_key(&self, doc_id: DocId) -> Option<&str> { self.doc_id_map.key(doc_id) }

    pub fn doc_id(&self, doc_key: &str) -> Option<DocId> { self.doc_id_map.id(doc_key) }

    pub fn normalizer(&self) -> &dyn Normalizer { self.normalizer.as_ref() }

    /// Distinct query terms present in the index, in query order.
    fn query_terms(&self, query: &str) -> Vec<TermId> {
        let mut seen = HashSet::new();
        self.normalizer
            .normalize(query)
            .iter()
            .filter_map(|token| self.term_id_map.id(token))
            .filter(|&t| self.metadata.contains(t) && seen.insert(t))
            .collect()
    }

    fn fetch_postings(&self, query: &str, cancel: &AtomicBool) -> Result<Vec<PostingsList>> {
        let terms = self.query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut reader = InvertedIndexReader::with_metadata(&self.store, &self.index_name, self.codec, self.metadata.clone())?;
        let mut lists = Vec::with_capacity(terms.len());
        for term_id in terms {
            if cancel.load(Ordering::Relaxed) {
                return Err(IndexError::Cancelled.into());
            }
            lists.push(reader.get_postings_list(term_id)?);
        }
        lists.sort_by_key(|l| l.len());
        Ok(lists)
    }

    /// Postings of every distinct known query term, shortest list first.
    /// Unknown terms are skipped.
    pub fn retrieve_postings(&self, query: &str) -> Result<Vec<PostingsList>> {
        self.fetch_postings(query, &AtomicBool::new(false))
    }

    /// Score with `scoring`, checking `cancel` between query terms.
    pub fn search_cancellable(&self, query: &str, k: usize, scoring: Scoring, cancel: &AtomicBool) -> Result<SearchOutcome> {
        let n = self.num_docs();
        let mut acc_ids: Vec<DocId> = Vec::new();
        let mut acc_scores: Vec<f64> = Vec::new();

        for list in self.fetch_postings(query, cancel)? {
            if cancel.load(Ordering::Relaxed) {
                return Err(IndexError::Cancelled.into());
            }
            let idf = Scoring::idf(n, list.len());
            let scores: Vec<f64> = list
                .iter()
                .map(|(doc_id, tf)| {
                    let doc_len = self.metadata.doc_length.get(&doc_id).copied().unwrap_or(0) as f64;
                    scoring.term_score(tf, idf, doc_len, self.avg_doc_length)
                })
                .collect();
            let (ids, merged) = merge_by_doc_id(&acc_ids, &acc_scores, &list.doc_ids, &scores);
            acc_ids = ids;
            acc_scores = merged;
        }

        let mut ranked: Vec<(DocId, f64)> = acc_ids.into_iter().zip(acc_scores).collect();
        // Ties resolve to the smaller doc id.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let total_hits = ranked.len();
        ranked.truncate(k);

        let hits = ranked
            .into_iter()
            .map(|(doc_id, score)| -> Result<SearchHit> {
                let doc = self
                    .doc_key(doc_id)
                    .ok_or_else(|| IndexError::Corrupt(format!("doc id {doc_id} has no key in {DOCS_FILE}")))?;
                Ok(SearchHit { score, doc: doc.to_string(), doc_id })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(SearchOutcome { total_hits, hits })
    }

    pub fn search(&self, query: &str, k: usize, scoring: Scoring) -> Result<SearchOutcome> {
        self.search_cancellable(query, k, scoring, &AtomicBool::new(false))
    }

    pub fn retrieve_tfidf(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        Ok(self.search(query, k, Scoring::TfIdf)?.hits)
    }

    pub fn retrieve_bm25(&self, query: &str, k: usize, k1: f64, b: f64) -> Result<Vec<SearchHit>> {
        Ok(self.search(query, k, Scoring::Bm25 { k1, b })?.hits)
    }
}
