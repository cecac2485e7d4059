//! Blocked sort-based indexing and ranked retrieval over a compressed,
//! disk-backed inverted index.

pub mod bsbi;
pub mod codec;
pub mod collection;
pub mod error;
pub mod idmap;
pub mod index;
pub mod merge;
pub mod persist;
pub mod rerank;
pub mod search;
pub mod storage;
pub mod tokenizer;

pub use bsbi::{BsbiIndexer, IndexConfig, IndexSummary};
pub use codec::{CodecKind, PostingsCodec, StandardPostings, VbePostings};
pub use collection::{Collection, DirCollection, InMemoryCollection};
pub use error::IndexError;
pub use idmap::IdMap;
pub use index::{IndexMetadata, InvertedIndexReader, InvertedIndexWriter, PostingsEntry, PostingsList};
pub use search::{Scoring, SearchHit, SearchOutcome, Searcher};
pub use storage::{FsStore, MemoryStore, Storage};
pub use tokenizer::{Normalizer, NormalizerConfig, TextNormalizer};

pub type TermId = u32;
pub type DocId = u32;
