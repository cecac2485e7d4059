use crate::{DocId, TermId};

/// Conditions raised by the index layer that callers may want to match on.
///
/// Library functions return `anyhow::Result`; these values travel inside the
/// `anyhow::Error` and can be recovered with `downcast_ref::<IndexError>()`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("term {term} appended after term {last}; terms must arrive in strictly ascending order")]
    TermOutOfOrder { term: TermId, last: TermId },

    #[error("term {term}: {postings} postings but {tfs} term frequencies")]
    LengthMismatch { term: TermId, postings: usize, tfs: usize },

    #[error("term {term}: doc id {doc_id} does not follow its predecessor in ascending order")]
    UnsortedPostings { term: TermId, doc_id: DocId },

    #[error("term {0}: empty postings list")]
    EmptyPostings(TermId),

    #[error("term {0} is not present in the index")]
    TermNotFound(TermId),

    #[error("artifact not found: {0}")]
    Missing(String),

    #[error("index was written with codec `{found}`, reader expects `{expected}`")]
    CodecMismatch { expected: String, found: String },

    #[error("index name `{0}` collides with another index artifact")]
    ReservedName(String),

    #[error("unknown postings codec `{0}`")]
    UnknownCodec(String),

    #[error("corrupt postings data: {0}")]
    Corrupt(String),

    #[error("query cancelled")]
    Cancelled,
}
