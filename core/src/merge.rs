//! Sorted-list merging: the two-way doc id merge used for postings and score
//! accumulators, and the k-way external merge of block indices.

use crate::codec::PostingsCodec;
use crate::index::{InvertedIndexReader, InvertedIndexWriter, PostingsList};
use crate::storage::Storage;
use crate::{DocId, TermId};
use anyhow::Result;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::io::{Read, Seek};
use std::ops::AddAssign;

/// Union of two doc-id-sorted parallel lists. Values of a doc id present in
/// both inputs are summed.
pub fn merge_by_doc_id<T: Copy + AddAssign>(
    a_ids: &[DocId],
    a_vals: &[T],
    b_ids: &[DocId],
    b_vals: &[T],
) -> (Vec<DocId>, Vec<T>) {
    let mut ids = Vec::with_capacity(a_ids.len() + b_ids.len());
    let mut vals = Vec::with_capacity(a_ids.len() + b_ids.len());
    let (mut i, mut j) = (0, 0);
    while i < a_ids.len() && j < b_ids.len() {
        match a_ids[i].cmp(&b_ids[j]) {
            Ordering::Less => {
                ids.push(a_ids[i]);
                vals.push(a_vals[i]);
                i += 1;
            }
            Ordering::Greater => {
                ids.push(b_ids[j]);
                vals.push(b_vals[j]);
                j += 1;
            }
            Ordering::Equal => {
                let mut v = a_vals[i];
                v += b_vals[j];
                ids.push(a_ids[i]);
                vals.push(v);
                i += 1;
                j += 1;
            }
        }
    }
    ids.extend_from_slice(&a_ids[i..]);
    vals.extend_from_slice(&a_vals[i..]);
    ids.extend_from_slice(&b_ids[j..]);
    vals.extend_from_slice(&b_vals[j..]);
    (ids, vals)
}

/// Merge intermediate indices into `merged`.
///
/// Each reader is a stream sorted by term id. A min-heap of `(term_id, stream)`
/// heads yields the globally smallest term; all streams holding that term have
/// their postings fused before a single append. Returns the number of terms written.
pub fn merge_indices<R, C, S, W>(
    indices: &mut [InvertedIndexReader<R, C>],
    merged: &mut InvertedIndexWriter<'_, S, W>,
) -> Result<usize>
where
    R: Read + Seek,
    C: PostingsCodec,
    S: Storage,
    W: PostingsCodec,
{
    let mut heads: Vec<Option<PostingsList>> = vec![None; indices.len()];
    let mut heap: BinaryHeap<Reverse<(TermId, usize)>> = BinaryHeap::with_capacity(indices.len());

    for (i, reader) in indices.iter_mut().enumerate() {
        reader.reset()?;
        advance(reader, i, &mut heads, &mut heap)?;
    }

    let mut written = 0;
    while let Some(Reverse((term_id, i))) = heap.pop() {
        let mut list = heads[i].take().unwrap_or_default();
        advance(&mut indices[i], i, &mut heads, &mut heap)?;

        while let Some(&Reverse((next_term, j))) = heap.peek() {
            if next_term != term_id {
                break;
            }
            heap.pop();
            if let Some(other) = heads[j].take() {
                list = list.merge(&other);
            }
            advance(&mut indices[j], j, &mut heads, &mut heap)?;
        }

        merged.append_list(term_id, &list)?;
        written += 1;
    }
    Ok(written)
}

fn advance<R: Read + Seek, C: PostingsCodec>(
    reader: &mut InvertedIndexReader<R, C>,
    i: usize,
    heads: &mut [Option<PostingsList>],
    heap: &mut BinaryHeap<Reverse<(TermId, usize)>>,
) -> Result<()> {
    if let Some((term_id, list)) = reader.next_term()? {
        heads[i] = Some(list);
        heap.push(Reverse((term_id, i)));
    }
    Ok(())
}
