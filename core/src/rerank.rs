//! Second-stage re-ranking of retrieved hits by a learned model.

use crate::search::SearchHit;
use std::collections::{HashMap, HashSet};

/// A trained ranking model. Shared read-only across queries.
pub trait Reranker: Send + Sync {
    fn features(&self, query: &[String], doc: &[String]) -> Vec<f64>;
    fn predict(&self, features: &[Vec<f64>]) -> Vec<f64>;
}

/// Reorder `hits` by the model's predicted scores, which replace the retrieval
/// scores. Hits whose tokens `doc_tokens` cannot supply keep their order and
/// follow the re-ranked ones.
pub fn rerank<F>(ranker: &dyn Reranker, query: &[String], hits: Vec<SearchHit>, mut doc_tokens: F) -> Vec<SearchHit>
where
    F: FnMut(&SearchHit) -> Option<Vec<String>>,
{
    let mut scored = Vec::new();
    let mut rows = Vec::new();
    let mut rest = Vec::new();
    for hit in hits {
        match doc_tokens(&hit) {
            Some(tokens) => {
                rows.push(ranker.features(query, &tokens));
                scored.push(hit);
            }
            None => rest.push(hit),
        }
    }
    if scored.is_empty() {
        return rest;
    }

    let predictions = ranker.predict(&rows);
    for (hit, p) in scored.iter_mut().zip(predictions) {
        hit.score = p;
    }
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.extend(rest);
    scored
}

pub fn jaccard(query: &[String], doc: &[String]) -> f64 {
    let q: HashSet<&str> = query.iter().map(String::as_str).collect();
    let d: HashSet<&str> = doc.iter().map(String::as_str).collect();
    let union = q.union(&d).count();
    if union == 0 {
        return 0.0;
    }
    q.intersection(&d).count() as f64 / union as f64
}

/// Cosine similarity of term-count vectors.
pub fn cosine(query: &[String], doc: &[String]) -> f64 {
    fn counts(tokens: &[String]) -> HashMap<&str, f64> {
        let mut m = HashMap::new();
        for t in tokens {
            *m.entry(t.as_str()).or_insert(0.0) += 1.0;
        }
        m
    }
    let (q, d) = (counts(query), counts(doc));
    let dot: f64 = q.iter().map(|(t, w)| w * d.get(t).copied().unwrap_or(0.0)).sum();
    let norm = |m: &HashMap<&str, f64>| m.values().map(|w| w * w).sum::<f64>().sqrt();
    let denom = norm(&q) * norm(&d);
    if denom == 0.0 {
        return 0.0;
    }
    dot / denom
}

/// Linear model over `[jaccard, cosine]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearReranker {
    pub weights: [f64; 2],
    pub bias: f64,
}

impl Default for LinearReranker {
    fn default() -> Self { Self { weights: [1.0, 1.0], bias: 0.0 } }
}

impl Reranker for LinearReranker {
    fn features(&self, query: &[String], doc: &[String]) -> Vec<f64> { vec![jaccard(query, doc), cosine(query, doc)] }

    fn predict(&self, features: &[Vec<f64>]) -> Vec<f64> {
        features
            .iter()
            .map(|row| self.bias + row.iter().zip(self.weights.iter()).map(|(x, w)| x * w).sum::<f64>())
            .collect()
    }
}
