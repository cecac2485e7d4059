use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use bsbi_core::rerank::{rerank, LinearReranker, Reranker};
use bsbi_core::search::{DEFAULT_B, DEFAULT_K1};
use bsbi_core::{FsStore, IndexError, Normalizer, Scoring, SearchHit, Searcher};
use serde::{Deserialize, Serialize};
use std::path::{Component, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

const MAX_K: usize = 100;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub index_dir: PathBuf,
    pub index_name: String,
    /// Collection root; enables snippets, `/doc`, and re-ranking.
    pub collection_dir: Option<PathBuf>,
    pub rerank: bool,
    pub query_timeout: Duration,
}

impl ServerConfig {
    pub fn new<P: Into<PathBuf>>(index_dir: P) -> Self {
        Self {
            index_dir: index_dir.into(),
            index_name: "main_index".to_string(),
            collection_dir: None,
            rerank: false,
            query_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub scoring: Option<String>,
    pub k1: Option<f64>,
    pub b: Option<f64>,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub scoring: Scoring,
    pub took_s: f64,
    pub total_hits: usize,
    pub reranked: bool,
    pub results: Vec<ResultHit>,
}

#[derive(Serialize)]
pub struct ResultHit {
    pub doc: String,
    pub score: f64,
    pub snippet: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub searcher: Arc<Searcher<FsStore>>,
    pub collection_root: Option<PathBuf>,
    /// Built once at startup, read-only afterwards.
    pub reranker: Option<Arc<dyn Reranker>>,
    pub query_timeout: Duration,
}

pub fn build_app(config: ServerConfig) -> Result<Router> {
    // Load index metadata, id maps and the build-time normalizer once at startup
    let searcher = Searcher::open_with_manifest(FsStore::new(&config.index_dir), &config.index_name)?;
    let reranker: Option<Arc<dyn Reranker>> = match (&config.collection_dir, config.rerank) {
        (Some(_), true) => Some(Arc::new(LinearReranker::default())),
        (None, true) => {
            tracing::warn!("re-ranking needs --collection; disabled");
            None
        }
        _ => None,
    };
    let app_state = AppState {
        searcher: Arc::new(searcher),
        collection_root: config.collection_dir.clone(),
        reranker,
        query_timeout: config.query_timeout,
    };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/*key", get(doc_handler))
        .with_state(app_state)
        .layer(cors);
    Ok(app)
}

fn parse_scoring(params: &SearchParams) -> Result<Scoring, (StatusCode, String)> {
    let scoring = match params.scoring.as_deref() {
        None => Scoring::TfIdf,
        Some(s) => s.parse::<Scoring>().map_err(|e| (StatusCode::BAD_REQUEST, e))?,
    };
    Ok(match scoring {
        Scoring::Bm25 { .. } => Scoring::Bm25 { k1: params.k1.unwrap_or(DEFAULT_K1), b: params.b.unwrap_or(DEFAULT_B) },
        other => other,
    })
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let scoring = parse_scoring(&params)?;
    let k = params.k.clamp(1, MAX_K);

    let cancel = Arc::new(AtomicBool::new(false));
    let task = {
        let searcher = state.searcher.clone();
        let cancel = cancel.clone();
        let q = params.q.clone();
        tokio::task::spawn_blocking(move || searcher.search_cancellable(&q, k, scoring, &cancel))
    };
    let outcome = match tokio::time::timeout(state.query_timeout, task).await {
        Ok(Ok(Ok(outcome))) => outcome,
        Ok(Ok(Err(e))) => return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
        Ok(Err(join)) => return Err((StatusCode::INTERNAL_SERVER_ERROR, join.to_string())),
        Err(_) => {
            cancel.store(true, Ordering::Relaxed);
            tracing::warn!(query = %params.q, "query timed out");
            return Err((StatusCode::GATEWAY_TIMEOUT, IndexError::Cancelled.to_string()));
        }
    };

    let mut hits = outcome.hits;
    let mut reranked = false;
    if let (Some(ranker), Some(root)) = (&state.reranker, &state.collection_root) {
        let query_tokens = state.searcher.normalizer().normalize(&params.q);
        let normalizer = state.searcher.normalizer();
        hits = rerank(ranker.as_ref(), &query_tokens, hits, |hit: &SearchHit| {
            let text = std::fs::read_to_string(root.join(&hit.doc)).ok()?;
            Some(normalizer.normalize(&text))
        });
        reranked = true;
    }

    // Capture raw query terms for highlighting
    let raw_terms: Vec<String> = params.q.split_whitespace().map(|s| s.to_string()).collect();
    let results = hits
        .into_iter()
        .map(|hit| {
            let snippet = state
                .collection_root
                .as_ref()
                .and_then(|root| snippet_from_file(&root.join(&hit.doc), &raw_terms));
            ResultHit { doc: hit.doc, score: hit.score, snippet }
        })
        .collect();

    let elapsed = start.elapsed();
    Ok(Json(SearchResponse {
        query: params.q,
        scoring,
        took_s: elapsed.as_secs_f64(),
        total_hits: outcome.total_hits,
        reranked,
        results,
    }))
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let root = state
        .collection_root
        .as_ref()
        .ok_or((StatusCode::NOT_FOUND, "no collection configured".to_string()))?;
    if !std::path::Path::new(&key).components().all(|c| matches!(c, Component::Normal(_))) {
        return Err((StatusCode::BAD_REQUEST, "invalid document key".to_string()));
    }
    // only documents that were indexed are served
    if state.searcher.doc_id(&key).is_none() {
        return Err((StatusCode::NOT_FOUND, "not found".to_string()));
    }
    let text = std::fs::read_to_string(root.join(&key)).map_err(|_| (StatusCode::NOT_FOUND, "not found".to_string()))?;
    Ok(Json(serde_json::json!({ "doc": key, "text": text })))
}

fn snippet_from_file(path: &std::path::Path, raw_terms: &[String]) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    if text.is_empty() {
        return None;
    }
    // find first match (case-insensitive) of any raw term
    let mut first_idx: Option<usize> = None;
    for term in raw_terms {
        if term.trim().is_empty() {
            continue;
        }
        if let Some(pos) = find_case_insensitive(&text, term) {
            first_idx = Some(pos);
            break;
        }
    }
    let snippet = match first_idx {
        Some(idx) => {
            let start = floor_char_boundary(&text, idx.saturating_sub(100));
            let end = floor_char_boundary(&text, (idx + 200).min(text.len()));
            text[start..end].to_string()
        }
        None => text.chars().take(200).collect(),
    };
    Some(highlight_terms(&snippet, raw_terms))
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.to_ascii_lowercase();
    let n = needle.to_ascii_lowercase();
    h.find(&n)
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        if t.trim().is_empty() {
            continue;
        }
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(t)).case_insensitive(true).build() else {
            continue;
        };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}
