use bsbi_core::persist::{load_manifest, DOCS_FILE, TERMS_FILE};
use bsbi_core::{
    BsbiIndexer, CodecKind, DirCollection, FsStore, InMemoryCollection, IndexConfig, IndexError, InvertedIndexReader,
    MemoryStore, Normalizer, NormalizerConfig, Scoring, Searcher, Storage, TextNormalizer,
};
use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn normalizer() -> Arc<dyn Normalizer> { Arc::new(TextNormalizer::default()) }

fn build<S: Storage + Clone>(store: &S, collection: &InMemoryCollection, config: IndexConfig) -> Searcher<S> {
    let mut bsbi = BsbiIndexer::new(store, config.clone(), normalizer());
    bsbi.do_indexing(collection).unwrap();
    Searcher::open(store.clone(), &config.index_name, normalizer()).unwrap()
}

fn pets() -> InMemoryCollection {
    let mut c = InMemoryCollection::new();
    c.insert("0", "d1", "cat dog cat").insert("0", "d2", "dog bird");
    c
}

fn medical() -> InMemoryCollection {
    let mut c = InMemoryCollection::new();
    c.insert("1", "1.txt", "Fever and cough are common symptoms of influenza.")
        .insert("1", "2.txt", "Influenza vaccines reduce the risk of fever.")
        .insert("2", "3.txt", "Diabetes affects blood sugar; insulin helps regulate blood sugar.")
        .insert("2", "4.txt", "Blood pressure and heart disease are linked.")
        .insert("3", "5.txt", "Cough syrup soothes a persistent cough in children.")
        .insert("3", "6.txt", "Heart disease risk rises with high blood pressure and diabetes.");
    c
}

#[test]
fn cat_query_matches_only_the_cat_document() {
    let searcher = build(&MemoryStore::new(), &pets(), IndexConfig::default());
    let hits = searcher.retrieve_tfidf("cat", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc, "0/d1");
    assert!(hits[0].score > 0.0);
}

#[test]
fn term_in_every_document_scores_zero_but_still_matches() {
    let searcher = build(&MemoryStore::new(), &pets(), IndexConfig::default());
    let hits = searcher.retrieve_tfidf("dog", 10).unwrap();
    let docs: Vec<&str> = hits.iter().map(|h| h.doc.as_str()).collect();
    assert_eq!(docs, vec!["0/d1", "0/d2"]);
    assert!(hits.iter().all(|h| h.score == 0.0));

    let bm25 = searcher.retrieve_bm25("dog", 10, 1.2, 0.75).unwrap();
    assert_eq!(bm25.len(), 2);
    assert!(bm25.iter().all(|h| h.score == 0.0));
}

#[test]
fn tfidf_excludes_documents_without_the_term() {
    let mut c = InMemoryCollection::new();
    c.insert("0", "A", "x").insert("0", "B", "y");
    let searcher = build(&MemoryStore::new(), &c, IndexConfig::default());
    let postings = searcher.retrieve_postings("x").unwrap();
    assert_eq!(postings.len(), 1);
    assert_eq!(postings[0].doc_ids.len(), 1);
    let hits = searcher.retrieve_tfidf("x", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc, "0/A");
    assert!((hits[0].score - 2f64.log10()).abs() < 1e-12);
}

#[test]
fn unknown_terms_are_skipped_and_empty_queries_return_nothing() {
    let searcher = build(&MemoryStore::new(), &pets(), IndexConfig::default());
    assert!(searcher.retrieve_tfidf("zebra", 10).unwrap().is_empty());
    assert!(searcher.retrieve_bm25("", 10, 1.2, 0.75).unwrap().is_empty());
    let hits = searcher.retrieve_tfidf("zebra cat", 10).unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn postings_come_back_shortest_first_and_deduplicated() {
    let searcher = build(&MemoryStore::new(), &medical(), IndexConfig::default());
    let lists = searcher.retrieve_postings("blood insulin blood").unwrap();
    assert_eq!(lists.len(), 2);
    assert_eq!(lists[0].len(), 1);
    assert_eq!(lists[1].len(), 3);
}

#[test]
fn scores_accumulate_across_terms_and_respect_k() {
    let searcher = build(&MemoryStore::new(), &medical(), IndexConfig::default());
    let outcome = searcher.search("blood pressure heart disease", 2, Scoring::TfIdf).unwrap();
    assert_eq!(outcome.total_hits, 3);
    assert_eq!(outcome.hits.len(), 2);
    let top: Vec<&str> = outcome.hits.iter().map(|h| h.doc.as_str()).collect();
    assert!(top.contains(&"2/4.txt") && top.contains(&"3/6.txt"));
    assert!(outcome.hits[0].score >= outcome.hits[1].score);

    let bm25 = searcher.search("cough", 10, Scoring::bm25()).unwrap();
    assert_eq!(bm25.hits[0].doc, "3/5.txt");
    assert_eq!(bm25.total_hits, 2);
}

#[test]
fn indexing_twice_gives_identical_rankings() {
    let q = "influenza fever cough blood";
    let a = build(&MemoryStore::new(), &medical(), IndexConfig::default());
    let b = build(&MemoryStore::new(), &medical(), IndexConfig::default());
    assert_eq!(a.search(q, 5, Scoring::TfIdf).unwrap(), b.search(q, 5, Scoring::TfIdf).unwrap());
    assert_eq!(a.search(q, 5, Scoring::bm25()).unwrap(), b.search(q, 5, Scoring::bm25()).unwrap());
}

#[test]
fn codecs_produce_the_same_rankings() {
    let q = "heart disease diabetes";
    let vbe = build(&MemoryStore::new(), &medical(), IndexConfig::default());
    let standard_config = IndexConfig { codec: CodecKind::Standard, ..Default::default() };
    let standard = build(&MemoryStore::new(), &medical(), standard_config);
    assert_eq!(standard.codec(), CodecKind::Standard);
    assert_eq!(vbe.search(q, 10, Scoring::bm25()).unwrap(), standard.search(q, 10, Scoring::bm25()).unwrap());
}

#[test]
fn merged_index_agrees_with_sequential_scan() {
    let store = MemoryStore::new();
    build(&store, &medical(), IndexConfig::default());
    let mut reader = InvertedIndexReader::open(&store, "main_index", CodecKind::Vbe).unwrap();
    let scanned: Vec<_> = reader.by_ref().collect::<anyhow::Result<Vec<_>>>().unwrap();
    let mut prev = None;
    for (term, list) in &scanned {
        assert!(prev.map_or(true, |p| p < *term));
        prev = Some(*term);
        assert_eq!(&reader.get_postings_list(*term).unwrap(), list);
        assert!(list.doc_ids.windows(2).all(|w| w[0] < w[1]));
    }
    assert_eq!(scanned.len(), reader.metadata().num_terms());
    assert_eq!(reader.metadata().num_docs(), 6);
}

#[test]
fn cancelled_query_reports_cancellation() {
    let searcher = build(&MemoryStore::new(), &medical(), IndexConfig::default());
    let cancel = AtomicBool::new(true);
    let err = searcher.search_cancellable("blood", 10, Scoring::TfIdf, &cancel).unwrap_err();
    assert_eq!(err.downcast_ref::<IndexError>(), Some(&IndexError::Cancelled));
}

#[test]
fn directory_collection_indexes_to_disk() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    for (block, name, text) in [
        ("0", "a.txt", "Rust compiles to native code"),
        ("0", "b.txt", ""),
        ("1", "c.txt", "Native code runs fast, rust code is safe"),
    ] {
        fs::create_dir_all(data.path().join(block)).unwrap();
        fs::write(data.path().join(block).join(name), text).unwrap();
    }
    fs::write(data.path().join("1/d.bin"), [0xff, 0xfe, 0x00, 0x80]).unwrap();

    let store = FsStore::new(out.path());
    let config = IndexConfig::default();
    let norm: Arc<dyn Normalizer> = Arc::new(TextNormalizer::new(NormalizerConfig::default()));
    let mut bsbi = BsbiIndexer::new(&store, config.clone(), norm.clone());
    let summary = bsbi.do_indexing(&DirCollection::new(data.path())).unwrap();
    assert_eq!(summary.blocks, 2);
    assert_eq!(summary.num_docs, 2);
    assert_eq!(summary.skipped_docs, 2);

    for f in ["main_index.index", "main_index.dict", "intermediate_index_0.dict", "intermediate_index_1.index", TERMS_FILE, DOCS_FILE, "meta.json"] {
        assert!(out.path().join(f).is_file(), "missing {f}");
    }
    let manifest = load_manifest(&store).unwrap();
    assert_eq!(manifest.codec, "vbe");
    assert_eq!(manifest.num_docs, 2);
    assert_eq!(bsbi.doc_id_map.id("1/d.bin"), None);

    let searcher = Searcher::open(FsStore::new(out.path()), "main_index", norm).unwrap();
    let hits = searcher.retrieve_bm25("code", 10, 1.2, 0.75).unwrap();
    let docs: Vec<&str> = hits.iter().map(|h| h.doc.as_str()).collect();
    assert_eq!(docs, vec!["0/a.txt", "1/c.txt"]);
    let hits = searcher.retrieve_tfidf("safe", 10).unwrap();
    assert_eq!(hits[0].doc, "1/c.txt");
    assert!(hits[0].score > 0.0);
}

#[test]
fn opening_an_unbuilt_index_fails() {
    let err = Searcher::open(MemoryStore::new(), "main_index", normalizer()).err().unwrap();
    assert!(matches!(err.downcast_ref::<IndexError>(), Some(IndexError::Missing(_))));
}

#[test]
fn searcher_normalizes_queries_the_way_the_index_was_built() {
    let store = MemoryStore::new();
    let mut c = InMemoryCollection::new();
    c.insert("0", "a", "the runner was running").insert("0", "b", "walking home");
    let unstemmed = NormalizerConfig { stem: false, remove_stopwords: true };
    let config = IndexConfig { normalizer: unstemmed, ..Default::default() };
    BsbiIndexer::with_text_normalizer(&store, config).do_indexing(&c).unwrap();
    assert_eq!(load_manifest(&store).unwrap().normalizer, unstemmed);

    let searcher = Searcher::open_with_manifest(store.clone(), "main_index").unwrap();
    let hits = searcher.retrieve_tfidf("running", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc, "0/a");
    assert_eq!(searcher.doc_id("0/b"), Some(1));
    assert_eq!(searcher.doc_id("0/c"), None);

    let stemming = Searcher::open(store, "main_index", normalizer()).unwrap();
    assert!(stemming.retrieve_tfidf("running", 10).unwrap().is_empty());
}
