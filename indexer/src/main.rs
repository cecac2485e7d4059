use anyhow::{Context, Result};
use bsbi_core::persist::load_manifest;
use bsbi_core::search::{DEFAULT_B, DEFAULT_K1};
use bsbi_core::{BsbiIndexer, CodecKind, DirCollection, FsStore, IndexConfig, NormalizerConfig, Scoring, Searcher};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::Path;
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build a BSBI inverted index and query it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum CodecArg {
    Vbe,
    Standard,
}

impl From<CodecArg> for CodecKind {
    fn from(c: CodecArg) -> Self {
        match c {
            CodecArg::Vbe => CodecKind::Vbe,
            CodecArg::Standard => CodecKind::Standard,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ScoringArg {
    Tfidf,
    Bm25,
}

#[derive(clap::Args)]
struct NormalizeArgs {
    /// Disable English stemming
    #[arg(long, default_value_t = false)]
    no_stem: bool,
    /// Keep stopwords instead of dropping them
    #[arg(long, default_value_t = false)]
    keep_stopwords: bool,
}

impl NormalizeArgs {
    fn config(&self) -> NormalizerConfig {
        NormalizerConfig { stem: !self.no_stem, remove_stopwords: !self.keep_stopwords }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Index a collection directory: one subdirectory per block, one file per document
    Build {
        /// Collection root
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Name of the merged index
        #[arg(long, default_value = "main_index")]
        index_name: String,
        /// Postings encoding
        #[arg(long, value_enum, default_value_t = CodecArg::Vbe)]
        codec: CodecArg,
        /// Delete intermediate block indices after a successful merge
        #[arg(long, default_value_t = false)]
        cleanup: bool,
        #[command(flatten)]
        normalize: NormalizeArgs,
    },
    /// Run a ranked query against a built index, normalized as recorded at build time
    Search {
        /// Index directory
        #[arg(long)]
        index: String,
        #[arg(long, default_value = "main_index")]
        index_name: String,
        #[arg(long)]
        query: String,
        #[arg(short, long, default_value_t = 10)]
        k: usize,
        #[arg(long, value_enum, default_value_t = ScoringArg::Tfidf)]
        scoring: ScoringArg,
        #[arg(long, default_value_t = DEFAULT_K1)]
        k1: f64,
        #[arg(long, default_value_t = DEFAULT_B)]
        b: f64,
        /// Print results as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, index_name, codec, cleanup, normalize } => {
            let config =
                IndexConfig { index_name, codec: codec.into(), cleanup_intermediate: cleanup, normalizer: normalize.config() };
            build_index(&input, &output, config)
        }
        Commands::Search { index, index_name, query, k, scoring, k1, b, json } => {
            let scoring = match scoring {
                ScoringArg::Tfidf => Scoring::TfIdf,
                ScoringArg::Bm25 => Scoring::Bm25 { k1, b },
            };
            search_index(&index, &index_name, &query, k, scoring, json)
        }
    }
}

fn build_index(input: &str, output: &str, config: IndexConfig) -> Result<()> {
    let input_path = Path::new(input);
    if !input_path.is_dir() {
        anyhow::bail!("collection root {input} is not a directory");
    }
    let store = FsStore::new(output);
    std::fs::create_dir_all(&store.root).with_context(|| format!("creating {output}"))?;

    let start = Instant::now();
    let mut bsbi = BsbiIndexer::with_text_normalizer(&store, config);
    let summary = bsbi.do_indexing(&DirCollection::new(input_path))?;
    tracing::info!(
        output,
        blocks = summary.blocks,
        num_docs = summary.num_docs,
        num_terms = summary.num_terms,
        skipped = summary.skipped_docs,
        took_s = start.elapsed().as_secs_f64(),
        "index build complete"
    );
    Ok(())
}

fn search_index(index: &str, index_name: &str, query: &str, k: usize, scoring: Scoring, json: bool) -> Result<()> {
    let store = FsStore::new(index);
    let manifest = load_manifest(&store).with_context(|| format!("no finished index in {index}"))?;
    tracing::debug!(created_at = %manifest.created_at, num_docs = manifest.num_docs, "loaded manifest");
    let searcher = Searcher::open_with_manifest(store, index_name)?;

    let start = Instant::now();
    let outcome = searcher.search(query, k, scoring)?;
    let took_s = start.elapsed().as_secs_f64();

    if json {
        let out = serde_json::json!({
            "query": query,
            "scoring": scoring,
            "took_s": took_s,
            "total_hits": outcome.total_hits,
            "results": outcome.hits,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{} hits for {:?} ({}) in {:.4}s", outcome.total_hits, query, scoring, took_s);
        for hit in &outcome.hits {
            println!("{:<40} {:>.3}", hit.doc, hit.score);
        }
    }
    Ok(())
}
