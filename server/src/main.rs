use anyhow::Result;
use axum::Router;
use clap::Parser;
use server::{build_app, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: PathBuf,
    /// Name of the merged index inside the index directory
    #[arg(long, default_value = "main_index")]
    index_name: String,
    /// Collection root, used for snippets, document fetch and re-ranking
    #[arg(long)]
    collection: Option<PathBuf>,
    /// Re-rank the top results with the built-in linear model
    #[arg(long, default_value_t = false)]
    rerank: bool,
    /// Per-query time limit in milliseconds
    #[arg(long, default_value_t = 5000)]
    query_timeout_ms: u64,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = ServerConfig {
        index_dir: args.index,
        index_name: args.index_name,
        collection_dir: args.collection,
        rerank: args.rerank,
        query_timeout: Duration::from_millis(args.query_timeout_ms),
    };
    let app: Router = build_app(config)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
