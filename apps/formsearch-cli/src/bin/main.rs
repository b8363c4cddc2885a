use std::env;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use formsearch_core::config::Config;
use formsearch_core::{Connection, SearchRequest};
use formsearch_hybrid::{EngineOptions, HybridSearchEngine};
use formsearch_pool::{ConnectionPool, PoolOptions};
use formsearch_store::{StoreSettings, TcpConnector};

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    if args.is_empty() {
        eprintln!("Usage: {} <search '<request-json>'|ping>", prog);
        std::process::exit(1);
    }
    let cmd = args.remove(0);
    (cmd, args)
}

async fn open_pool(config: &Config) -> anyhow::Result<ConnectionPool<TcpConnector>> {
    let store: StoreSettings = config.section("store")?;
    let pool: PoolOptions = config.section("pool")?;
    ConnectionPool::connect(store.connector(), pool)
        .await
        .with_context(|| format!("opening pool to {}", store.addr()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let (cmd, args) = parse_args();
    match cmd.as_str() {
        "search" => {
            let raw = args.first().cloned().unwrap_or_else(|| {
                eprintln!("Usage: formsearch search '{{\"formId\": \"...\", \"textQuery\": \"...\"}}'");
                std::process::exit(1)
            });
            let request: SearchRequest = serde_json::from_str(&raw).context("parsing search request")?;
            let options: EngineOptions = config.section("search")?;

            let pool = Arc::new(open_pool(&config).await?);
            let engine = HybridSearchEngine::new(Arc::clone(&pool), options);
            let outcome = engine.search(&request).await;
            pool.close().await;

            let result = outcome.context("search failed")?;
            info!(mode = %result.mode, total = result.total, exact = result.mode.total_is_exact(), "search complete");
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        "ping" => {
            let pool = open_pool(&config).await?;
            let mut outcome = Ok(());
            for _ in 0..pool.size() {
                if let Err(e) = pool.get().ping().await {
                    outcome = Err(e);
                    break;
                }
            }
            pool.close().await;
            outcome.context("ping failed")?;
            println!("ok ({} connections)", pool.size());
        }
        _ => {
            eprintln!("Unknown command: {}", cmd);
            std::process::exit(1);
        }
    }
    Ok(())
}
