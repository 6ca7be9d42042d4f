use std::{sync::Arc, time::Duration};

use clap::Parser;
use log::{LevelFilter, info};
use marketscope_core::{
    Configuration, Engine, MemorySource, PostgrestSource, SourceBackend, core::catalog::Catalog,
};
use tokio::runtime::Builder;

mod api_error;
mod routes;

#[derive(Parser, Debug)]
#[command(name = "marketscope_web", version, about = "MarketScope dashboard API")]
struct Args {
    /// Listen address (default: 127.0.0.1)
    #[arg(long, default_value = "127.0.0.1")]
    addr: String,

    /// Listen port (default: 8080)
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Logging level off, error, warn, info, debug, trace (default: info)
    #[arg(long = "log-level", alias = "log_level", value_name = "LEVEL")]
    log_level: Option<LevelFilter>,

    /// Number of runtime worker threads (default: 4)
    #[arg(long = "concurrent-threads", alias = "concurrent_threads", value_name = "N")]
    concurrent_threads: Option<usize>,

    /// Directory of `<table>.json` files served from memory
    #[arg(long = "data-dir", value_name = "PATH")]
    data_dir: Option<String>,

    /// PostgREST base URL, e.g. https://<project>.supabase.co/rest/v1
    #[arg(long = "postgrest-url", value_name = "URL", conflicts_with = "data_dir")]
    postgrest_url: Option<String>,

    /// API key sent as `apikey` and bearer token
    #[arg(long = "api-key", env = "MARKETSCOPE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// JSON file of table descriptors (default: built-in tables)
    #[arg(long, value_name = "PATH")]
    catalog: Option<String>,

    /// Rows per batch during a full scan (default: 1000)
    #[arg(long = "batch-size", alias = "batch_size", value_name = "N")]
    batch_size: Option<usize>,

    /// Most rows a single full scan visits (default: 50000)
    #[arg(long = "scan-cap", value_name = "N")]
    scan_cap: Option<usize>,

    /// Largest page a list request may ask for (default: 1000)
    #[arg(long = "max-page-size", value_name = "N")]
    max_page_size: Option<usize>,

    /// Seconds a cached aggregation stays fresh (default: 600)
    #[arg(long = "cache-ttl-secs", value_name = "SECS")]
    cache_ttl_secs: Option<u64>,

    /// Cached aggregations kept at most (default: 1024)
    #[arg(long = "cache-capacity", value_name = "N")]
    cache_capacity: Option<u64>,

    /// Seconds before a full scan is abandoned (default: 30)
    #[arg(long = "scan-deadline-secs", value_name = "SECS")]
    scan_deadline_secs: Option<u64>,

    /// Candidates enumerated for a range over a formatted text column (default: 200)
    #[arg(long = "pattern-cap", value_name = "N")]
    pattern_cap: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = args.log_level.unwrap_or(LevelFilter::Info);
    env_logger::Builder::new().filter_level(level).init();

    let config = Configuration::with_overrides(
        args.batch_size,
        args.scan_cap,
        args.max_page_size,
        args.cache_ttl_secs.map(Duration::from_secs),
        args.cache_capacity,
        args.scan_deadline_secs.map(Duration::from_secs),
        args.pattern_cap,
    );

    let rt = Builder::new_multi_thread()
        .worker_threads(args.concurrent_threads.unwrap_or(4).max(1))
        .enable_all()
        .build()?;

    rt.block_on(serve(args, config))
}

async fn serve(args: Args, config: Configuration) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = match &args.catalog {
        Some(path) => Catalog::from_json_file(path)?,
        None => Catalog::builtin()?,
    };

    let source = match (&args.postgrest_url, &args.data_dir) {
        (Some(url), _) => {
            info!("Reading from PostgREST at {}", url);
            SourceBackend::Postgrest(PostgrestSource::new(url, args.api_key.clone())?)
        }
        (None, data_dir) => {
            let source = MemorySource::with_page_cap(config.max_page_size.max(config.batch_size));

            match data_dir {
                Some(dir) => {
                    source.load_json_dir(dir).await?;
                }
                None => info!("No data source configured, serving empty in-memory tables"),
            }

            for name in catalog.names() {
                if source.table_len(&name).is_none() {
                    source.insert_table(&name, Vec::new());
                }
            }

            SourceBackend::Memory(source)
        }
    };

    let engine = Arc::new(Engine::new(source, catalog, config));
    let app = routes::router(engine);

    let listener = tokio::net::TcpListener::bind((args.addr.as_str(), args.port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
