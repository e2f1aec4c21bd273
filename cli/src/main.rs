//! SpaceIndex CLI — run the listing sync loop and inspect indexer state.
//!
//! # Commands
//! ```text
//! spaceindex run      --node-uri <url> --database <url>
//! spaceindex status   --node-uri <url> --database <url>
//! spaceindex listing  <name> --database <url>
//! spaceindex listings [--limit <n>] --database <url>
//! spaceindex orphans  --database <url>
//! spaceindex info
//! ```

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use spaceindex_core::{
    normalize_space_name, BlockStore, IndexerBuilder, ListingStore, MarketService, SyncLoop,
    DEFAULT_LISTINGS_LIMIT,
};
use spaceindex_rpc::{HttpClientConfig, HttpRpcClient, RetryConfig, SpacesClient};
use spaceindex_storage::postgres::PostgresStorage;
use spaceindex_storage::sqlite::SqliteStorage;
use spaceindex_storage::{InMemoryStorage, OrphanedBlock};

mod logging;

use logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "spaceindex",
    about = "Reorg-aware listing indexer for the spaces marketplace",
    long_about = "
SpaceIndex keeps a marketplace listing store consistent with the spaces chain:
it follows the node tip, rolls back over reorgs and re-verifies every listing
whose space changed in a block.

ENVIRONMENT VARIABLES:
  SPACES_NODE_URI        spaces node JSON-RPC endpoint
  SPACES_RPC_USER        node RPC username (default: test)
  SPACES_RPC_PASSWORD    node RPC password (default: test)
  DATABASE_URL           postgres://..., sqlite:<path> or memory (POSTGRES_URI also accepted)
  UPDATE_DB_INTERVAL     seconds between sync passes
  SPACEINDEX_FROM_HEIGHT first height to sync on an empty store
  SPACEINDEX_LOG         log filter (RUST_LOG takes precedence)
",
    version
)]
struct Cli {
    /// Log filter, e.g. "info" or "spaceindex_core=debug"
    #[arg(long, global = true, env = "SPACEINDEX_LOG", default_value = "info")]
    log_level: String,

    /// Emit JSON structured logs
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct NodeArgs {
    /// spaces node JSON-RPC endpoint
    #[arg(long, env = "SPACES_NODE_URI", default_value = "http://127.0.0.1:7225")]
    node_uri: String,
    #[arg(long, env = "SPACES_RPC_USER", default_value = "test")]
    rpc_user: String,
    #[arg(long, env = "SPACES_RPC_PASSWORD", default_value = "test", hide_env_values = true)]
    rpc_password: String,
    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    rpc_timeout: u64,
}

#[derive(Args, Clone)]
struct StoreArgs {
    /// postgres://..., sqlite:<path> or "memory"
    #[arg(long, env = "DATABASE_URL")]
    database: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync loop until Ctrl-C
    Run {
        #[command(flatten)]
        node: NodeArgs,
        #[command(flatten)]
        store: StoreArgs,
        /// Seconds between sync passes
        #[arg(long, env = "UPDATE_DB_INTERVAL", default_value_t = 10)]
        interval: u64,
        /// Delay before retrying a failed pass, in milliseconds
        #[arg(long, default_value_t = 1000)]
        retry_delay_ms: u64,
        /// First height to sync when the store is empty
        #[arg(long, env = "SPACEINDEX_FROM_HEIGHT", default_value_t = 0)]
        from_height: u64,
        /// Spaces revalidated concurrently per block
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },

    /// Compare the synced head with the node tip (JSON)
    Status {
        #[command(flatten)]
        node: NodeArgs,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Show the cheapest valid listing for a space (JSON)
    Listing {
        /// Space name, with or without '@'
        name: String,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Show the cheapest valid listing of each space, newest first (JSON)
    Listings {
        /// Maximum number of listings
        #[arg(long, default_value_t = DEFAULT_LISTINGS_LIMIT)]
        limit: u64,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// List blocks orphaned by reorgs (JSON)
    Orphans {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Show build and default configuration info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&LogConfig {
        level: cli.log_level.clone(),
        json: cli.log_json,
    });

    match cli.command {
        Commands::Run {
            node,
            store,
            interval,
            retry_delay_ms,
            from_height,
            concurrency,
            once,
        } => {
            let config = IndexerBuilder::new()
                .from_height(from_height)
                .poll_interval_ms(interval.saturating_mul(1000))
                .retry_delay_ms(retry_delay_ms)
                .max_concurrent_names(concurrency)
                .build_config();
            config.validate()?;

            let chain = Arc::new(connect_node(&node)?);
            let stores = open_storage(&store).await?;
            let sync = SyncLoop::new(config, chain, stores.blocks, stores.listings);

            if once {
                let report = sync.run_pass().await?;
                println!("{}", serde_json::to_string_pretty(&pass_summary(&report))?);
                return Ok(());
            }

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown requested, finishing current pass");
                    let _ = shutdown_tx.send(true);
                }
            });

            info!(node = %node.node_uri, "starting sync loop");
            sync.run(shutdown_rx).await?;
            info!("sync loop stopped");
        }

        Commands::Status { node, store } => {
            let stores = open_storage(&store).await?;
            let market = MarketService::new(
                Arc::new(connect_node(&node)?),
                stores.blocks,
                stores.listings,
            );
            let health = market.health().await?;
            let mut out = serde_json::to_value(&health)?;
            out["lag"] = serde_json::json!(health.lag());
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        Commands::Listing { name, store } => {
            let stores = open_storage(&store).await?;
            let name = normalize_space_name(name.trim());
            let listing = stores
                .listings
                .valid_listing(name)
                .await?
                .with_context(|| format!("no listing found for @{name}"))?;
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }

        Commands::Listings { limit, store } => {
            let stores = open_storage(&store).await?;
            let listings = stores.listings.latest_listings(limit.max(1)).await?;
            println!("{}", serde_json::to_string_pretty(&listings)?);
        }

        Commands::Orphans { store } => {
            let orphans = orphaned_blocks(&store).await?;
            let out: Vec<_> = orphans
                .iter()
                .map(|o| {
                    serde_json::json!({
                        "height": o.height,
                        "hash": hex::encode(&o.hash),
                        "orphaned_at": o.orphaned_at,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        Commands::Info => cmd_info(),
    }

    Ok(())
}

fn connect_node(args: &NodeArgs) -> Result<SpacesClient<HttpRpcClient>> {
    let config = HttpClientConfig {
        retry: RetryConfig::default(),
        request_timeout: std::time::Duration::from_secs(args.rpc_timeout),
        auth: None,
    }
    .with_basic_auth(&args.rpc_user, &args.rpc_password);

    let transport = HttpRpcClient::new(&args.node_uri, config)
        .with_context(|| format!("creating RPC client for {}", args.node_uri))?;
    Ok(SpacesClient::new(transport))
}

struct Stores {
    blocks: Arc<dyn BlockStore>,
    listings: Arc<dyn ListingStore>,
}

enum Backend {
    Memory,
    Sqlite(String),
    Postgres(String),
}

impl StoreArgs {
    fn backend(&self) -> Result<Backend> {
        let url = match &self.database {
            Some(url) => url.clone(),
            None => std::env::var("POSTGRES_URI").unwrap_or_else(|_| "memory".into()),
        };
        if url == "memory" {
            Ok(Backend::Memory)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Backend::Postgres(url))
        } else if url.starts_with("sqlite:") {
            // SqliteStorage::open accepts both sqlite:<path> and sqlite://<path>
            Ok(Backend::Sqlite(url))
        } else {
            bail!("unsupported database URL {url:?} (expected postgres://, sqlite: or memory)")
        }
    }
}

async fn open_storage(args: &StoreArgs) -> Result<Stores> {
    let stores = match args.backend()? {
        Backend::Memory => {
            tracing::warn!("using in-memory storage; nothing will persist");
            let s = Arc::new(InMemoryStorage::new());
            Stores {
                blocks: s.clone(),
                listings: s,
            }
        }
        Backend::Sqlite(path) => {
            let s = Arc::new(SqliteStorage::open(&path).await.context("opening SQLite store")?);
            Stores {
                blocks: s.clone(),
                listings: s,
            }
        }
        Backend::Postgres(url) => {
            let s = Arc::new(
                PostgresStorage::connect(&url)
                    .await
                    .context("connecting to Postgres")?,
            );
            Stores {
                blocks: s.clone(),
                listings: s,
            }
        }
    };
    Ok(stores)
}

async fn orphaned_blocks(args: &StoreArgs) -> Result<Vec<OrphanedBlock>> {
    let orphans = match args.backend()? {
        Backend::Memory => Vec::new(),
        Backend::Sqlite(path) => SqliteStorage::open(&path).await?.orphaned_blocks().await?,
        Backend::Postgres(url) => PostgresStorage::connect(&url).await?.orphaned_blocks().await?,
    };
    Ok(orphans)
}

fn pass_summary(report: &spaceindex_core::PassReport) -> serde_json::Value {
    serde_json::json!({
        "tip": report.tip,
        "head": report.resolution.head.as_ref().map(|b| b.height),
        "reorg_depth": report.resolution.reorg.as_ref().map(|r| r.depth()),
        "from": report.replay.from,
        "last_committed": report.replay.last_committed,
        "blocks": report.replay.blocks,
        "names": report.replay.names,
        "listings_checked": report.replay.listings.checked,
        "listings_invalid": report.replay.listings.invalid,
        "stopped_short": report.replay.stopped_short,
    })
}

fn cmd_info() {
    let defaults = IndexerBuilder::new().build_config();
    println!("SpaceIndex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default poll interval: {} ms", defaults.poll_interval_ms);
    println!("  Default retry delay: {} ms", defaults.retry_delay_ms);
    println!("  Default revalidation concurrency: {}", defaults.max_concurrent_names);
    println!("  Storage backends: memory, SQLite (sqlite:<path>), Postgres (postgres://)");
    println!("  Node methods: getserverinfo, getblockmeta, verifylisting");
}
