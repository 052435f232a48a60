mod gateway;
mod source;

use clap::{Parser, Subcommand};
use gateway::Gateway;
use leadflow_core::config::{self, Config};
use leadflow_core::product::NewProduct;
use leadflow_memory::Store;
use leadflow_providers::{OpenAiExtractor, OpenAiGenerator};
use serde::Deserialize;
use source::{EventSource, JsonLinesSource};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "leadflow",
    version,
    about = "Leadflow — webhook-driven customer engagement backend"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engagement gateway.
    Start,
    /// Check configuration, provider availability, and store health.
    Status,
    /// Load products from a TOML catalog file.
    Seed {
        /// Path to a TOML file with [[products]] entries.
        file: String,
    },
}

/// Catalog seed file: a list of [[products]] tables.
#[derive(Deserialize)]
struct SeedFile {
    products: Vec<NewProduct>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    // Keep the appender guard alive for the life of the process.
    let _log_guard = init_logging(&cfg);

    match cli.command {
        Commands::Start => {
            let missing = cfg.startup_check();
            let (fatal, warnings): (Vec<_>, Vec<_>) = missing
                .into_iter()
                .partition(|m| m.starts_with("provider.") || m.starts_with("engagement."));
            for w in &warnings {
                tracing::warn!("startup check: {w}");
            }
            if !fatal.is_empty() {
                anyhow::bail!(
                    "cannot start, fix the configuration first:\n  {}",
                    fatal.join("\n  ")
                );
            }

            let store = Store::new(&cfg.memory).await?;
            let extractor = Arc::new(OpenAiExtractor::from_config(&cfg.provider));
            let generator = Arc::new(OpenAiGenerator::from_config(&cfg.provider));

            println!("Leadflow — starting engagement gateway...");
            let gw = Arc::new(Gateway::new(store, extractor, generator, &cfg));
            let sources: Vec<Arc<dyn EventSource>> = vec![Arc::new(JsonLinesSource)];
            gw.run(sources).await?;
        }
        Commands::Status => {
            println!("Leadflow — Status Check\n");
            println!("Config: {}", cli.config);

            let missing = cfg.startup_check();
            if missing.is_empty() {
                println!("Configuration: complete");
            } else {
                println!("Configuration: incomplete");
                for m in &missing {
                    println!("  - {m}");
                }
            }
            println!();

            let extractor = OpenAiExtractor::from_config(&cfg.provider);
            let generator = OpenAiGenerator::from_config(&cfg.provider);
            use leadflow_core::traits::{KeywordExtractor, ResponseGenerator};
            println!(
                "  {}: {}",
                extractor.name(),
                if extractor.is_available().await {
                    "configured"
                } else {
                    "not configured"
                }
            );
            println!(
                "  {}: {}",
                generator.name(),
                if generator.is_available().await {
                    "configured"
                } else {
                    "not configured"
                }
            );
            println!();

            let store = Store::new(&cfg.memory).await?;
            let (total_products, active_products) = store.product_counts().await?;
            let stats = store.conversation_stats().await?;
            println!("  database: {}", config::shellexpand(&cfg.memory.db_path));
            println!("  size: {} bytes", store.db_size().await?);
            println!("  products: {total_products} ({active_products} active)");
            println!(
                "  conversations: {} total, {} active, {} qualified, {} completed",
                stats.total, stats.active, stats.qualified, stats.completed
            );
            for (platform, count) in &stats.platform_breakdown {
                println!("    {platform}: {count}");
            }
        }
        Commands::Seed { file } => {
            let content = std::fs::read_to_string(&file)?;
            let seed: SeedFile = toml::from_str(&content)?;
            if seed.products.is_empty() {
                anyhow::bail!("{file} contains no [[products]] entries");
            }

            let store = Store::new(&cfg.memory).await?;
            let mut created = 0;
            for product in seed.products {
                let name = product.name.clone();
                match store.create_product(product).await {
                    Ok(p) => {
                        created += 1;
                        println!("  created [{}] {}", p.id, p.name);
                    }
                    Err(e) => eprintln!("  skipped {name}: {e}"),
                }
            }
            println!("Seeded {created} product(s) from {file}");
        }
    }

    Ok(())
}

/// Stderr logging, plus a file layer when `service.log_file` is set.
fn init_logging(cfg: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cfg.service.log_level.clone()));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if cfg.service.log_file.is_empty() {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        return None;
    }

    let path = std::path::PathBuf::from(config::shellexpand(&cfg.service.log_file));
    let dir = path.parent().unwrap_or(std::path::Path::new(".")).to_path_buf();
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "leadflow.log".to_string());
    let appender = tracing_appender::rolling::never(dir, file);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .init();
    Some(guard)
}
