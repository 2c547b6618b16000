//! Slingshot CLI
//!
//! Copies and transforms documents between search-engine collections.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use slingshot::{
    AliasSwitcher, DocumentStore, ElasticsearchStore, FieldTransformer, Identity, MemoryStore,
    MigrationConfig, MigrationStats, Pipeline, RunFailure, StoreAuth, Transform,
};

#[derive(Parser)]
#[command(name = "slingshot")]
#[command(version)]
#[command(about = "Copy and transform documents between search-engine collections", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "SLINGSHOT_CONFIG")]
    config: Option<PathBuf>,

    /// Dry run mode (writes go to an in-memory target)
    #[arg(long, global = true)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Bulk batch size override
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Fail when the target rejects any document
    #[arg(long, global = true)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migration from config file
    Run {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Move the configured aliases to the target afterwards
        #[arg(long)]
        switch_aliases: bool,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Move the configured aliases from source to target
    SwitchAlias {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Create the target collection, using the mapping overrides as its mappings
    CreateTarget {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// JSON file with the full index creation body (settings, mappings)
        #[arg(long, value_name = "FILE")]
        body: Option<PathBuf>,
    },

    /// Generate example configuration
    Init {
        /// Output file path
        #[arg(short, long, default_value = "migration.yaml")]
        output: PathBuf,
    },
}

/// Flags shared by every command that loads a migration file.
struct Overrides {
    dry_run: bool,
    batch_size: Option<usize>,
    strict: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let overrides = Overrides {
        dry_run: cli.dry_run,
        batch_size: cli.batch_size,
        strict: cli.strict,
    };

    match cli.command {
        Some(Commands::Run {
            config,
            switch_aliases,
        }) => {
            run_migration(&config, &overrides, switch_aliases).await?;
        }
        Some(Commands::Validate { config }) => {
            validate_config(&config)?;
        }
        Some(Commands::SwitchAlias { config }) => {
            switch_aliases(&config).await?;
        }
        Some(Commands::CreateTarget { config, body }) => {
            create_target(&config, body.as_deref()).await?;
        }
        Some(Commands::Init { output }) => {
            generate_config(&output)?;
        }
        None => {
            // Default: run migration if config provided
            if let Some(config) = cli.config {
                run_migration(&config, &overrides, false).await?;
            } else {
                eprintln!("Usage: slingshot --config <FILE> or slingshot <COMMAND>");
                eprintln!("Try 'slingshot --help' for more information.");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn load_config(config_path: &Path) -> anyhow::Result<MigrationConfig> {
    info!("Loading configuration from {:?}", config_path);
    let config = MigrationConfig::from_file(config_path)?;
    config.validate()?;
    Ok(config)
}

/// Builds the source handle and the target handle. When both hosts name the
/// same server the target shares the source connection.
fn connect(
    config: &MigrationConfig,
) -> anyhow::Result<(Arc<dyn DocumentStore>, Arc<dyn DocumentStore>)> {
    let auth = StoreAuth::from_hosts(&config.hosts);
    let source: Arc<dyn DocumentStore> =
        Arc::new(ElasticsearchStore::new(&config.hosts.source, auth.clone())?);
    let target: Arc<dyn DocumentStore> = match config.hosts.distinct_target() {
        Some(url) => Arc::new(ElasticsearchStore::new(url, auth)?),
        None => Arc::clone(&source),
    };
    Ok((source, target))
}

async fn run_migration(
    config_path: &Path,
    overrides: &Overrides,
    switch_aliases: bool,
) -> anyhow::Result<()> {
    let mut config = MigrationConfig::from_file(config_path)?;

    if overrides.dry_run {
        config.options.dry_run = true;
    }
    if overrides.strict {
        config.options.strict = true;
    }
    if let Some(bs) = overrides.batch_size {
        config.spec.bulk.max_batch_size = Some(bs);
    }
    if switch_aliases {
        config.options.switch_aliases = true;
    }

    config.validate()?;

    let (source, mut target) = connect(&config)?;

    if config.options.dry_run {
        info!("Dry run mode - writes go to an in-memory target");
        let memory = MemoryStore::new();
        let collection = &config.spec.target.collection;
        if target.collection_exists(collection).await? {
            memory.create(collection);
        }
        target = Arc::new(memory);
    }

    let mut transform: Box<dyn Transform> = if config.transform.is_identity() {
        Box::new(Identity)
    } else {
        Box::new(FieldTransformer::new(config.transform.clone()))
    };

    info!("Starting migration...");

    let pipeline = Pipeline::new(source, Arc::clone(&target), config.spec.clone()).with_progress(true);
    let stats = match pipeline.run(transform.as_mut()).await {
        Ok(stats) => stats,
        Err(RunFailure { source, stats }) => {
            println!("\n❌ Migration aborted [{}]", source.code());
            print_stats(&stats);
            if source.is_retryable() {
                println!("   The failure looks transient; re-running the migration may succeed.");
            }
            return Err(source.into());
        }
    };

    println!("\n✅ Migration Complete!");
    print_stats(&stats);

    if config.options.strict {
        stats.ensure_clean()?;
    }

    if config.options.switch_aliases && !config.aliases.is_empty() {
        if config.options.dry_run {
            info!("Dry run mode - aliases left untouched");
        } else {
            let outcomes = AliasSwitcher::new(target.as_ref())
                .switch_all(&config.aliases, &config.spec)
                .await?;
            for (alias, outcome) in outcomes {
                println!(
                    "   Alias {}: {}",
                    alias,
                    if outcome.is_noop() {
                        "already on target"
                    } else {
                        "switched"
                    }
                );
            }
        }
    }

    Ok(())
}

fn print_stats(stats: &MigrationStats) {
    println!("   Read:       {}", stats.docs_read);
    println!("   Written:    {}", stats.docs_written);
    println!("   Skipped:    {}", stats.docs_skipped);
    println!("   Batches:    {}", stats.batches_flushed);
    println!("   Rejected:   {}", stats.errors.len());
    println!("   Duration:   {:.2}s", stats.duration_secs);
    println!("   Throughput: {:.0} docs/sec", stats.throughput());
    if let Some(peak) = stats.peak_memory_bytes {
        println!("   Peak memory: {:.1} MiB", peak as f64 / (1024.0 * 1024.0));
    }
    for failure in stats.errors.iter().take(10) {
        println!(
            "     - {} (batch {}, HTTP {}): {}",
            failure.id, failure.batch, failure.status, failure.reason
        );
    }
    if stats.errors.len() > 10 {
        println!("     ... and {} more", stats.errors.len() - 10);
    }
}

fn validate_config(config_path: &Path) -> anyhow::Result<()> {
    info!("Validating configuration from {:?}", config_path);

    let config = MigrationConfig::from_file(config_path)?;
    config.validate()?;

    println!("✅ Configuration is valid!");
    println!("   Source host: {}", config.hosts.source);
    println!(
        "   Target host: {}",
        config.hosts.distinct_target().unwrap_or("(same as source)")
    );
    println!("   Source:      {}", config.spec.source.collection);
    println!("   Target:      {}", config.spec.target.collection);
    println!("   Action:      {}", config.spec.bulk.action.as_str());
    println!("   Paging:      {:?}", config.spec.paging.mode);
    println!(
        "   Transform:   {}",
        if config.transform.is_identity() {
            "identity"
        } else {
            "field transformer"
        }
    );
    if !config.aliases.is_empty() {
        println!("   Aliases:     {}", config.aliases.join(", "));
    }

    Ok(())
}

async fn switch_aliases(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    if config.aliases.is_empty() {
        warn!("No aliases configured, nothing to switch");
        return Ok(());
    }

    let (_, target) = connect(&config)?;
    let outcomes = AliasSwitcher::new(target.as_ref())
        .switch_all(&config.aliases, &config.spec)
        .await?;

    for (alias, outcome) in outcomes {
        println!(
            "✅ {} -> {} (attached: {}, detached: {})",
            alias, config.spec.target.collection, outcome.attached, outcome.detached
        );
    }
    Ok(())
}

async fn create_target(config_path: &Path, body_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let (_, target) = connect(&config)?;
    let collection = &config.spec.target.collection;

    if target.collection_exists(collection).await? {
        println!("Target collection '{}' already exists", collection);
        return Ok(());
    }

    let body = match body_path {
        Some(path) => Some(serde_json::from_str(&std::fs::read_to_string(path)?)?),
        None => config
            .spec
            .mapping_overrides
            .as_ref()
            .map(|mappings| serde_json::json!({ "mappings": mappings })),
    };

    let acknowledged = target.create_collection(collection, body.as_ref()).await?;
    if !acknowledged {
        anyhow::bail!("creation of '{}' was not acknowledged", collection);
    }
    println!("✅ Created target collection '{}'", collection);
    Ok(())
}

fn generate_config(output: &Path) -> anyhow::Result<()> {
    std::fs::write(output, CONFIG_TEMPLATE)?;
    println!("✅ Generated configuration: {:?}", output);
    println!("   Edit the file and run: slingshot run --config {:?}", output);

    Ok(())
}

const CONFIG_TEMPLATE: &str = r#"# Slingshot Migration Configuration
hosts:
  source: http://localhost:9200
  # target: http://other-cluster:9200  # Omit to migrate within the source cluster
  # username: elastic
  # password: changeme
  # api_key: base64-encoded-key

source:
  collection: sale
  # shape_tag: sale       # Mapping type, for pre-7.0 clusters
  page_size: 1000

target:
  collection: sale_v2

bulk:
  action: index           # index, create, update or delete
  max_batch_size: 500

paging:
  mode: cursor            # cursor or offset
  scroll_ttl: 30s
  # batch_number: 0       # Offset mode only
  # batch_size: 1000

# filter_query:
#   term:
#     status: published

# mapping_overrides:
#   properties:
#     price:
#       type: scaled_float
#       scaling_factor: 100

transform:
  rename: {}
  remove: []
  set: {}
  # split:
  #   field: bus
  #   id_field: id
  # skip_unless:
  #   field: status
  #   equals: published

aliases:
  - sale_read

options:
  dry_run: false
  strict: false
  switch_aliases: false
"#;
