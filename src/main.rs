use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use nightlight_stac::config::{run_config_toml, RunConfig};
use nightlight_stac::pipeline::{self, SegmentPlan};
use nightlight_stac::s3_operations::S3Store;
use nightlight_stac::store::{BlobStore, DryRun};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Publish STAC items and catalogs for the nightly radiance archive")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Common {
    /// Run configuration; the built-in defaults are used when absent.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print documents instead of writing them.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Build one item per orbital segment found under PREFIX.
    Items {
        prefix: String,
        /// Also save the segment plan as JSON.
        #[arg(long)]
        plan: Option<PathBuf>,
        #[command(flatten)]
        common: Common,
    },
    /// Rewrite an existing catalog tree under NEW_ROOT.
    Rebase {
        source_catalog: String,
        new_root: String,
        #[command(flatten)]
        common: Common,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<RunConfig> {
    match path {
        Some(path) => RunConfig::read(path),
        None => RunConfig::from_template(&run_config_toml()),
    }
}

async fn items(store: &impl BlobStore, config: &RunConfig, prefix: &str, plan_path: Option<PathBuf>) -> Result<()> {
    let plan = SegmentPlan::from_listing(store, config, prefix).await?;
    if let Some(path) = plan_path {
        plan.write(&path)?;
        info!(path = %path.display(), "segment plan saved");
    }
    plan.execute(store).await.log_summary();
    Ok(())
}

async fn rebase(store: &impl BlobStore, config: &RunConfig, source: &str, new_root: &str) -> Result<()> {
    let report = pipeline::rebase_catalog(store, source, new_root, config).await?;
    for child in &report.unresolved {
        info!(id = %child.id, href = %child.href, error = %child.error, "not rebased");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let (config, dry_run) = match &cli.command {
        Command::Items { common, .. } | Command::Rebase { common, .. } => {
            (load_config(common.config.as_ref())?, common.dry_run)
        }
    };
    let store = S3Store::from_config(&config).await;

    match (cli.command, dry_run) {
        (Command::Items { prefix, plan, .. }, false) => items(&store, &config, &prefix, plan).await,
        (Command::Items { prefix, plan, .. }, true) => items(&DryRun::new(store), &config, &prefix, plan).await,
        (Command::Rebase { source_catalog, new_root, .. }, false) => {
            rebase(&store, &config, &source_catalog, &new_root).await
        }
        (Command::Rebase { source_catalog, new_root, .. }, true) => {
            rebase(&DryRun::new(store), &config, &source_catalog, &new_root).await
        }
    }
}
