//! Command line front end for the star cluster catalog loader
//!
//! Usage:
//!   cluster_catalog [options] validate
//!   cluster_catalog [options] load
//!   cluster_catalog [options] show NGC_2360
//!   cluster_catalog [options] export clusters.json
//!   cluster_catalog [options] cache
//!
//! Set RUST_LOG to control log output (defaults to info).

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cluster_catalog::{
    export_clusters_json, find_cluster, read_catalog_file, DataLoader, LoadOutcome,
    OfflineFetcher, RemoteFetcher, RowLimit, Settings, TableCache, VizierFetcher,
};

#[derive(Parser)]
#[command(name = "cluster_catalog")]
#[command(about = "Load, cache and group star cluster catalogs from VizieR")]
struct Cli {
    /// YAML catalog list
    #[arg(long, default_value = cluster_catalog::settings::DEFAULT_CATALOGS_FILE)]
    catalogs: PathBuf,

    /// Directory for cached raw tables
    #[arg(long, default_value = cluster_catalog::settings::DEFAULT_RAW_DATA_DIR)]
    raw_data: PathBuf,

    /// Rows requested per table ("unlimited" or a count)
    #[arg(long, default_value = "unlimited")]
    row_limit: RowLimit,

    /// VizieR mirror base URL
    #[arg(long, default_value = cluster_catalog::settings::DEFAULT_VIZIER_URL)]
    vizier_url: String,

    /// Only use cached tables; a cache miss is an error
    #[arg(long)]
    offline: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the catalog list without touching cache or network
    Validate,
    /// Load every catalog and print a per-cluster summary
    Load,
    /// Print one cluster's anchor and member rows
    Show {
        /// Cluster name, e.g. NGC_2360
        cluster: String,
        /// Maximum member rows to print
        #[arg(long, default_value_t = 20)]
        max_rows: usize,
    },
    /// Write the merged cluster mapping as JSON for the dashboard
    Export {
        /// Output file
        output: PathBuf,
    },
    /// List cached table files
    Cache,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            catalogs_file: self.catalogs.clone(),
            raw_data_dir: self.raw_data.clone(),
            row_limit: self.row_limit,
            vizier_url: self.vizier_url.clone(),
            offline: self.offline,
        }
    }
}

fn make_loader(settings: &Settings) -> DataLoader<Box<dyn RemoteFetcher>> {
    let fetcher: Box<dyn RemoteFetcher> = if settings.offline {
        Box::new(OfflineFetcher)
    } else {
        Box::new(VizierFetcher::with_base_url(&settings.vizier_url))
    };
    DataLoader::from_settings(settings, fetcher)
}

fn load(settings: &Settings) -> Result<LoadOutcome> {
    make_loader(settings)
        .run_config_file(&settings.catalogs_file)
        .with_context(|| format!("Loading catalogs from {}", settings.catalogs_file.display()))
}

fn format_anchor(anchor: &cluster_catalog::CoordinateAnchor) -> String {
    if anchor.is_empty() {
        return "--".to_string();
    }
    anchor
        .coords()
        .iter()
        .map(|c| format!("({:.4}, {:+.4})", c.ra(), c.dec()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_summary(outcome: &LoadOutcome) {
    println!(
        "{:<28} {:<20} {:>8}  Anchor (RA, Dec) [deg]",
        "Cluster", "Catalog", "Members"
    );
    for (name, cluster) in &outcome.clusters {
        println!(
            "{:<28} {:<20} {:>8}  {}",
            name,
            cluster.catalog(),
            cluster.num_members(),
            format_anchor(cluster.anchor())
        );
    }

    println!();
    println!(
        "{} clusters, {} member rows, {} catalogs",
        outcome.clusters.len(),
        outcome.total_members(),
        outcome.catalogs.len()
    );
    for collision in &outcome.collisions {
        println!(
            "Note: {} from {} replaced the one from {}",
            collision.cluster, collision.winning_catalog, collision.replaced_catalog
        );
    }
}

fn describe_cached_file(path: &Path) -> Result<String> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("Reading size of {}", path.display()))?
        .len();
    Ok(format!("{:>12} bytes  {}", size, path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let settings = cli.settings();

    match &cli.command {
        Commands::Validate => {
            let descriptors = read_catalog_file(&settings.catalogs_file).with_context(|| {
                format!("Validating {}", settings.catalogs_file.display())
            })?;
            for d in &descriptors {
                let cache_path = d.cache_path(&settings.raw_data_dir);
                println!("{} ({}) by {}", d.name, d.cds_id, d.author);
                println!("  parameters: {}", d.params_table_name());
                println!("  members:    {}", d.members_table_name());
                println!(
                    "  cache:      {}{}",
                    cache_path.display(),
                    if cache_path.is_file() { "" } else { " (not cached)" }
                );
            }
            println!("{} catalogs OK", descriptors.len());
        }

        Commands::Load => {
            let outcome = load(&settings)?;
            print_summary(&outcome);
        }

        Commands::Show { cluster, max_rows } => {
            let outcome = load(&settings)?;
            let Some(found) = find_cluster(&outcome.clusters, cluster) else {
                bail!("No cluster named {cluster} in the loaded catalogs");
            };

            println!("{} (from {})", found.name(), found.catalog());
            println!("Anchor (RA, Dec) [deg]: {}", format_anchor(found.anchor()));
            println!("Members: {}", found.num_members());
            println!();

            let members = found.members();
            println!("{}", members.columns().join("\t"));
            for row in members.rows().take(*max_rows) {
                let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
                println!("{}", cells.join("\t"));
            }
            if members.num_rows() > *max_rows {
                println!("... {} more rows", members.num_rows() - max_rows);
            }
        }

        Commands::Export { output } => {
            let outcome = load(&settings)?;
            let file = File::create(output)
                .with_context(|| format!("Creating {}", output.display()))?;
            export_clusters_json(&outcome.clusters, BufWriter::new(file))
                .with_context(|| format!("Writing {}", output.display()))?;
            println!(
                "Wrote {} clusters to {}",
                outcome.clusters.len(),
                output.display()
            );
        }

        Commands::Cache => {
            let cache = TableCache::new(
                settings.raw_data_dir.clone(),
                OfflineFetcher,
                settings.row_limit,
            );
            let files = cache.list_cached_files()?;
            if files.is_empty() {
                println!("No cached tables in {}", settings.raw_data_dir.display());
            }
            for path in files {
                println!("{}", describe_cached_file(&path)?);
            }
        }
    }

    Ok(())
}
