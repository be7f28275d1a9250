//! snmpfarm-walk: Command-line tool for walk-file operations.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use snmpfarm::catalog::{behavior, walk, DeviceTypeCatalog};

#[derive(Parser)]
#[command(name = "snmpfarm-walk", about = "Validate and inspect SNMP walk files")]
struct Cli {
    /// Enable debug output
    #[arg(short = 'D', long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a walk file and report per-line problems
    Check {
        /// Path to the walk file
        file: PathBuf,
    },
    /// Dump entries with their inferred behaviors
    Show {
        file: PathBuf,
        /// Only entries under this OID prefix
        #[arg(short, long)]
        prefix: Option<String>,
    },
    /// Type and behavior histogram
    Stats {
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    match cli.command {
        Commands::Check { file } => {
            let parsed = walk::parse_file(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            for warning in &parsed.warnings {
                println!("line {}: {}", warning.line, warning.message);
            }
            println!(
                "{}: {} entries, {} bad lines",
                file.display(),
                parsed.records.len(),
                parsed.warnings.len()
            );
            if parsed.records.is_empty() {
                anyhow::bail!("no usable entries");
            }
        }
        Commands::Show { file, prefix } => {
            let parsed = walk::parse_file(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let prefix = prefix
                .map(|p| p.parse::<snmpfarm::snmp::Oid>())
                .transpose()
                .context("invalid --prefix OID")?;
            let catalog = DeviceTypeCatalog::from_walk("show", parsed, &[])?;
            for oid in catalog.oids() {
                if let Some(prefix) = &prefix {
                    if !oid.starts_with(prefix) {
                        continue;
                    }
                }
                if let Some(entry) = catalog.entry(oid) {
                    println!(
                        "{} = {} [{:?}]",
                        oid, entry.base_value, entry.behavior
                    );
                }
            }
        }
        Commands::Stats { file } => {
            let parsed = walk::parse_file(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let mut types: BTreeMap<&'static str, usize> = BTreeMap::new();
            let mut behaviors: BTreeMap<String, usize> = BTreeMap::new();
            for record in &parsed.records {
                *types.entry(record.declared_type.name()).or_default() += 1;
                let inferred = behavior::infer(&record.oid, record.declared_type);
                *behaviors.entry(format!("{:?}", inferred)).or_default() += 1;
            }
            println!("{} entries", parsed.records.len());
            println!("\nBy type:");
            for (name, count) in types {
                println!("  {:<12} {}", name, count);
            }
            println!("\nBy behavior:");
            for (name, count) in behaviors {
                println!("  {:<18} {}", name, count);
            }
        }
    }
    Ok(())
}
