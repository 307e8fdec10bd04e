use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use registry_reconcile::{Pipeline, PipelineConfig, RunReport};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Reconcile yearly registry snapshots and resolve substance mentions.
#[derive(Debug, Parser)]
#[command(name = "registry-reconcile", version, about)]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Registry stages, then substance stages when configured.
    Run(Overrides),

    /// Order snapshots and deletion addenda only.
    Registry(Overrides),

    /// Reference table and product table only.
    Substances(Overrides),
}

/// Flags that override the configuration file.
#[derive(Debug, Clone, Default, Args)]
struct Overrides {
    /// Directory holding the yearly registry files.
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// First year to load.
    #[arg(long)]
    year_start: Option<i32>,

    /// Last year to load (inclusive).
    #[arg(long)]
    year_end: Option<i32>,

    /// Output directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Minimum similarity for a fuzzy match.
    #[arg(long)]
    cutoff: Option<f64>,

    /// Composition table (tab-separated).
    #[arg(long)]
    reference_table: Option<PathBuf>,

    /// Product table export.
    #[arg(long)]
    products_table: Option<PathBuf>,
}

impl Overrides {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.base_dir {
            config.registry.base_dir = dir.clone();
        }
        if let Some(year) = self.year_start {
            config.registry.year_start = year;
        }
        if let Some(year) = self.year_end {
            config.registry.year_end = year;
        }
        if let Some(dir) = &self.out_dir {
            config.output.dir = dir.clone();
        }
        if let Some(cutoff) = self.cutoff {
            config.substances.cutoff = cutoff;
        }
        if let Some(path) = &self.reference_table {
            config.substances.reference_table = Some(path.clone());
        }
        if let Some(path) = &self.products_table {
            config.substances.products_table = Some(path.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let (title, overrides) = match &cli.command {
        Command::Run(o) => ("Full run", o),
        Command::Registry(o) => ("Registry reconciliation", o),
        Command::Substances(o) => ("Substance matching", o),
    };
    overrides.apply(&mut config);

    println!("🧾 {}", title);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let pipeline = Pipeline::new(config).context("invalid configuration")?;
    let report = match cli.command {
        Command::Run(_) => pipeline.run(),
        Command::Registry(_) => pipeline.run_registry(),
        Command::Substances(_) => pipeline.run_substances(),
    }
    .context("run aborted")?;

    print_summary(&report);
    Ok(())
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "registry_reconcile=info",
        1 => "registry_reconcile=debug",
        _ => "registry_reconcile=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn print_summary(report: &RunReport) {
    println!();
    for line in report.summary_lines() {
        println!("✓ {}", line);
    }

    if let Some(registry) = &report.registry {
        println!("\n🔐 Catalog fingerprint: {}", registry.reconciliation.fingerprint);
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Done ({})", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
}
