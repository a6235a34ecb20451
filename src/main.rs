use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use pos_cleaner::{
    validate, Dataset, Loader, LoaderConfig, ReportKind, Severity, ValidationReport, VERSION,
};

#[derive(Parser)]
#[command(name = "pos-cleaner")]
#[command(about = "Clean the chain's POS report exports into analysis tables")]
#[command(version = VERSION)]
struct Args {
    /// Directory holding the four report exports (default: auto-detect)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Root of the Parquet cache (or set POS_CACHE_DIR)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Always re-parse; neither read nor write the cache
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse (or fetch from cache) and print row counts
    Load,

    /// Run the validation pass and print its report
    Validate {
        /// Print the report as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Write one table to stdout as JSON
    Export {
        /// monthly_sales, product_profitability, sales_by_group or category_summary
        table: String,
    },

    /// Parse loose report files routed by their report code, bypassing the cache
    Upload {
        files: Vec<PathBuf>,
    },
}

impl Args {
    fn config(&self) -> LoaderConfig {
        let mut config = LoaderConfig::from_env();
        if let Some(dir) = &self.data_dir {
            config = config.with_data_dir(dir);
        }
        if let Some(dir) = &self.cache_dir {
            config = config.with_cache_dir(dir);
        }
        if self.no_cache {
            config = config.without_cache();
        }
        config
    }
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let loader = Loader::new(args.config());

    match &args.command {
        Command::Load => {
            let dataset = loader.load()?;
            print_row_counts(&dataset);
        }
        Command::Validate { json } => {
            let dataset = loader.load()?;
            let report = validate(&dataset);
            if *json {
                serde_json::to_writer_pretty(io::stdout().lock(), &report)?;
                println!();
            } else {
                print_report(&report);
            }
            if report.has_critical_issues() {
                std::process::exit(1);
            }
        }
        Command::Export { table } => {
            let kind = ReportKind::from_table_name(table)
                .with_context(|| format!("Unknown table: {}", table))?;
            let dataset = loader.load()?;
            export_table(&dataset, kind)?;
        }
        Command::Upload { files } => {
            let mut uploads = Vec::new();
            for path in files {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let file = File::open(path)
                    .with_context(|| format!("Failed to open file: {}", path.display()))?;
                uploads.push((name, file));
            }
            info!(files = uploads.len(), "parsing uploads");
            let dataset = loader.load_uploaded(uploads)?;
            print_row_counts(&dataset);
        }
    }

    Ok(())
}

fn print_row_counts(dataset: &Dataset) {
    println!("📊 Cleaned tables");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for (kind, rows) in dataset.row_counts() {
        println!("  {:<24} {:>8} rows", kind.table_name(), rows);
    }
    if !dataset.diagnostics.is_empty() {
        println!("\n⚠️  {} parse diagnostics (run `validate` for details)", dataset.diagnostics.len());
    }
}

fn print_report(report: &ValidationReport) {
    println!("✅ Validation report");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for table in &report.tables {
        println!(
            "\n{} - {} rows, {} columns, {} branches",
            table.table,
            table.rows,
            table.columns.len(),
            table.unique_branches.len()
        );
        let nulls: Vec<String> = table
            .null_counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(column, n)| format!("{}={}", column, n))
            .collect();
        if !nulls.is_empty() {
            println!("  nulls: {}", nulls.join(" "));
        }
        if table.rows_without_branch > 0 {
            println!("  rows without branch: {}", table.rows_without_branch);
        }
        if !table.missing_branches.is_empty() {
            println!("  missing branches: {}", table.missing_branches.join(", "));
        }
    }

    if !report.issues.is_empty() {
        println!("\nIssues:");
        for issue in &report.issues {
            let marker = match issue.severity {
                Severity::Critical => "❌",
                Severity::Warning => "⚠️ ",
                Severity::Info => "ℹ️ ",
            };
            println!(
                "  {} [{}] {}: {}",
                marker,
                issue.table.as_deref().unwrap_or("*"),
                issue.check,
                issue.issue
            );
        }
    }

    println!("\n{}", report.summary());
}

fn export_table(dataset: &Dataset, kind: ReportKind) -> Result<()> {
    let mut out = io::stdout().lock();
    match kind {
        ReportKind::MonthlySales => serde_json::to_writer_pretty(&mut out, &dataset.monthly_sales)?,
        ReportKind::ProductProfitability => {
            serde_json::to_writer_pretty(&mut out, &dataset.product_profitability)?
        }
        ReportKind::SalesByGroup => serde_json::to_writer_pretty(&mut out, &dataset.sales_by_group)?,
        ReportKind::CategorySummary => {
            serde_json::to_writer_pretty(&mut out, &dataset.category_summary)?
        }
    }
    writeln!(out)?;
    Ok(())
}
