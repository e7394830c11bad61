//! Parser CLI - loads the indicators workbook and reports what it holds
//!
//! Responsibilities:
//! - Load every sheet once through the load cache
//! - Report availability per sheet and the variable catalog
//! - Validate indicator roles against the loaded data
//! - Optionally export the long-format store as CSV

use anyhow::{Context, Result};
use clap::Parser;
use monitor_parser::format::fmt_int_es;
use monitor_parser::roles::IndicatorRoles;
use monitor_parser::{Compositions, LoadCache, SeriesStore, SheetState, Source, SourceConfig};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "monitor-parser", about = "Loads the provincial indicators workbook")]
struct Args {
    /// Workbook path (overrides WORKBOOK_PATH)
    #[arg(long)]
    workbook: Option<PathBuf>,

    /// Write every observation to this CSV file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Print the last value of this variable for every province
    #[arg(long)]
    variable: Option<String>,

    /// Exit with an error when any sheet is unavailable
    #[arg(long, default_value = "false")]
    strict: bool,
}

fn status<T>(state: &SheetState<T>) -> String {
    match state.error() {
        None => "ok".to_string(),
        Some(reason) => format!("UNAVAILABLE ({})", reason),
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let mut config = SourceConfig::from_env().context("Invalid source configuration")?;
    if let Some(path) = args.workbook {
        config.workbook_path = path;
    }

    println!("=== Monitor Provincial Parser ===");
    println!("Workbook: {}", config.workbook_path.display());
    println!("Rate calendar: {} months", config.rate_calendar.len());

    let cache = LoadCache::new();
    let store = SeriesStore::load(&config, &cache);
    let compositions = Compositions::load(&config, &cache);

    println!("\nSheets:");
    for (source, sheet) in [
        (Source::Annual, &config.sheet_annual),
        (Source::Quarterly, &config.sheet_quarterly),
        (Source::Rate, &config.sheet_rate),
    ] {
        let state = store.partition(source);
        let rows = state.data().map_or(0, Vec::len);
        println!("  {:<14} {:>8} rows  {}", sheet, rows, status(state));
    }
    for (sheet, state) in [
        (&config.sheet_sectors, &compositions.sectors),
        (&config.sheet_branches, &compositions.branches),
    ] {
        let rows = state.data().map_or(0, |t| t.rows.len());
        println!("  {:<14} {:>8} rows  {}", sheet, rows, status(state));
    }

    let catalog = store.catalog();
    println!("\nProvinces: {}", store.provinces().len());
    println!(
        "Variables: {} annual, {} quarterly, {} rate",
        catalog.annual().len(),
        catalog.quarterly().len(),
        catalog.rate().len()
    );

    let roles = IndicatorRoles::resolve(&store, &compositions.sectors)
        .context("Indicator labels do not match the workbook")?;
    println!("\nRoles:");
    println!("  target sector: {}", roles.target_sector.as_deref().unwrap_or("-"));
    println!("  firms:         {}", roles.firms.as_deref().unwrap_or("-"));
    println!("  exports:       {}", roles.exports.as_deref().unwrap_or("-"));
    println!("  employment:    {}", roles.employment.as_deref().unwrap_or("-"));
    println!("  rate:          {}", roles.rate.as_deref().unwrap_or("-"));
    println!("  map indicators: {}", roles.map_indicators.len());

    if let Some(variable) = &args.variable {
        if !catalog.contains(variable) {
            anyhow::bail!("Unknown variable '{}'", variable);
        }
        println!("\nLatest '{}':", variable);
        for row in store.latest_by_province(variable) {
            println!("  {:<40} {:>12}  ({})", row.province, fmt_int_es(row.value), row.period);
        }
    }

    if let Some(path) = &args.export {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let rows = store
            .export_csv(BufWriter::new(file))
            .context("Failed to write CSV export")?;
        println!("\nExported {} observations to {}", rows, path.display());
    }

    let unavailable = [
        store.partition(Source::Annual).is_ready(),
        store.partition(Source::Quarterly).is_ready(),
        store.partition(Source::Rate).is_ready(),
        compositions.sectors.is_ready(),
        compositions.branches.is_ready(),
    ]
    .iter()
    .filter(|ready| !**ready)
    .count();

    if args.strict && unavailable > 0 {
        anyhow::bail!("{} sheet(s) unavailable", unavailable);
    }

    println!("\n=== Done ===");
    Ok(())
}
