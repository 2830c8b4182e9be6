//! psarep - PSA activity summary reporter
//!
//! A CLI tool that aggregates HCP selection / PSA activity extracts
//! into grouped counts and funnel percentages and renders summary reports.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (I/O, config, malformed input file)
//!   2 - Input failed validation against the aggregation settings

mod cli;
mod config;
mod engine;
mod loader;
mod models;
mod report;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::Args;
use config::Config;
use models::{AggregationSpec, Dataset, Report, ReportMetadata, SummaryColumns};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("psarep v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    // Run the summary
    match run_summary(args) {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Summary failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .psarep.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(".psarep.toml");

    if path.exists() {
        eprintln!("⚠️  .psarep.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .psarep.toml")?;

    println!("✅ Created .psarep.toml with default settings.");
    println!("   Edit it to customize grouping, flags, counting, and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete summary workflow. Returns exit code (0 or 2).
fn run_summary(args: Args) -> Result<i32> {
    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let input_path = args.input_path().to_path_buf();

    // Step 1: Load the extract
    println!("📥 Loading extract: {}", input_path.display());
    let options = loader::InputOptions::from_delimiter(config.input.delimiter)?;
    let dataset = loader::load_csv(&input_path, options)?;
    info!(
        "Read {} data rows, {} columns",
        dataset.row_count(),
        dataset.headers.len()
    );

    let spec = config.aggregation.to_spec();

    // Handle --dry-run: validate the input and exit
    if args.dry_run {
        return handle_dry_run(&dataset, &spec);
    }

    // Step 2: Aggregate
    println!("🔢 Aggregating {} rows...", dataset.row_count());
    println!("   Grouping by: {}", spec.group_by.join(", "));
    println!("   Identity: {}", spec.identity_field);
    println!("   Counting: {}", spec.count_mode);

    let summary = match engine::aggregate(&dataset, &spec) {
        Ok(summary) => summary,
        Err(e) => {
            error!("Input failed validation: {}", e);
            eprintln!("\n⛔ Input failed validation: {}", e);
            return Ok(2);
        }
    };

    if summary.is_empty() {
        warn!("Input has no data rows; the summary holds only the total row");
    }

    // Step 3: Build the report
    println!("\n📝 Generating report...");

    let columns = SummaryColumns::from_spec(&spec);
    let metadata = ReportMetadata {
        input_path: input_path.display().to_string(),
        generated_at: Utc::now(),
        rows_read: dataset.row_count(),
        group_count: summary.groups.len(),
        count_mode: spec.count_mode,
        group_by: spec.group_by.clone(),
        identity_field: spec.identity_field.clone(),
    };
    let report = Report {
        title: config.report.title.clone(),
        metadata,
        columns,
        summary,
    };

    // Step 4: Write the report in the requested format(s)
    let written = report::write_outputs(
        &report,
        args.format,
        config.report.include_legend,
        &args.output,
    )?;

    // Print summary
    println!("\n📊 Summary:");
    println!("   Groups: {}", report.summary.groups.len());
    println!(
        "   {}: {}",
        report.columns.base_label, report.summary.total.base_count
    );
    for (i, label) in report.columns.flag_labels.iter().enumerate() {
        println!(
            "   - {}: {} ({:.2}%)",
            label,
            report.summary.total.flag_counts.get(i).copied().unwrap_or(0),
            report
                .summary
                .total
                .flag_percents
                .get(i)
                .copied()
                .unwrap_or(0.0),
        );
    }

    println!();
    for path in &written {
        println!("✅ Report saved to: {}", path.display());
    }

    Ok(0)
}

/// Handle --dry-run: check the input against the settings, print the
/// resolved schema, exit.
fn handle_dry_run(dataset: &Dataset, spec: &AggregationSpec) -> Result<i32> {
    println!("\n🔍 Dry run: validating input (no report written)...\n");

    println!("   Rows: {}", dataset.row_count());
    println!("   Columns: {}", dataset.headers.join(", "));
    println!("   Grouping by: {}", spec.group_by.join(", "));
    println!("   Identity: {}", spec.identity_field);
    let flag_names: Vec<&str> = spec.flags.iter().map(|f| f.field.as_str()).collect();
    println!("   Flags: {}", flag_names.join(", "));
    println!("   Counting: {}", spec.count_mode);

    if let Err(e) = engine::validate(dataset, spec) {
        eprintln!("\n⛔ Input failed validation: {}", e);
        return Ok(2);
    }

    println!("\n✅ Dry run complete. Input is valid for these settings.");
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .psarep.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
