//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::{Path, PathBuf};

/// psarep - grouped funnel summaries for HCP selection extracts
///
/// Aggregate a CSV extract of HCP selection requests and PSA activity into
/// per-group counts and funnel percentages, with a grand-total row. Output
/// as summary CSV, Markdown or JSON.
///
/// Examples:
///   psarep --input selections.csv
///   psarep --input selections.csv --group-by Affiliate,Month --format markdown
///   psarep --input selections.csv --count-mode rows --funnel
///   psarep --input selections.csv --dry-run
///   psarep --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Input CSV extract to summarize
    ///
    /// Not required when using --init-config.
    #[arg(short, long, value_name = "FILE", required_unless_present = "init_config")]
    pub input: Option<PathBuf>,

    /// Output file path for the summary
    ///
    /// With --format all, the extension is replaced per format.
    #[arg(short, long, default_value = "psa_summary.csv", value_name = "FILE")]
    pub output: PathBuf,

    /// Output format (csv, markdown, json, all)
    #[arg(long, default_value = "csv", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Grouping key columns (comma-separated)
    ///
    /// Example: --group-by "Affiliate,DIV_NAME"
    #[arg(long, value_name = "COLS", value_delimiter = ',')]
    pub group_by: Option<Vec<String>>,

    /// Column identifying a record for counting and distinctness
    #[arg(long, value_name = "COL")]
    pub identity: Option<String>,

    /// Flag columns to count, in funnel order (comma-separated)
    ///
    /// Example: --flags "Is PSA Created,PSA Activity Executed"
    #[arg(long, value_name = "COLS", value_delimiter = ',')]
    pub flags: Option<Vec<String>>,

    /// Counting mode (rows, distinct)
    ///
    /// Can also be set in .psarep.toml; distinct is the default.
    #[arg(long, value_name = "MODE")]
    pub count_mode: Option<CountModeArg>,

    /// Chain flag percentages: each flag after the first is measured
    /// against the previous flag's count instead of the base count
    #[arg(long)]
    pub funnel: bool,

    /// Treat unrecognized flag values as "not set" instead of failing
    #[arg(long)]
    pub lenient_flags: bool,

    /// Input field delimiter (single ASCII character)
    #[arg(long, value_name = "CHAR")]
    pub delimiter: Option<char>,

    /// Report title override
    #[arg(long, value_name = "TEXT")]
    pub title: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .psarep.toml in the current directory
    #[arg(short, long, value_name = "FILE", env = "PSAREP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: load and validate the input without writing a report
    ///
    /// Shows the resolved schema and row count and exits.
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .psarep.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the summary report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Flat summary CSV (default)
    #[default]
    Csv,
    /// Markdown report
    Markdown,
    /// JSON document
    Json,
    /// Every format, side by side
    All,
}

/// Counting mode for --count-mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CountModeArg {
    /// Count every input row
    Rows,
    /// Count distinct identity values
    Distinct,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the input path, empty if not set (should be validated first).
    pub fn input_path(&self) -> &Path {
        self.input.as_deref().unwrap_or(Path::new(""))
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Validate the input file
        match self.input {
            None => return Err("An input file is required (--input)".to_string()),
            Some(ref input) => {
                if !input.exists() {
                    return Err(format!("Input file does not exist: {}", input.display()));
                }
                if !input.is_file() {
                    return Err(format!("Input path is not a file: {}", input.display()));
                }
            }
        }

        // Validate the delimiter
        if let Some(delimiter) = self.delimiter {
            if !delimiter.is_ascii() {
                return Err(format!(
                    "Delimiter must be a single ASCII character, got {:?}",
                    delimiter
                ));
            }
        }

        // Validate column name lists
        if let Some(ref group_by) = self.group_by {
            if group_by.is_empty() || group_by.iter().any(|c| c.trim().is_empty()) {
                return Err("Group-by columns must be non-empty names".to_string());
            }
        }
        if let Some(ref flags) = self.flags {
            if flags.is_empty() || flags.iter().any(|c| c.trim().is_empty()) {
                return Err("Flag columns must be non-empty names".to_string());
            }
        }
        if let Some(ref identity) = self.identity {
            if identity.trim().is_empty() {
                return Err("Identity column must be a non-empty name".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            input: Some(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/psa_activity.csv")),
            output: PathBuf::from("psa_summary.csv"),
            format: OutputFormat::Csv,
            group_by: None,
            identity: None,
            flags: None,
            count_mode: None,
            funnel: false,
            lenient_flags: false,
            delimiter: None,
            title: None,
            config: None,
            verbose: false,
            quiet: false,
            dry_run: false,
            init_config: false,
        }
    }

    #[test]
    fn test_validation_accepts_fixture_input() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_missing_input() {
        let mut args = make_args();
        args.input = None;
        assert!(args.validate().is_err());

        args.input = Some(PathBuf::from("/nonexistent/extract.csv"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_wide_delimiter() {
        let mut args = make_args();
        args.delimiter = Some('→');
        assert!(args.validate().is_err());

        args.delimiter = Some(';');
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_blank_column_names() {
        let mut args = make_args();
        args.group_by = Some(vec!["Affiliate".to_string(), "  ".to_string()]);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.flags = Some(vec![]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.input = None;
        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
