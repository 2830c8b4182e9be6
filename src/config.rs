//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.psarep.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cli::{Args, CountModeArg};
use crate::models::{AggregationSpec, CountMode, DenominatorMode, FlagSpec};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Input reader settings.
    #[serde(default)]
    pub input: InputConfig,

    /// Aggregation settings.
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// Input reader settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Field delimiter character.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
        }
    }
}

fn default_delimiter() -> char {
    ','
}

/// Aggregation settings: what gets grouped, counted and chained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Grouping key columns, in key order.
    #[serde(default = "default_group_by")]
    pub group_by: Vec<String>,

    /// Column identifying a record for counting and distinctness.
    #[serde(default = "default_identity_field")]
    pub identity_field: String,

    /// How the base count is computed.
    #[serde(default)]
    pub count_mode: CountMode,

    /// Coerce unrecognized flag values to "not set" instead of failing.
    #[serde(default)]
    pub lenient_flags: bool,

    /// Display label for the base-count column.
    #[serde(default = "default_base_label")]
    pub base_label: Option<String>,

    /// Flag columns, in funnel order.
    #[serde(default = "default_flags")]
    pub flags: Vec<FlagSpec>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            group_by: default_group_by(),
            identity_field: default_identity_field(),
            count_mode: CountMode::default(),
            lenient_flags: false,
            base_label: default_base_label(),
            flags: default_flags(),
        }
    }
}

fn default_group_by() -> Vec<String> {
    vec!["Affiliate".to_string(), "DIV_NAME".to_string()]
}

fn default_identity_field() -> String {
    "HCP Selection Request ID".to_string()
}

fn default_base_label() -> Option<String> {
    Some("HCP Selection Request".to_string())
}

fn default_flags() -> Vec<FlagSpec> {
    vec![
        FlagSpec {
            field: "Is PSA Created".to_string(),
            label: Some("PSA Created".to_string()),
            denominator: DenominatorMode::Base,
        },
        FlagSpec::new("PSA Activity Executed", DenominatorMode::PriorFlag),
    ]
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Report title.
    #[serde(default = "default_title")]
    pub title: String,

    /// Include the "How to Read" legend in Markdown reports.
    #[serde(default = "default_true")]
    pub include_legend: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            include_legend: true,
        }
    }
}

fn default_title() -> String {
    "PSA Activity Summary".to_string()
}

fn default_true() -> bool {
    true
}

impl AggregationConfig {
    /// Build the engine-facing aggregation spec.
    pub fn to_spec(&self) -> AggregationSpec {
        AggregationSpec {
            group_by: self.group_by.clone(),
            identity_field: self.identity_field.clone(),
            flags: self.flags.clone(),
            count_mode: self.count_mode,
            lenient_flags: self.lenient_flags,
            base_label: self.base_label.clone(),
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(".psarep.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &Args) {
        // Input settings - only override if provided
        if let Some(delimiter) = args.delimiter {
            self.input.delimiter = delimiter;
        }

        // Aggregation settings - only override if provided
        if let Some(ref group_by) = args.group_by {
            self.aggregation.group_by = group_by.iter().map(|c| c.trim().to_string()).collect();
        }
        if let Some(ref identity) = args.identity {
            self.aggregation.identity_field = identity.trim().to_string();
            // The configured base label names the replaced identity column;
            // drop it so the base column falls back to the new field's name.
            self.aggregation.base_label = None;
        }
        if let Some(ref flags) = args.flags {
            // Flags named on the command line start base-relative;
            // --funnel rechains them below.
            self.aggregation.flags = flags
                .iter()
                .map(|field| FlagSpec::new(field.trim(), DenominatorMode::Base))
                .collect();
        }
        if let Some(mode) = args.count_mode {
            self.aggregation.count_mode = match mode {
                CountModeArg::Rows => CountMode::RowCount,
                CountModeArg::Distinct => CountMode::DistinctIdentity,
            };
        }

        // Flags always override
        if args.funnel {
            for flag in self.aggregation.flags.iter_mut().skip(1) {
                flag.denominator = DenominatorMode::PriorFlag;
            }
        }
        if args.lenient_flags {
            self.aggregation.lenient_flags = true;
        }

        // Report settings - only override if provided
        if let Some(ref title) = args.title {
            self.report.title = title.clone();
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
