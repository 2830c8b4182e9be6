//! Data models for the summary pipeline.
//!
//! This module contains the core data structures shared by the loader,
//! the aggregation engine and the report writers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single cell value as read from the input table.
///
/// The loader infers the variant from the raw text: finite numbers become
/// [`Value::Number`], `true`/`false` (any case) become [`Value::Bool`], the
/// empty string becomes [`Value::Empty`] and everything else stays
/// [`Value::Text`]. Non-finite numeric spellings (`NaN`, `inf`) stay text so
/// that grouping keys keep a total order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A finite number.
    Number(f64),
    /// A boolean marker.
    Bool(bool),
    /// Free text.
    Text(String),
    /// A blank cell.
    Empty,
}

impl Value {
    /// Parse one raw CSV cell into a typed value.
    pub fn parse_cell(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Empty;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
        if let Ok(number) = trimmed.parse::<f64>() {
            if number.is_finite() {
                // Fold -0.0 into 0.0 so equal-looking keys land in one group.
                return Value::Number(if number == 0.0 { 0.0 } else { number });
            }
        }
        Value::Text(raw.to_string())
    }

    /// Whether this is a blank cell.
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Total order over values: Empty < Bool < Number < Text, numbers by
    /// `f64::total_cmp`, text and booleans by their natural order.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Empty, Value::Empty) => Ordering::Equal,
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Empty => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::Text(_) => 3,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            // Integral numbers print without a trailing ".0" so identifiers
            // such as request ids render the way they appeared in the input.
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Empty => Ok(()),
        }
    }
}

/// An in-memory tabular dataset: a header row plus data rows.
///
/// Each row's values align positionally with `headers`, so a row is the
/// ordered field-name-to-value mapping of one input record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Column names from the header row, in file order.
    pub headers: Vec<String>,
    /// Data rows, one `Vec<Value>` per record.
    pub rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Look up a column index by exact header name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Number of data rows (the header row is not counted).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset holds no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// How the base count of a group is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CountMode {
    /// Count every row in the group.
    #[serde(rename = "rows")]
    RowCount,
    /// Count distinct identity values in the group, so one identity spread
    /// over several rows counts once.
    #[default]
    #[serde(rename = "distinct")]
    DistinctIdentity,
}

impl fmt::Display for CountMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountMode::RowCount => write!(f, "rows"),
            CountMode::DistinctIdentity => write!(f, "distinct identities"),
        }
    }
}

/// Which denominator a flag's percentage is taken against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DenominatorMode {
    /// Percentage of the group's base count.
    #[default]
    #[serde(rename = "base")]
    Base,
    /// Percentage of the previous flag's count (a funnel stage). The first
    /// flag has no prior stage and falls back to the base count.
    #[serde(rename = "prior")]
    PriorFlag,
}

/// One flag column to aggregate: an event marker whose value of 1 means the
/// event occurred for that record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagSpec {
    /// Column holding the 0/1 event marker.
    pub field: String,
    /// Display label for report columns. Defaults to the field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Denominator used for this flag's percentage.
    #[serde(default)]
    pub denominator: DenominatorMode,
}

impl FlagSpec {
    /// Create a flag spec with no custom label.
    pub fn new(field: impl Into<String>, denominator: DenominatorMode) -> Self {
        Self {
            field: field.into(),
            label: None,
            denominator,
        }
    }

    /// The label shown in report columns.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.field)
    }
}

/// Full description of one aggregation run.
///
/// Flag order matters: it defines the funnel stage order that
/// [`DenominatorMode::PriorFlag`] chains through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    /// Grouping key columns, in key order.
    pub group_by: Vec<String>,
    /// Column whose values identify a record for counting / distinctness.
    pub identity_field: String,
    /// Flag columns, in funnel order.
    pub flags: Vec<FlagSpec>,
    /// How the base count is computed.
    #[serde(default)]
    pub count_mode: CountMode,
    /// Coerce unrecognized flag values to "not set" instead of failing.
    #[serde(default)]
    pub lenient_flags: bool,
    /// Display label for the base-count column. Defaults to the identity
    /// field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_label: Option<String>,
}

/// One aggregated output row: a group's key values plus its counts and
/// derived percentages. Never mutated after the engine builds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// Grouping-key values. Empty for the grand-total record; writers render
    /// the `Total` label themselves.
    pub key: Vec<Value>,
    /// Row count or distinct identity count, per the run's [`CountMode`].
    pub base_count: u64,
    /// One count per flag, in flag order.
    pub flag_counts: Vec<u64>,
    /// One percentage per flag, rounded to two decimals; 0 whenever the
    /// denominator was 0.
    pub flag_percents: Vec<f64>,
}

/// The engine's output: per-group records in a pinned order plus the
/// grand-total record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// One record per distinct group key, lexicographic by key tuple.
    pub groups: Vec<SummaryRecord>,
    /// The grand total: counts summed over all groups, percentages
    /// recomputed from those sums.
    pub total: SummaryRecord,
}

impl Summary {
    /// Whether the run saw no groups at all (empty input).
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Column labels used by every report writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryColumns {
    /// Labels for the grouping-key columns.
    pub key_labels: Vec<String>,
    /// Label for the base-count column.
    pub base_label: String,
    /// Labels for the flag-count columns; the percentage column label is
    /// derived by appending ` %`.
    pub flag_labels: Vec<String>,
}

impl SummaryColumns {
    /// Derive report column labels from an aggregation spec.
    pub fn from_spec(spec: &AggregationSpec) -> Self {
        Self {
            key_labels: spec.group_by.clone(),
            base_label: spec
                .base_label
                .clone()
                .unwrap_or_else(|| spec.identity_field.clone()),
            flag_labels: spec
                .flags
                .iter()
                .map(|f| f.display_label().to_string())
                .collect(),
        }
    }
}

/// Metadata about one summary run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Path of the input extract.
    pub input_path: String,
    /// When the summary was generated.
    pub generated_at: DateTime<Utc>,
    /// Number of data rows read from the input.
    pub rows_read: usize,
    /// Number of distinct groups in the summary.
    pub group_count: usize,
    /// How base counts were computed.
    pub count_mode: CountMode,
    /// Grouping key columns, in key order.
    pub group_by: Vec<String>,
    /// Identity column used for counting.
    pub identity_field: String,
}

/// The complete summary report handed to the writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Report title (Markdown heading).
    pub title: String,
    /// Metadata about the run.
    pub metadata: ReportMetadata,
    /// Column labels shared by all writers.
    pub columns: SummaryColumns,
    /// The aggregated summary.
    pub summary: Summary,
}
