//! Grouped aggregation and percentage rollups.
//!
//! The engine partitions input records by a tuple of grouping keys, counts a
//! base population per group (raw rows or distinct identities), counts each
//! event flag, and derives one percentage per flag with a configurable
//! denominator (share of the base, or share of the previous funnel stage).
//! A grand-total record sums the per-group counts and recomputes its
//! percentages from those sums.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use thiserror::Error;
use tracing::warn;

use crate::models::{
    AggregationSpec, CountMode, Dataset, DenominatorMode, FlagSpec, Summary, SummaryRecord, Value,
};

static EMPTY_CELL: Value = Value::Empty;

/// Input problems caught before any counting happens.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("required column not found in input: {0:?}")]
    MissingField(String),

    #[error("column {0:?} is referenced more than once across group-by, identity and flags")]
    DuplicateField(String),

    #[error(
        "flag column {field:?} holds {value:?} at data row {row}; expected 0, 1, true, false or blank"
    )]
    InvalidFlagValue {
        field: String,
        row: usize,
        value: String,
    },

    #[error("no grouping keys configured")]
    NoGroupKeys,

    #[error("no flag fields configured")]
    NoFlagFields,
}

/// Ordered tuple of grouping-key values. Identifies one summary row.
#[derive(Debug, Clone)]
struct GroupKey(Vec<Value>);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.total_cmp(b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

/// Column indices for the configured fields, resolved against the header
/// row once up front.
struct ResolvedSpec {
    key_cols: Vec<usize>,
    identity_col: usize,
    flag_cols: Vec<usize>,
}

fn resolve(dataset: &Dataset, spec: &AggregationSpec) -> Result<ResolvedSpec, EngineError> {
    if spec.group_by.is_empty() {
        return Err(EngineError::NoGroupKeys);
    }
    if spec.flags.is_empty() {
        return Err(EngineError::NoFlagFields);
    }

    let mut seen = HashSet::new();
    let mut key_cols = Vec::with_capacity(spec.group_by.len());
    for name in &spec.group_by {
        key_cols.push(resolve_column(dataset, &mut seen, name)?);
    }
    let identity_col = resolve_column(dataset, &mut seen, &spec.identity_field)?;
    let mut flag_cols = Vec::with_capacity(spec.flags.len());
    for flag in &spec.flags {
        flag_cols.push(resolve_column(dataset, &mut seen, &flag.field)?);
    }

    Ok(ResolvedSpec {
        key_cols,
        identity_col,
        flag_cols,
    })
}

fn resolve_column(
    dataset: &Dataset,
    seen: &mut HashSet<String>,
    name: &str,
) -> Result<usize, EngineError> {
    if !seen.insert(name.to_string()) {
        return Err(EngineError::DuplicateField(name.to_string()));
    }
    dataset
        .column_index(name)
        .ok_or_else(|| EngineError::MissingField(name.to_string()))
}

/// Interpret one flag cell. `None` means the value falls outside the
/// accepted 0 / 1 / true / false / blank alphabet.
fn flag_state(value: &Value) -> Option<bool> {
    match value {
        Value::Empty => Some(false),
        Value::Bool(b) => Some(*b),
        Value::Number(n) if *n == 0.0 => Some(false),
        Value::Number(n) if *n == 1.0 => Some(true),
        Value::Number(_) => None,
        Value::Text(s) => match s.trim() {
            "" | "0" => Some(false),
            "1" => Some(true),
            t if t.eq_ignore_ascii_case("true") => Some(true),
            t if t.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        },
    }
}

/// Check `spec` against `dataset` without aggregating.
///
/// Catches both fatal input classes: columns missing from the header row,
/// and flag cells outside the 0/1/true/false/blank alphabet (skipped in
/// lenient mode). [`aggregate`] runs the same checks itself, so this is
/// only needed for validate-only flows such as a dry run.
pub fn validate(dataset: &Dataset, spec: &AggregationSpec) -> Result<(), EngineError> {
    let resolved = resolve(dataset, spec)?;
    validate_flag_values(dataset, spec, &resolved)
}

fn validate_flag_values(
    dataset: &Dataset,
    spec: &AggregationSpec,
    resolved: &ResolvedSpec,
) -> Result<(), EngineError> {
    if spec.lenient_flags {
        return Ok(());
    }
    for (flag, &col) in spec.flags.iter().zip(&resolved.flag_cols) {
        for (row_idx, row) in dataset.rows.iter().enumerate() {
            let value = row.get(col).unwrap_or(&EMPTY_CELL);
            if flag_state(value).is_none() {
                return Err(EngineError::InvalidFlagValue {
                    field: flag.field.clone(),
                    // 1-based, counting data rows only
                    row: row_idx + 1,
                    value: value.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Running counts for one group.
struct GroupAccumulator {
    row_count: u64,
    identities: HashSet<String>,
    flag_row_counts: Vec<u64>,
    flag_identities: Vec<HashSet<String>>,
}

impl GroupAccumulator {
    fn new(flag_count: usize) -> Self {
        Self {
            row_count: 0,
            identities: HashSet::new(),
            flag_row_counts: vec![0; flag_count],
            flag_identities: vec![HashSet::new(); flag_count],
        }
    }

    fn absorb(&mut self, identity: &Value, flag_states: &[bool], mode: CountMode) {
        self.row_count += 1;
        match mode {
            CountMode::RowCount => {
                for (count, &set) in self.flag_row_counts.iter_mut().zip(flag_states) {
                    if set {
                        *count += 1;
                    }
                }
            }
            CountMode::DistinctIdentity => {
                // Blank identities never count as distinct.
                if identity.is_empty() {
                    return;
                }
                let id = identity.to_string();
                for (ids, &set) in self.flag_identities.iter_mut().zip(flag_states) {
                    if set {
                        ids.insert(id.clone());
                    }
                }
                self.identities.insert(id);
            }
        }
    }

    fn base_count(&self, mode: CountMode) -> u64 {
        match mode {
            CountMode::RowCount => self.row_count,
            CountMode::DistinctIdentity => self.identities.len() as u64,
        }
    }

    fn flag_count(&self, index: usize, mode: CountMode) -> u64 {
        match mode {
            CountMode::RowCount => self.flag_row_counts[index],
            CountMode::DistinctIdentity => self.flag_identities[index].len() as u64,
        }
    }
}

/// Aggregate `dataset` into one summary record per group plus a grand total.
///
/// Groups come back in lexicographic order of their key tuples. The total's
/// counts are sums of the per-group counts (in distinct mode an identity
/// appearing in two groups counts once in each), and its percentages are
/// recomputed from those sums rather than averaged across groups.
///
/// Pure with respect to its inputs: no I/O, `dataset` is not modified.
/// Empty input yields an empty group list and an all-zero total.
pub fn aggregate(dataset: &Dataset, spec: &AggregationSpec) -> Result<Summary, EngineError> {
    let resolved = resolve(dataset, spec)?;
    validate_flag_values(dataset, spec, &resolved)?;

    let mut groups: BTreeMap<GroupKey, GroupAccumulator> = BTreeMap::new();
    let mut flag_states = vec![false; spec.flags.len()];

    for row in &dataset.rows {
        for (state, &col) in flag_states.iter_mut().zip(&resolved.flag_cols) {
            let value = row.get(col).unwrap_or(&EMPTY_CELL);
            *state = flag_state(value).unwrap_or_else(|| {
                warn!(
                    "Treating unrecognized flag value {:?} as not set",
                    value.to_string()
                );
                false
            });
        }

        let key = GroupKey(
            resolved
                .key_cols
                .iter()
                .map(|&col| row.get(col).cloned().unwrap_or(Value::Empty))
                .collect(),
        );
        let identity = row.get(resolved.identity_col).unwrap_or(&EMPTY_CELL);

        groups
            .entry(key)
            .or_insert_with(|| GroupAccumulator::new(spec.flags.len()))
            .absorb(identity, &flag_states, spec.count_mode);
    }

    let mut records = Vec::with_capacity(groups.len());
    let mut total_base = 0u64;
    let mut total_flags = vec![0u64; spec.flags.len()];

    for (key, acc) in groups {
        let base_count = acc.base_count(spec.count_mode);
        let flag_counts: Vec<u64> = (0..spec.flags.len())
            .map(|i| acc.flag_count(i, spec.count_mode))
            .collect();

        total_base += base_count;
        for (total, count) in total_flags.iter_mut().zip(&flag_counts) {
            *total += count;
        }

        let flag_percents = derive_percents(base_count, &flag_counts, &spec.flags);
        records.push(SummaryRecord {
            key: key.0,
            base_count,
            flag_counts,
            flag_percents,
        });
    }

    let total_percents = derive_percents(total_base, &total_flags, &spec.flags);
    let total = SummaryRecord {
        key: Vec::new(),
        base_count: total_base,
        flag_counts: total_flags,
        flag_percents: total_percents,
    };

    Ok(Summary {
        groups: records,
        total,
    })
}

/// Derive one percentage per flag, honoring each flag's denominator mode.
fn derive_percents(base_count: u64, flag_counts: &[u64], flags: &[FlagSpec]) -> Vec<f64> {
    let mut percents = Vec::with_capacity(flags.len());
    for (i, flag) in flags.iter().enumerate() {
        let denominator = match flag.denominator {
            DenominatorMode::Base => base_count,
            DenominatorMode::PriorFlag if i > 0 => flag_counts[i - 1],
            // The first flag has no prior stage to chain off.
            DenominatorMode::PriorFlag => base_count,
        };
        percents.push(percent_of(flag_counts[i], denominator));
    }
    percents
}

/// `count / denominator * 100` rounded to two decimals. A zero denominator
/// yields 0, never NaN.
fn percent_of(count: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round2(count as f64 / denominator as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
