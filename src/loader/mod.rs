//! CSV input loading.
//!
//! Reads a delimited extract into the in-memory [`Dataset`] the engine
//! consumes: one header row plus positionally typed data rows. Cell typing
//! lives in [`Value::parse_cell`]; this module only handles the wire format.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::models::{Dataset, Value};

/// Reader-level options, independent of what gets aggregated.
#[derive(Debug, Clone, Copy)]
pub struct InputOptions {
    /// Field delimiter byte. Defaults to a comma.
    pub delimiter: u8,
}

impl Default for InputOptions {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl InputOptions {
    /// Build options from a configured delimiter character.
    ///
    /// The csv reader splits on single bytes, so multi-byte characters are
    /// rejected here rather than silently mis-splitting rows.
    pub fn from_delimiter(delimiter: char) -> Result<Self> {
        let byte = u8::try_from(delimiter).map_err(|_| {
            anyhow::anyhow!("Delimiter {delimiter:?} is not a single-byte character")
        })?;
        Ok(Self { delimiter: byte })
    }
}

/// Load a delimited file from `path` into a [`Dataset`].
pub fn load_csv(path: &Path, options: InputOptions) -> Result<Dataset> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;
    read_dataset(file, options)
        .with_context(|| format!("Failed to read input file: {}", path.display()))
}

/// Read a delimited stream into a [`Dataset`].
///
/// The first record is the header row; header cells are trimmed so padded
/// exports still resolve by exact name. Rows may be ragged: short rows are
/// kept as-is and missing cells read as blank downstream.
pub fn read_dataset<R: Read>(reader: R, options: InputOptions) -> Result<Dataset> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .context("Failed to read header row")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        bail!("Input has no usable header row");
    }

    let mut seen = HashSet::new();
    for header in &headers {
        if !header.is_empty() && !seen.insert(header.as_str()) {
            bail!("Duplicate column name in header row: {header:?}");
        }
    }

    let mut rows = Vec::with_capacity(16);
    for (idx, record) in csv_reader.records().enumerate() {
        let record =
            record.with_context(|| format!("Failed to parse data row {}", idx + 1))?;
        rows.push(record.iter().map(Value::parse_cell).collect());
    }

    Ok(Dataset { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine;
    use crate::models::{AggregationSpec, CountMode, DenominatorMode, FlagSpec};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn fixture_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/psa_activity.csv")
    }

    #[test]
    fn test_read_dataset_types_cells() {
        let input = " Affiliate , Request ID ,Is PSA Created\nJP,101,1\nBR,expired,\n";
        let data = read_dataset(input.as_bytes(), InputOptions::default()).unwrap();

        assert_eq!(data.headers, vec!["Affiliate", "Request ID", "Is PSA Created"]);
        assert_eq!(data.row_count(), 2);
        assert_eq!(data.rows[0][1], Value::Number(101.0));
        assert_eq!(data.rows[0][2], Value::Number(1.0));
        assert_eq!(data.rows[1][1], Value::Text("expired".to_string()));
        assert_eq!(data.rows[1][2], Value::Empty);
    }

    #[test]
    fn test_read_dataset_semicolon_delimiter() {
        let input = "Affiliate;Request ID\nJP;101\n";
        let options = InputOptions::from_delimiter(';').unwrap();
        let data = read_dataset(input.as_bytes(), options).unwrap();

        assert_eq!(data.headers, vec!["Affiliate", "Request ID"]);
        assert_eq!(data.rows[0][0], Value::Text("JP".to_string()));
    }

    #[test]
    fn test_read_dataset_keeps_short_rows_ragged() {
        let input = "Affiliate,Request ID,Is PSA Created\nJP\n";
        let data = read_dataset(input.as_bytes(), InputOptions::default()).unwrap();

        assert_eq!(data.rows.len(), 1);
        assert_eq!(data.rows[0].len(), 1);
    }

    #[test]
    fn test_read_dataset_ignores_surplus_cells() {
        // Rows longer than the header load as-is; only named columns count.
        let input = "Affiliate,Request ID,Is PSA Created\nJP,101,1,stray,extra\n";
        let data = read_dataset(input.as_bytes(), InputOptions::default()).unwrap();

        assert_eq!(data.headers.len(), 3);
        assert_eq!(data.rows[0].len(), 5);

        let spec = AggregationSpec {
            group_by: vec!["Affiliate".to_string()],
            identity_field: "Request ID".to_string(),
            flags: vec![FlagSpec::new("Is PSA Created", DenominatorMode::Base)],
            count_mode: CountMode::DistinctIdentity,
            lenient_flags: false,
            base_label: None,
        };
        let summary = engine::aggregate(&data, &spec).unwrap();
        assert_eq!(summary.groups.len(), 1);
        assert_eq!(summary.groups[0].base_count, 1);
        assert_eq!(summary.groups[0].flag_counts, vec![1]);
        assert_eq!(summary.groups[0].flag_percents, vec![100.0]);
    }

    #[test]
    fn test_read_dataset_accepts_header_only_input() {
        let data =
            read_dataset("Affiliate,Request ID\n".as_bytes(), InputOptions::default()).unwrap();
        assert!(data.is_empty());
        assert_eq!(data.headers.len(), 2);
    }

    #[test]
    fn test_read_dataset_rejects_empty_input() {
        assert!(read_dataset("".as_bytes(), InputOptions::default()).is_err());
    }

    #[test]
    fn test_read_dataset_rejects_blank_header_row() {
        let input = ",,\nJP,Oncology,1\n";
        let err = read_dataset(input.as_bytes(), InputOptions::default()).unwrap_err();
        assert!(err.to_string().contains("no usable header row"));

        let padded = " , , \nJP,Oncology,1\n";
        assert!(read_dataset(padded.as_bytes(), InputOptions::default()).is_err());
    }

    #[test]
    fn test_read_dataset_rejects_duplicate_headers() {
        let input = "Affiliate,Affiliate\nJP,BR\n";
        let err = read_dataset(input.as_bytes(), InputOptions::default()).unwrap_err();
        assert!(err.to_string().contains("Duplicate column name"));
    }

    #[test]
    fn test_from_delimiter_rejects_multi_byte() {
        assert!(InputOptions::from_delimiter('→').is_err());
        assert_eq!(InputOptions::from_delimiter('\t').unwrap().delimiter, b'\t');
    }

    #[test]
    fn test_load_csv_reads_fixture() {
        let data = load_csv(&fixture_path(), InputOptions::default()).unwrap();

        assert_eq!(data.headers[0], "Affiliate");
        assert!(data.column_index("HCP Selection Request ID").is_some());
        assert!(data.column_index("PSA Activity Executed").is_some());
        assert_eq!(data.row_count(), 12);
    }

    #[test]
    fn test_load_csv_missing_file_errors() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.csv");
        let err = load_csv(&missing, InputOptions::default()).unwrap_err();
        assert!(err.to_string().contains("Failed to open input file"));
    }
}
