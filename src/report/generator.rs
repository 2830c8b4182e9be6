//! Summary report generation.
//!
//! This module renders the aggregated summary into the supported output
//! formats: the flat summary CSV that downstream spreadsheets ingest, a
//! human-readable Markdown report and a JSON document for tooling.

use crate::cli::OutputFormat;
use crate::models::{Report, ReportMetadata, Summary, SummaryColumns, SummaryRecord};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Label rendered in the first key column of the grand-total row.
pub const TOTAL_LABEL: &str = "Total";

/// Render the summary as CSV text: header row, one row per group in engine
/// order, and the grand-total row last.
///
/// The total row carries the `Total` label in its first key column and
/// blanks in the remaining key columns, so spreadsheet filters keep it
/// apart from real groups.
pub fn generate_summary_csv(columns: &SummaryColumns, summary: &Summary) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(header_cells(columns))
        .context("Failed to write summary header")?;

    for record in &summary.groups {
        writer
            .write_record(record_cells(columns, record, false))
            .context("Failed to write summary row")?;
    }
    writer
        .write_record(record_cells(columns, &summary.total, true))
        .context("Failed to write total row")?;

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush summary csv: {}", e))?;
    String::from_utf8(bytes).context("Summary csv was not valid UTF-8")
}

/// Header cells shared by the CSV and Markdown tables: key columns, the
/// base-count column, then a count and a `%` column per flag.
fn header_cells(columns: &SummaryColumns) -> Vec<String> {
    let mut cells =
        Vec::with_capacity(columns.key_labels.len() + 1 + columns.flag_labels.len() * 2);
    cells.extend(columns.key_labels.iter().cloned());
    cells.push(columns.base_label.clone());
    for label in &columns.flag_labels {
        cells.push(label.clone());
        cells.push(format!("{} %", label));
    }
    cells
}

/// Cells for one summary row. Percentages always render with two decimals.
fn record_cells(columns: &SummaryColumns, record: &SummaryRecord, is_total: bool) -> Vec<String> {
    let key_width = columns.key_labels.len();
    let mut cells = Vec::with_capacity(key_width + 1 + record.flag_counts.len() * 2);

    if is_total {
        cells.push(TOTAL_LABEL.to_string());
    } else {
        cells.extend(record.key.iter().map(|v| v.to_string()));
    }
    // Pad ragged keys (and the total row) out to the full key width.
    cells.resize(key_width, String::new());

    cells.push(record.base_count.to_string());
    for (count, percent) in record.flag_counts.iter().zip(&record.flag_percents) {
        cells.push(count.to_string());
        cells.push(format!("{:.2}", percent));
    }
    cells
}

/// Join cells into one Markdown table row, escaping `|` inside cell text so
/// arbitrary key values cannot break the table.
fn markdown_row(cells: &[String]) -> String {
    let escaped: Vec<String> = cells.iter().map(|cell| cell.replace('|', "\\|")).collect();
    format!("| {} |\n", escaped.join(" | "))
}

/// Write the summary CSV to a file.
pub fn write_summary_csv(columns: &SummaryColumns, summary: &Summary, path: &Path) -> Result<()> {
    let content = generate_summary_csv(columns, summary)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write summary to {}", path.display()))?;
    Ok(())
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, include_legend: bool) -> String {
    let mut output = String::new();

    // Title
    output.push_str(&format!("# {}\n\n", report.title));

    // Metadata section
    output.push_str(&generate_metadata_section(&report.metadata));

    // Summary table
    output.push_str(&generate_summary_section(&report.columns, &report.summary));

    // Total-level funnel
    output.push_str(&generate_funnel_section(&report.columns, &report.summary));

    // Reading guide
    if include_legend {
        output.push_str(&generate_legend_section());
    }

    // Footer
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Input:** `{}`\n", metadata.input_path));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Rows Read:** {}\n", metadata.rows_read));
    section.push_str(&format!("- **Groups:** {}\n", metadata.group_count));
    section.push_str(&format!("- **Counting:** {}\n", metadata.count_mode));
    section.push_str(&format!(
        "- **Grouped By:** {}\n",
        metadata.group_by.join(", ")
    ));
    section.push_str(&format!(
        "- **Identity Column:** {}\n",
        metadata.identity_field
    ));
    section.push_str("\n");

    section
}

/// Generate the summary table section.
fn generate_summary_section(columns: &SummaryColumns, summary: &Summary) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");

    if summary.is_empty() {
        section.push_str("No data rows were found in the input.\n\n");
    }

    let headers = header_cells(columns);
    section.push_str(&markdown_row(&headers));

    // Key columns left-aligned, every count and % column right-aligned.
    let mut align = String::from("|");
    for i in 0..headers.len() {
        align.push_str(if i < columns.key_labels.len() {
            ":---|"
        } else {
            "---:|"
        });
    }
    section.push_str(&align);
    section.push_str("\n");

    for record in &summary.groups {
        section.push_str(&markdown_row(&record_cells(columns, record, false)));
    }

    let mut total_cells = record_cells(columns, &summary.total, true);
    if let Some(first) = total_cells.first_mut() {
        *first = format!("**{}**", TOTAL_LABEL);
    }
    section.push_str(&markdown_row(&total_cells));
    section.push_str("\n");

    section
}

/// Generate the total-level funnel section.
fn generate_funnel_section(columns: &SummaryColumns, summary: &Summary) -> String {
    let mut section = String::new();

    section.push_str("## Funnel Overview\n\n");
    section.push_str(&format!(
        "- **{}:** {}\n",
        columns.base_label, summary.total.base_count
    ));

    for (i, label) in columns.flag_labels.iter().enumerate() {
        let count = summary.total.flag_counts.get(i).copied().unwrap_or(0);
        let percent = summary.total.flag_percents.get(i).copied().unwrap_or(0.0);
        section.push_str(&format!("- **{}:** {} ({:.2}%)\n", label, count, percent));
    }
    section.push_str("\n");

    section
}

/// Generate the reading guide section.
fn generate_legend_section() -> String {
    let mut section = String::new();

    section.push_str("## How to Read\n\n");
    section.push_str("- Count columns hold the base population of each group; the Metadata section says whether rows or distinct identities were counted.\n");
    section.push_str("- `%` columns are rounded to two decimals and read 0 whenever their denominator is 0.\n");
    section.push_str("- A percentage is taken against the group's base count, or against the previous stage's count for chained funnel columns.\n");
    section.push_str("- The **Total** row recomputes its percentages from the summed counts; it is not an average of the group percentages.\n");
    section.push_str("\n");

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by psarep v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Write the Markdown report to a file.
pub fn write_markdown_report(report: &Report, include_legend: bool, path: &Path) -> Result<()> {
    let content = generate_markdown_report(report, include_legend);
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write a JSON report to a file.
pub fn write_json_report(report: &Report, path: &Path) -> Result<()> {
    let content = generate_json_report(report)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}

/// Write the report in the requested format(s). Returns the written paths.
///
/// Single formats write to `output` as given; `all` derives sibling `.csv`,
/// `.md` and `.json` paths by swapping the extension of `output`.
pub fn write_outputs(
    report: &Report,
    format: OutputFormat,
    include_legend: bool,
    output: &Path,
) -> Result<Vec<PathBuf>> {
    let paths = match format {
        OutputFormat::Csv => {
            write_summary_csv(&report.columns, &report.summary, output)?;
            vec![output.to_path_buf()]
        }
        OutputFormat::Markdown => {
            write_markdown_report(report, include_legend, output)?;
            vec![output.to_path_buf()]
        }
        OutputFormat::Json => {
            write_json_report(report, output)?;
            vec![output.to_path_buf()]
        }
        OutputFormat::All => {
            let csv_path = output.with_extension("csv");
            let md_path = output.with_extension("md");
            let json_path = output.with_extension("json");

            write_summary_csv(&report.columns, &report.summary, &csv_path)?;
            write_markdown_report(report, include_legend, &md_path)?;
            write_json_report(report, &json_path)?;
            vec![csv_path, md_path, json_path]
        }
    };

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CountMode, Value};
    use chrono::Utc;
    use tempfile::TempDir;

    fn create_test_report() -> Report {
        let columns = SummaryColumns {
            key_labels: vec!["Affiliate".to_string(), "DIV_NAME".to_string()],
            base_label: "HCP Selection Request".to_string(),
            flag_labels: vec![
                "PSA Created".to_string(),
                "PSA Activity Executed".to_string(),
            ],
        };

        let groups = vec![
            SummaryRecord {
                key: vec![
                    Value::Text("JP".to_string()),
                    Value::Text("Oncology".to_string()),
                ],
                base_count: 2,
                flag_counts: vec![2, 1],
                flag_percents: vec![100.0, 50.0],
            },
            SummaryRecord {
                key: vec![
                    Value::Text("JP".to_string()),
                    Value::Text("Vaccines".to_string()),
                ],
                base_count: 2,
                flag_counts: vec![1, 1],
                flag_percents: vec![50.0, 100.0],
            },
        ];
        let total = SummaryRecord {
            key: Vec::new(),
            base_count: 4,
            flag_counts: vec![3, 2],
            flag_percents: vec![75.0, 66.67],
        };

        Report {
            title: "PSA Activity Summary".to_string(),
            metadata: ReportMetadata {
                input_path: "fixtures/psa_activity.csv".to_string(),
                generated_at: Utc::now(),
                rows_read: 4,
                group_count: 2,
                count_mode: CountMode::DistinctIdentity,
                group_by: vec!["Affiliate".to_string(), "DIV_NAME".to_string()],
                identity_field: "HCP Selection Request ID".to_string(),
            },
            columns,
            summary: Summary { groups, total },
        }
    }

    #[test]
    fn test_generate_summary_csv() {
        let report = create_test_report();
        let csv = generate_summary_csv(&report.columns, &report.summary).unwrap();

        let expected = "\
Affiliate,DIV_NAME,HCP Selection Request,PSA Created,PSA Created %,PSA Activity Executed,PSA Activity Executed %
JP,Oncology,2,2,100.00,1,50.00
JP,Vaccines,2,1,50.00,1,100.00
Total,,4,3,75.00,2,66.67
";
        assert_eq!(csv, expected);
    }

    #[test]
    fn test_summary_csv_total_row_blanks_extra_key_columns() {
        let report = create_test_report();
        let csv = generate_summary_csv(&report.columns, &report.summary).unwrap();

        let total_line = csv.lines().last().unwrap();
        assert!(total_line.starts_with("Total,,"));
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report, true);

        assert!(markdown.contains("# PSA Activity Summary"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("- **Counting:** distinct identities"));
        assert!(markdown.contains("## Summary"));
        assert!(markdown.contains("| JP | Oncology | 2 | 2 | 100.00 | 1 | 50.00 |"));
        assert!(markdown.contains("| **Total** |  | 4 | 3 | 75.00 | 2 | 66.67 |"));
        assert!(markdown.contains("## Funnel Overview"));
        assert!(markdown.contains("- **PSA Activity Executed:** 2 (66.67%)"));
        assert!(markdown.contains("## How to Read"));
    }

    #[test]
    fn test_markdown_escapes_pipes_in_table_cells() {
        let mut report = create_test_report();
        report.columns.key_labels[1] = "DIV|NAME".to_string();
        report.summary.groups[0].key[1] = Value::Text("Onc|Hema".to_string());

        let markdown = generate_markdown_report(&report, false);
        assert!(markdown.contains("| Affiliate | DIV\\|NAME |"));
        assert!(markdown.contains("| JP | Onc\\|Hema | 2 |"));
        assert!(!markdown.contains("Onc|Hema"));
    }

    #[test]
    fn test_markdown_legend_can_be_disabled() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report, false);

        assert!(!markdown.contains("## How to Read"));
        assert!(markdown.contains("## Funnel Overview"));
    }

    #[test]
    fn test_markdown_notes_empty_input() {
        let mut report = create_test_report();
        report.summary.groups.clear();
        report.summary.total = SummaryRecord {
            key: Vec::new(),
            base_count: 0,
            flag_counts: vec![0, 0],
            flag_percents: vec![0.0, 0.0],
        };

        let markdown = generate_markdown_report(&report, false);
        assert!(markdown.contains("No data rows were found in the input."));
        assert!(markdown.contains("| **Total** |  | 0 | 0 | 0.00 | 0 | 0.00 |"));
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"title\""));
        assert!(json.contains("\"summary\""));
        assert!(json.contains("\"total\""));
        assert!(json.contains("\"base_count\": 4"));
    }

    #[test]
    fn test_write_summary_csv() {
        let report = create_test_report();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("summary.csv");

        write_summary_csv(&report.columns, &report.summary, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("Affiliate,DIV_NAME,"));
        assert!(written.contains("\nTotal,,4,"));
    }

    #[test]
    fn test_write_outputs_all_derives_sibling_paths() {
        let report = create_test_report();
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("psa_summary.csv");

        let written = write_outputs(&report, OutputFormat::All, true, &base).unwrap();

        assert_eq!(
            written,
            vec![
                temp_dir.path().join("psa_summary.csv"),
                temp_dir.path().join("psa_summary.md"),
                temp_dir.path().join("psa_summary.json"),
            ]
        );
        for path in &written {
            assert!(path.exists());
        }
    }

    #[test]
    fn test_write_outputs_single_format_keeps_given_path() {
        let report = create_test_report();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rollup.md");

        let written = write_outputs(&report, OutputFormat::Markdown, false, &path).unwrap();

        assert_eq!(written, vec![path.clone()]);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# PSA Activity Summary"));
        assert!(!content.contains("## How to Read"));
    }
}
