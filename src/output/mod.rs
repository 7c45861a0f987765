mod cli;
mod json;
mod lines;

pub use cli::print_cli_table;
pub use json::print_json;
pub use lines::{format_lines, print_lines};

use crate::model::ScanReport;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Output format for scan results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One space-separated line per result, readable by `classify`
    Lines,
    /// JSON format for programmatic use
    Json,
    /// Human-readable table format
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lines" | "text" => Ok(OutputFormat::Lines),
            "json" => Ok(OutputFormat::Json),
            "table" => Ok(OutputFormat::Table),
            _ => Err(format!(
                "Unknown format: {}. Use 'lines', 'json', or 'table'",
                s
            )),
        }
    }
}

pub fn print_report(report: &ScanReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Lines => print_lines(report),
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => print_cli_table(report),
    }
}

/// Format report to string for file output
pub fn format_report_to_string(report: &ScanReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        // Tables are for terminals; files get the lines format
        OutputFormat::Lines | OutputFormat::Table => Ok(format_lines(report)),
    }
}

/// Result lines carry no check name, so several checks cannot share one
/// lines stream. They need `--output` naming a directory instead.
pub fn check_destination(format: OutputFormat, checks: usize, output: Option<&Path>) -> Result<()> {
    if format == OutputFormat::Lines && checks > 1 && output.is_none() {
        anyhow::bail!(
            "{} checks selected; use --descriptor to pick one or --output <dir> to write one file per check",
            checks
        );
    }
    Ok(())
}

pub fn print_reports(reports: &[ScanReport], format: OutputFormat) -> Result<()> {
    check_destination(format, reports.len(), None)?;
    for report in reports {
        print_report(report, format)?;
    }
    Ok(())
}

/// Writes reports below `output` and returns the files written.
///
/// A single report goes to `output` itself. Several reports in JSON become
/// one array; in any other format `output` is a directory holding one
/// `<check>.txt` file of result lines per check.
pub fn write_reports(reports: &[ScanReport], format: OutputFormat, output: &Path) -> Result<Vec<PathBuf>> {
    let write = |path: &Path, content: String| {
        fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
    };

    match reports {
        [report] => {
            write(output, format_report_to_string(report, format)?)?;
            Ok(vec![output.to_path_buf()])
        }
        _ if format == OutputFormat::Json => {
            write(output, serde_json::to_string_pretty(reports)?)?;
            Ok(vec![output.to_path_buf()])
        }
        _ => {
            fs::create_dir_all(output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            let mut written = Vec::with_capacity(reports.len());
            for report in reports {
                let path = output.join(format!("{}.txt", report.check));
                write(&path, format_lines(report))?;
                written.push(path);
            }
            Ok(written)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Candidate, ScanOutcome, ScanResult};
    use std::str::FromStr;

    #[test]
    fn test_parse_format() {
        assert_eq!(OutputFormat::from_str("LINES").unwrap(), OutputFormat::Lines);
        assert_eq!(OutputFormat::from_str("json").unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("table").unwrap(), OutputFormat::Table);
        assert!(OutputFormat::from_str("sarif").is_err());
    }

    fn report(check: &str, host: &str) -> ScanReport {
        let cand = Candidate::new(host, "/x");
        ScanReport::new(check, vec![ScanResult::new(ScanOutcome::value(&cand, "1.0.0"), None)])
    }

    #[test]
    fn test_several_checks_need_output_for_lines() {
        assert!(check_destination(OutputFormat::Lines, 2, None).is_err());
        assert!(check_destination(OutputFormat::Lines, 1, None).is_ok());
        assert!(check_destination(OutputFormat::Lines, 2, Some(Path::new("out"))).is_ok());
        assert!(check_destination(OutputFormat::Json, 2, None).is_ok());

        let reports = [report("django", "web1"), report("flask", "web2")];
        assert!(print_reports(&reports, OutputFormat::Lines).is_err());
    }

    #[test]
    fn test_write_one_file_per_check() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("results");
        let reports = [report("django", "web1"), report("flask", "web2")];

        let written = write_reports(&reports, OutputFormat::Lines, &out).unwrap();
        assert_eq!(written, vec![out.join("django.txt"), out.join("flask.txt")]);
        assert_eq!(fs::read_to_string(out.join("django.txt")).unwrap(), "web1 /x ok - 1.0.0\n");
        assert_eq!(fs::read_to_string(out.join("flask.txt")).unwrap(), "web2 /x ok - 1.0.0\n");
    }

    #[test]
    fn test_write_single_and_json_reports() {
        let dir = tempfile::tempdir().unwrap();

        let single = dir.path().join("django.txt");
        write_reports(&[report("django", "web1")], OutputFormat::Lines, &single).unwrap();
        assert_eq!(fs::read_to_string(&single).unwrap(), "web1 /x ok - 1.0.0\n");

        let json = dir.path().join("all.json");
        let reports = [report("django", "web1"), report("flask", "web2")];
        write_reports(&reports, OutputFormat::Json, &json).unwrap();
        let parsed: Vec<ScanReport> = serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].check, "flask");
    }

    #[test]
    fn test_table_file_output_uses_lines() {
        let cand = Candidate::new("web1", "/x");
        let report = ScanReport::new("django", vec![ScanResult::new(ScanOutcome::value(&cand, "1.0.0"), None)]);
        assert_eq!(
            format_report_to_string(&report, OutputFormat::Table).unwrap(),
            "web1 /x ok - 1.0.0\n"
        );
    }
}
