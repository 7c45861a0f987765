use crate::model::{ScanReport, ScanResult};
use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Result path")]
    result_path: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl From<&ScanResult> for ResultRow {
    fn from(r: &ScanResult) -> Self {
        let (status, value) = match &r.outcome.failure {
            Some(failure) => (
                "\x1b[31mERROR\x1b[0m".to_string(),
                truncate(&failure.to_string(), 50),
            ),
            None if r.outcome.value.is_empty() => ("\x1b[33mNOT FOUND\x1b[0m".to_string(), "-".to_string()),
            None => ("\x1b[32mOK\x1b[0m".to_string(), truncate(&r.outcome.value, 50)),
        };
        ResultRow {
            host: r.outcome.host.clone(),
            path: truncate(&r.outcome.path, 60),
            status,
            result_path: r.result_path.clone().unwrap_or_else(|| "-".to_string()),
            value,
        }
    }
}

pub fn print_cli_table(report: &ScanReport) -> Result<()> {
    println!();
    println!(
        "Check '{}' completed at: {}",
        report.check,
        report.scan_time.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    if report.results.is_empty() {
        println!("No candidates found.");
    } else {
        let rows: Vec<ResultRow> = report.results.iter().map(ResultRow::from).collect();
        let table = Table::new(rows).with(Style::rounded()).to_string();
        println!("{}", table);
    }

    println!();
    print_summary(report);

    Ok(())
}

fn print_summary(report: &ScanReport) {
    let failed = report.failed();
    let not_found = report
        .results
        .iter()
        .filter(|r| r.outcome.is_ok() && r.outcome.value.is_empty())
        .count();
    let found = report.results.len() - failed - not_found;

    println!("Summary:");
    println!("  Candidates: {}", report.results.len());
    println!("  Values:     {}", found);
    println!("  Not found:  {}", not_found);
    if failed > 0 {
        println!("  \x1b[31mErrors:     {}\x1b[0m", failed);
    } else {
        println!("  Errors:     0");
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
