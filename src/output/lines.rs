use crate::model::ScanReport;
use anyhow::Result;

pub fn format_lines(report: &ScanReport) -> String {
    let mut out = String::new();
    for result in &report.results {
        out.push_str(&result.to_line());
        out.push('\n');
    }
    out
}

pub fn print_lines(report: &ScanReport) -> Result<()> {
    print!("{}", format_lines(report));
    Ok(())
}
