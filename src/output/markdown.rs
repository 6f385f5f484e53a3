//! Markdown run report
//!
//! This module renders a [`CrawlReport`] as a human-readable markdown file,
//! including record counts and the validation findings of the run.

use crate::model::Classification;
use crate::output::report::CrawlReport;
use crate::output::traits::OutputResult;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Lists are cut off after this many entries
const MAX_LISTED: usize = 50;

/// Writes the markdown report to `output_path`
pub fn write_markdown_report(report: &CrawlReport, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_report(report);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run report as markdown
pub fn format_markdown_report(report: &CrawlReport) -> String {
    let mut md = String::new();

    md.push_str("# ICD Harvest Report\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    match report.run_id {
        Some(id) => md.push_str(&format!("- **Run ID**: {}\n", id)),
        None => md.push_str("- **Run ID**: (in-memory)\n"),
    }
    md.push_str(&format!("- **Started**: {}\n", report.started_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        report.elapsed.as_secs_f64()
    ));
    md.push_str(&format!("- **URLs Completed**: {}\n", report.urls_completed));
    md.push_str(&format!("- **Entities Recorded**: {}\n", report.entities_recorded));
    md.push_str(&format!("- **Alias Fetches**: {}\n", report.aliases));
    md.push_str(&format!("- **Rate**: {:.2} URLs/sec\n\n", report.urls_per_second()));

    // Record breakdown
    md.push_str("## Records\n\n");
    md.push_str("| Class | Count |\n");
    md.push_str("|-------|-------|\n");
    for class in Classification::all() {
        md.push_str(&format!("| {} | {} |\n", class, report.records_of(class)));
    }
    md.push_str(&format!("| **Total** | {} |\n\n", report.total_records()));
    md.push_str(&format!(
        "Diagnoses with subclassification: {}\n\n",
        report.subclassified
    ));

    let validation = &report.validation;
    md.push_str("## Validation\n\n");
    if validation.is_clean() {
        md.push_str("No issues found.\n");
        return md;
    }
    md.push_str(&format!("Total issues: {}\n\n", validation.issue_count()));

    if !validation.failed_urls.is_empty() {
        md.push_str("### Failed URLs\n\n");
        md.push_str("| URL | Error |\n");
        md.push_str("|-----|-------|\n");
        for failed in validation.failed_urls.iter().take(MAX_LISTED) {
            md.push_str(&format!("| {} | {} |\n", failed.url, failed.error.replace('|', "\\|")));
        }
        push_overflow(&mut md, validation.failed_urls.len());
    }

    if !validation.missing_chapter.is_empty() {
        md.push_str("### Records Without Chapter\n\n");
        md.push_str("| Class | Id | Code |\n");
        md.push_str("|-------|----|------|\n");
        for missing in validation.missing_chapter.iter().take(MAX_LISTED) {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                missing.class, missing.id, missing.code
            ));
        }
        push_overflow(&mut md, validation.missing_chapter.len());
    }

    if !validation.cycles.is_empty() {
        md.push_str("### Parent Cycles\n\n");
        for key in validation.cycles.iter().take(MAX_LISTED) {
            md.push_str(&format!("- {}\n", key));
        }
        push_overflow(&mut md, validation.cycles.len());
    }

    if !validation.unresolved_parents.is_empty() {
        md.push_str("### Unresolved Parents\n\n");
        md.push_str("| Entity | Parent |\n");
        md.push_str("|--------|--------|\n");
        for unresolved in validation.unresolved_parents.iter().take(MAX_LISTED) {
            md.push_str(&format!(
                "| {} | {} |\n",
                unresolved.entity_key, unresolved.parent_url
            ));
        }
        push_overflow(&mut md, validation.unresolved_parents.len());
    }

    md
}

fn push_overflow(md: &mut String, total: usize) {
    if total > MAX_LISTED {
        md.push_str(&format!("\n... and {} more\n\n", total - MAX_LISTED));
    } else {
        md.push('\n');
    }
}
