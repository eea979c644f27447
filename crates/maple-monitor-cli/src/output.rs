//! Output formatting utilities

use std::io::Write;

use colored::*;
use maple_monitor_engine::{Analysis, EngineReport, Severity};

use crate::error::CliResult;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One JSON document per line
    #[default]
    Json,
    /// Human-readable text
    Text,
}

/// Write one analysis.
pub fn write_analysis(out: &mut dyn Write, analysis: &Analysis, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, analysis)?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            writeln!(
                out,
                "{} {} {} (score {:.2})",
                analysis.timestamp.format("%Y-%m-%dT%H:%M:%S"),
                analysis.entity,
                analysis.anomaly.status,
                analysis.anomaly.score
            )?;
            for insight in &analysis.insights {
                writeln!(out, "  {} {}", severity_label(insight.severity), insight.message)?;
            }
        }
    }
    Ok(())
}

/// Write the end-of-run report.
pub fn write_report(out: &mut dyn Write, report: &EngineReport, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, report)?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            writeln!(out, "{}", "Report".bold())?;
            writeln!(
                out,
                "  Entities: {} ({} anomalous, {} learning)",
                report.entity_count, report.anomalous_entities, report.learning_entities
            )?;
            for leak in &report.leaks {
                writeln!(
                    out,
                    "  {} leak in {}: {:.2}% per sample",
                    severity_label(leak.severity.into()),
                    leak.entity,
                    leak.growth_rate * 100.0
                )?;
            }
            if !report.top_entities.is_empty() {
                writeln!(out, "  Top entities:")?;
            }
            for summary in &report.top_entities {
                let status = summary
                    .status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".into());
                writeln!(
                    out,
                    "    {:<12} {:<16} {:>6.1}%  score {:.2}  {}",
                    summary.entity.to_string(),
                    status,
                    summary.current_percent,
                    summary.score,
                    summary.name.as_deref().unwrap_or("").dimmed()
                )?;
            }
        }
    }
    Ok(())
}

fn severity_label(severity: Severity) -> ColoredString {
    let label = format!("[{}]", severity);
    match severity {
        Severity::High => label.as_str().red().bold(),
        Severity::Medium => label.as_str().yellow(),
        Severity::Low => label.as_str().cyan(),
    }
}
