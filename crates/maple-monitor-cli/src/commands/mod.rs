//! Command implementations

pub mod analyze;
pub mod demo;

use std::io::Write;

use maple_monitor_engine::{Analysis, PatternEngine};
use tracing::info;

use crate::error::CliResult;
use crate::output::{self, OutputFormat};

/// Options shared by commands that print analyses.
#[derive(Debug, Clone, Copy)]
pub struct PrintOptions {
    /// Print every analysis, not only those with insights
    pub all: bool,
    /// Entities listed in the final report
    pub top: usize,
    pub format: OutputFormat,
}

/// Counters from one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub accepted: usize,
    pub rejected: usize,
    pub printed: usize,
    pub evicted: usize,
}

impl RunStats {
    fn record(
        &mut self,
        out: &mut dyn Write,
        analysis: &Analysis,
        options: &PrintOptions,
    ) -> CliResult<()> {
        self.accepted += 1;
        if options.all || analysis.has_insights() {
            output::write_analysis(out, analysis, options.format)?;
            self.printed += 1;
        }
        Ok(())
    }
}

/// Print the closing report and log the counters.
fn finish(
    engine: &PatternEngine,
    out: &mut dyn Write,
    stats: &RunStats,
    options: &PrintOptions,
) -> CliResult<()> {
    info!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        printed = stats.printed,
        evicted = stats.evicted,
        entities = engine.entity_count(),
        "run finished"
    );
    output::write_report(out, &engine.report(options.top), options.format)?;
    out.flush()?;
    Ok(())
}
