//! Replay recorded samples through the engine

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use maple_monitor_engine::{FeatureContext, PatternEngine, Sample};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{finish, PrintOptions, RunStats};
use crate::error::{CliError, CliResult};

/// One line of a replay stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub sample: Sample,
    #[serde(default)]
    pub context: FeatureContext,
}

/// Open `input` (a path, or `-` for stdin) and replay it.
pub fn execute(
    engine: &PatternEngine,
    input: &str,
    out: &mut dyn Write,
    options: &PrintOptions,
) -> CliResult<RunStats> {
    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(File::open(input)?))
    };
    let stats = replay(engine, reader, out, options)?;
    finish(engine, out, &stats, options)?;
    Ok(stats)
}

/// Feed every record to the engine in order.
///
/// Samples the engine rejects are logged and counted; a line that is not a
/// valid record aborts the replay.
pub fn replay<R: BufRead>(
    engine: &PatternEngine,
    reader: R,
    out: &mut dyn Write,
    options: &PrintOptions,
) -> CliResult<RunStats> {
    let mut stats = RunStats::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line).map_err(|source| CliError::Input {
            line: index + 1,
            source,
        })?;

        match engine.ingest(record.sample, &record.context) {
            Ok(analysis) => stats.record(out, &analysis, options)?,
            Err(e) => {
                warn!(line = index + 1, error = %e, "sample rejected");
                stats.rejected += 1;
            }
        }

        let evicted = engine.enforce_entity_cap();
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "entities evicted");
            stats.evicted += evicted.len();
        }
    }

    Ok(stats)
}
