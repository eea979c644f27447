//! Synthetic workload for trying the engine without a recording
//!
//! Simulates one host with three processes:
//! - `batch`: periodic load driving the host utilization
//! - `worker`: steady, with a single spike three quarters of the way in
//! - `cache`: resident size growing a few percent per sample

use std::f64::consts::PI;
use std::io::Write;

use chrono::{DateTime, Duration, Utc};
use maple_monitor_engine::{
    ConstituentSummary, EntityId, FeatureContext, PatternEngine, ResourceMetrics, Sample,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use super::{finish, PrintOptions, RunStats};
use crate::error::CliResult;

const HOST_MEMORY_BYTES: f64 = 16.0e9;
const SAMPLE_INTERVAL_SECS: i64 = 30;
const BATCH_PERIOD: f64 = 12.0;
const CACHE_GROWTH: f64 = 0.06;

pub const BATCH_PID: u32 = 1001;
pub const WORKER_PID: u32 = 1002;
pub const CACHE_PID: u32 = 1003;

/// Deterministic sample source.
pub struct Workload {
    rng: StdRng,
    start: DateTime<Utc>,
    steps: usize,
}

impl Workload {
    pub fn new(seed: u64, steps: usize, start: DateTime<Utc>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            start,
            steps,
        }
    }

    /// Process samples followed by the host context they imply.
    pub fn step(&mut self, t: usize) -> (Vec<Sample>, FeatureContext) {
        let at = self.start + Duration::seconds(SAMPLE_INTERVAL_SECS * t as i64);

        let phase = 2.0 * PI * t as f64 / BATCH_PERIOD;
        let batch_percent = 20.0 + 12.0 * phase.sin() + self.noise(0.5);

        let spike_at = self.steps * 3 / 4;
        let worker_percent = if t == spike_at {
            28.0
        } else {
            6.0 + self.noise(0.3)
        };

        let cache_bytes = 3.0e8 * (1.0 + CACHE_GROWTH).powi(t as i32);
        let cache_percent = cache_bytes / HOST_MEMORY_BYTES * 100.0;

        let threads = 8.0 + self.rng.gen_range(0..2) as f64;
        let samples = vec![
            self.process(BATCH_PID, "batch", at, batch_percent, threads),
            self.process(WORKER_PID, "worker", at, worker_percent, 4.0),
            self.process(CACHE_PID, "cache", at, cache_percent, 2.0),
        ];

        let used: f64 = samples.iter().map(|s| s.metrics.resident_bytes).sum::<f64>() + 2.0e9;
        let context = FeatureContext {
            total_memory_bytes: HOST_MEMORY_BYTES,
            available_memory_bytes: (HOST_MEMORY_BYTES - used).max(0.0),
            used_memory_bytes: used.min(HOST_MEMORY_BYTES),
            constituents: ConstituentSummary::from_samples(&samples),
        };
        (samples, context)
    }

    /// The host sample for a step.
    pub fn system(&self, t: usize, context: &FeatureContext) -> Sample {
        let at = self.start + Duration::seconds(SAMPLE_INTERVAL_SECS * t as i64);
        Sample::at(
            EntityId::System,
            at,
            ResourceMetrics {
                resident_bytes: context.used_memory_bytes,
                virtual_bytes: HOST_MEMORY_BYTES,
                memory_percent: context.used_memory_bytes / HOST_MEMORY_BYTES * 100.0,
                threads: context.constituents.count as f64,
                ..ResourceMetrics::default()
            },
        )
        .with_name("localhost")
    }

    fn process(&mut self, pid: u32, name: &str, at: DateTime<Utc>, percent: f64, threads: f64) -> Sample {
        let percent = percent.max(0.0);
        let resident = percent / 100.0 * HOST_MEMORY_BYTES;
        let regions = 120.0 + self.rng.gen_range(0..5) as f64;
        Sample::at(
            EntityId::Process(pid),
            at,
            ResourceMetrics {
                resident_bytes: resident,
                virtual_bytes: resident * 2.5,
                shared_bytes: resident * 0.05,
                data_bytes: resident * 0.6,
                stack_bytes: threads * 8.0 * 1024.0 * 1024.0,
                memory_percent: percent,
                cpu_percent: self.rng.gen_range(0.0..15.0),
                threads,
                mapped_regions: regions,
                ..ResourceMetrics::default()
            },
        )
        .with_name(name)
    }

    fn noise(&mut self, amplitude: f64) -> f64 {
        self.rng.gen_range(-amplitude..amplitude)
    }
}

/// Run the synthetic workload through the engine.
pub fn execute(
    engine: &PatternEngine,
    steps: usize,
    seed: u64,
    out: &mut dyn Write,
    options: &PrintOptions,
) -> CliResult<RunStats> {
    let start = Utc::now() - Duration::seconds(SAMPLE_INTERVAL_SECS * steps as i64);
    let mut workload = Workload::new(seed, steps, start);
    let mut stats = RunStats::default();
    debug!(steps, seed, "demo workload started");

    for t in 0..steps {
        let (samples, context) = workload.step(t);
        let system = workload.system(t, &context);

        for sample in samples {
            let host = FeatureContext {
                total_memory_bytes: context.total_memory_bytes,
                available_memory_bytes: context.available_memory_bytes,
                used_memory_bytes: context.used_memory_bytes,
                constituents: ConstituentSummary::default(),
            };
            ingest(engine, sample, &host, out, options, &mut stats)?;
        }
        ingest(engine, system, &context, out, options, &mut stats)?;
        stats.evicted += engine.enforce_entity_cap().len();
    }

    finish(engine, out, &stats, options)?;
    Ok(stats)
}

fn ingest(
    engine: &PatternEngine,
    sample: Sample,
    context: &FeatureContext,
    out: &mut dyn Write,
    options: &PrintOptions,
    stats: &mut RunStats,
) -> CliResult<()> {
    match engine.ingest(sample, context) {
        Ok(analysis) => stats.record(out, &analysis, options),
        Err(e) => {
            warn!(error = %e, "sample rejected");
            stats.rejected += 1;
            Ok(())
        }
    }
}
