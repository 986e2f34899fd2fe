//! Benchmark run: partition connections across execution units and aggregate.
//!
//! Each execution unit is an OS thread hosting its own current-thread tokio
//! runtime and one [`ClientGroup`]. Units report a [`GroupReport`] over an
//! unbounded channel; the coordinator merges them into one sorted, normalized
//! sample sequence.

use super::client::{ClientContext, ThinkTime};
use super::deadline::RunClock;
use super::group::{BatchConfig, ClientGroup, GroupPlan, GroupReport};
use super::merge::merge_sorted;
use super::sample::LatencySample;
use crate::config::{BenchConfig, Config};
use crate::result::{ResultBundle, Variant};
use crate::utils::error::{BenchError, Result};
use crate::workload::Workload;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Everything one run needs besides the workload.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub host: String,
    pub port: u16,
    /// Measurement phase length; warmup is derived from it
    pub duration: Duration,
    pub connections: usize,
    pub variant: Variant,
    pub bench: BenchConfig,
}

impl RunSettings {
    pub fn from_config(
        config: &Config,
        duration: Duration,
        connections: usize,
        variant: Variant,
    ) -> Self {
        Self {
            host: config.target.host.clone(),
            port: config.target.port,
            duration,
            connections,
            variant,
            bench: config.bench.clone(),
        }
    }

    pub fn warmup(&self) -> Duration {
        self.bench.warmup_for(self.duration)
    }
}

/// Aggregated samples and flags of a completed run.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// Globally sorted; the earliest start is zero
    pub samples: Vec<LatencySample>,
    pub error_abort: bool,
    pub error_reconnect: bool,
    pub plans: Vec<GroupPlan>,
    /// Client launch batches across all units
    pub batches: usize,
}

impl RunOutcome {
    /// Merge group reports into one outcome
    pub fn aggregate(plans: Vec<GroupPlan>, reports: Vec<GroupReport>) -> Self {
        let mut reports = reports;
        reports.sort_by_key(|report| report.group_id);

        let error_abort = reports.iter().any(|r| r.error_abort);
        let error_reconnect = reports.iter().any(|r| r.error_reconnect);
        let batches = reports.iter().map(|r| r.batches).sum();
        let mut samples = merge_sorted(reports.into_iter().map(|r| r.samples).collect());
        normalize(&mut samples);

        Self {
            samples,
            error_abort,
            error_reconnect,
            plans,
            batches,
        }
    }

    pub fn connections(&self) -> usize {
        self.plans.iter().map(|plan| plan.clients).sum()
    }
}

pub fn available_parallelism() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Number of execution units for `total` connections.
pub fn unit_count(total: usize, batch_size: usize, parallelism: usize) -> usize {
    parallelism
        .min((total / batch_size.max(1)).max(1))
        .max(1)
}

/// Most even split of `total` connections over `units` groups.
///
/// The first `total % units` groups get one extra connection. Id offsets are
/// the running sum of earlier group sizes.
pub fn partition(total: usize, units: usize) -> Vec<GroupPlan> {
    let units = units.max(1);
    let div = total / units;
    let rem = total % units;

    let mut offset = 0u64;
    (0..units)
        .map(|group_id| {
            let clients = if group_id < rem { div + 1 } else { div };
            let plan = GroupPlan {
                group_id,
                id_offset: offset,
                clients,
            };
            offset += clients as u64;
            plan
        })
        .collect()
}

/// Shift start times so the earliest sample starts at zero; returns the shift.
pub fn normalize(samples: &mut [LatencySample]) -> Option<Duration> {
    let min = samples.iter().map(|s| s.start).min()?;
    for sample in samples.iter_mut() {
        sample.start -= min;
    }
    Some(min)
}

pub struct BenchmarkRun {
    settings: RunSettings,
    workload: Arc<dyn Workload>,
}

impl BenchmarkRun {
    pub fn new(settings: RunSettings, workload: Arc<dyn Workload>) -> Result<Self> {
        if settings.connections == 0 {
            return Err(BenchError::Config(
                "connections must be greater than 0".to_string(),
            ));
        }
        if settings.duration.is_zero() {
            return Err(BenchError::Config(
                "duration must be greater than 0".to_string(),
            ));
        }
        settings.bench.validate()?;
        Ok(Self { settings, workload })
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Execution plan: one entry per unit.
    ///
    /// `max_units`, when set, stands in for the available parallelism.
    pub fn plan(&self) -> Vec<GroupPlan> {
        let parallelism = self
            .settings
            .bench
            .max_units
            .unwrap_or_else(available_parallelism);
        let units = unit_count(
            self.settings.connections,
            self.settings.bench.batch_size,
            parallelism,
        );
        partition(self.settings.connections, units)
    }

    /// Run to the deadline and produce the result bundle.
    ///
    /// Client faults never fail the run; only an execution unit that cannot
    /// be started (or vanishes without reporting) does.
    pub async fn execute(&self) -> Result<ResultBundle> {
        let outcome = self.execute_outcome().await?;
        Ok(ResultBundle::from_outcome(
            self.workload.name(),
            &self.settings,
            &outcome,
        ))
    }

    pub async fn execute_outcome(&self) -> Result<RunOutcome> {
        let settings = &self.settings;
        let plans = self.plan();
        let warmup = settings.warmup();

        let think = ThinkTime::new(settings.bench.mean_think(), settings.bench.max_think())?;
        let batch = BatchConfig {
            batch_size: settings.bench.batch_size,
            batch_delay: settings.bench.batch_delay(),
        };
        let clock = RunClock::start(warmup, settings.duration);
        let ctx = ClientContext {
            host: Arc::from(settings.host.as_str()),
            port: settings.port,
            workload: Arc::clone(&self.workload),
            clock,
            think,
            reconnect_backoff: settings.bench.reconnect_backoff(),
            response_buffer: settings.bench.response_buffer,
        };

        info!(
            workload = self.workload.name(),
            target = %format!("{}:{}", settings.host, settings.port),
            connections = settings.connections,
            units = plans.len(),
            warmup_ms = warmup.as_millis() as u64,
            duration_ms = settings.duration.as_millis() as u64,
            "Starting benchmark run"
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handles = Vec::with_capacity(plans.len());
        for plan in &plans {
            handles.push(spawn_unit(*plan, batch, ctx.clone(), tx.clone())?);
        }
        drop(tx);

        let mut reports = Vec::with_capacity(plans.len());
        while reports.len() < plans.len() {
            match rx.recv().await {
                Some(Ok(report)) => {
                    debug!(group = report.group_id, "Received group report");
                    reports.push(report);
                }
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(BenchError::Unit(format!(
                        "{} of {} execution units exited without reporting",
                        plans.len() - reports.len(),
                        plans.len()
                    )))
                }
            }
        }

        tokio::task::spawn_blocking(move || join_units(handles))
            .await
            .map_err(|e| BenchError::Unit(e.to_string()))??;

        let outcome = RunOutcome::aggregate(plans, reports);
        info!(
            requests = outcome.samples.len(),
            error_abort = outcome.error_abort,
            error_reconnect = outcome.error_reconnect,
            "Benchmark run complete"
        );
        Ok(outcome)
    }
}

fn spawn_unit(
    plan: GroupPlan,
    batch: BatchConfig,
    ctx: ClientContext,
    tx: mpsc::UnboundedSender<Result<GroupReport>>,
) -> Result<JoinHandle<()>> {
    let unit = plan.group_id;
    thread::Builder::new()
        .name(format!("bench-unit-{}", unit))
        .spawn(move || {
            let message = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map(|runtime| runtime.block_on(ClientGroup::new(plan, batch, ctx).run()))
                .map_err(|e| BenchError::Spawn {
                    unit,
                    reason: e.to_string(),
                });
            // The coordinator only stops listening after a fatal error
            let _ = tx.send(message);
        })
        .map_err(|e| BenchError::Spawn {
            unit,
            reason: e.to_string(),
        })
}

fn join_units(handles: Vec<JoinHandle<()>>) -> Result<()> {
    for handle in handles {
        let name = handle.thread().name().unwrap_or("bench-unit").to_string();
        handle
            .join()
            .map_err(|_| BenchError::Unit(format!("{} panicked", name)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::sample::is_sorted_by_start;

    #[test]
    fn partition_is_exact_and_balanced() {
        for total in 1..=300 {
            for units in 1..=17 {
                let plans = partition(total, units);
                let sizes: Vec<usize> = plans.iter().map(|p| p.clients).collect();
                assert_eq!(sizes.iter().sum::<usize>(), total);

                let max = *sizes.iter().max().unwrap();
                let min = *sizes.iter().min().unwrap();
                assert!(max - min <= 1, "total={} units={}", total, units);
            }
        }
    }

    #[test]
    fn partition_offsets_give_unique_ids() {
        let plans = partition(10, 3);
        let sizes: Vec<usize> = plans.iter().map(|p| p.clients).collect();
        assert_eq!(sizes, vec![4, 3, 3]);

        let ids: Vec<u64> = plans.iter().flat_map(|p| p.client_ids()).collect();
        assert_eq!(ids, (0..10).collect::<Vec<u64>>());
    }

    #[test]
    fn unit_count_is_bounded_by_batches_and_cores() {
        assert_eq!(unit_count(4, 250, 8), 1);
        assert_eq!(unit_count(1000, 250, 8), 4);
        assert_eq!(unit_count(1000, 250, 2), 2);
        assert_eq!(unit_count(10_000, 250, 8), 8);
        assert_eq!(unit_count(1, 250, 0), 1);
    }

    #[test]
    fn aggregate_merges_normalizes_and_ors() {
        let s = |start_ms: u64| {
            LatencySample::new(Duration::from_millis(start_ms), Duration::from_millis(3))
        };
        let plans = partition(4, 2);
        let reports = vec![
            GroupReport {
                group_id: 1,
                clients: 2,
                samples: vec![s(105), s(130)],
                error_abort: true,
                ..Default::default()
            },
            GroupReport {
                group_id: 0,
                clients: 2,
                samples: vec![s(100), s(120), s(140)],
                ..Default::default()
            },
        ];

        let outcome = RunOutcome::aggregate(plans, reports);

        assert_eq!(outcome.samples.len(), 5);
        assert_eq!(outcome.samples[0].start, Duration::ZERO);
        assert_eq!(outcome.samples[4].start, Duration::from_millis(40));
        assert!(is_sorted_by_start(&outcome.samples));
        assert!(outcome.error_abort);
        assert!(!outcome.error_reconnect);
        assert_eq!(outcome.connections(), 4);
    }

    #[test]
    fn normalize_empty_is_none() {
        let mut samples: Vec<LatencySample> = Vec::new();
        assert_eq!(normalize(&mut samples), None);
    }

    fn settings(connections: usize, bench: BenchConfig) -> RunSettings {
        RunSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            duration: Duration::from_secs(1),
            connections,
            variant: Variant::Native,
            bench,
        }
    }

    fn new_run(connections: usize, bench: BenchConfig) -> Result<BenchmarkRun> {
        BenchmarkRun::new(
            settings(connections, bench),
            Arc::new(crate::workload::EchoWorkload),
        )
    }

    #[test]
    fn rejects_zero_connections() {
        assert!(new_run(0, BenchConfig::default()).is_err());
    }

    #[test]
    fn rejects_negative_mean_think_time() {
        let bench = BenchConfig {
            mean_think_secs: -1.0,
            ..BenchConfig::default()
        };
        assert!(matches!(new_run(4, bench), Err(BenchError::Config(_))));
    }

    #[test]
    fn rejects_nan_warmup_prop() {
        let bench = BenchConfig {
            warmup_prop: f64::NAN,
            ..BenchConfig::default()
        };
        assert!(matches!(new_run(4, bench), Err(BenchError::Config(_))));
    }

    #[test]
    fn max_units_overrides_available_parallelism() {
        let units = available_parallelism() * 4;
        let bench = BenchConfig {
            batch_size: 1,
            max_units: Some(units),
            ..BenchConfig::default()
        };
        let run = new_run(units * 10, bench).unwrap();
        assert_eq!(run.plan().len(), units);

        // Still bounded by the batch term
        let bench = BenchConfig {
            batch_size: 250,
            max_units: Some(units),
            ..BenchConfig::default()
        };
        let run = new_run(500, bench).unwrap();
        assert_eq!(run.plan().len(), 2);
    }
}
