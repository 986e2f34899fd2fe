use super::client::{ClientContext, ClientReport, VirtualClient};
use super::merge::merge_sorted;
use super::sample::LatencySample;
use futures::stream::{FuturesUnordered, StreamExt};
use std::ops::Range;
use std::time::Duration;
use tracing::{debug, info};

/// Slice of the run's clients assigned to one execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupPlan {
    pub group_id: usize,
    /// Id of the group's first client; ids are unique across the run
    pub id_offset: u64,
    pub clients: usize,
}

impl GroupPlan {
    pub fn client_ids(&self) -> Range<u64> {
        self.id_offset..self.id_offset + self.clients as u64
    }
}

/// Batched startup settings.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 250,
            batch_delay: Duration::from_millis(10),
        }
    }
}

/// Merged outcome of one group.
#[derive(Debug, Clone, Default)]
pub struct GroupReport {
    pub group_id: usize,
    pub clients: usize,
    pub batches: usize,
    pub samples: Vec<LatencySample>,
    pub error_abort: bool,
    pub error_reconnect: bool,
}

impl GroupReport {
    /// Fold client reports: stable merge of their samples, OR of their flags
    pub fn from_clients(group_id: usize, batches: usize, mut reports: Vec<ClientReport>) -> Self {
        // Merge in client id order so equal start times stay deterministic
        reports.sort_by_key(|report| report.id);

        let clients = reports.len();
        let error_abort = reports.iter().any(|r| r.error_abort);
        let error_reconnect = reports.iter().any(|r| r.error_reconnect);
        let samples = merge_sorted(reports.into_iter().map(|r| r.samples).collect());

        Self {
            group_id,
            clients,
            batches,
            samples,
            error_abort,
            error_reconnect,
        }
    }
}

/// Split a group's client ids into launch batches of at most `batch_size`.
pub fn batch_ranges(plan: &GroupPlan, batch_size: usize) -> Vec<Range<u64>> {
    let ids = plan.client_ids();
    let step = batch_size.max(1) as u64;
    (ids.start..ids.end)
        .step_by(step as usize)
        .map(|start| start..(start + step).min(ids.end))
        .collect()
}

/// Clients of one execution unit, driven cooperatively on its runtime.
pub struct ClientGroup {
    plan: GroupPlan,
    batch: BatchConfig,
    ctx: ClientContext,
}

impl ClientGroup {
    pub fn new(plan: GroupPlan, batch: BatchConfig, ctx: ClientContext) -> Self {
        Self { plan, batch, ctx }
    }

    pub async fn run(self) -> GroupReport {
        let ctx = &self.ctx;
        let deadline = ctx.clock.deadline();
        let batches = batch_ranges(&self.plan, self.batch.batch_size);
        let batch_count = batches.len();

        let mut running = FuturesUnordered::new();
        let mut reports = Vec::with_capacity(self.plan.clients);

        for (index, ids) in batches.into_iter().enumerate() {
            let size = ids.end - ids.start;
            for id in ids {
                running.push(VirtualClient::new(id).run(ctx));
            }
            debug!(
                group = self.plan.group_id,
                batch = index,
                size,
                "Launched client batch"
            );

            if index + 1 == batch_count {
                break;
            }

            // Keep launched clients moving while pausing before the next batch
            let pause = deadline.sleep(self.batch.batch_delay);
            tokio::pin!(pause);
            loop {
                tokio::select! {
                    _ = &mut pause => break,
                    Some(report) = running.next() => reports.push(report),
                }
            }
        }

        while let Some(report) = running.next().await {
            reports.push(report);
        }

        let report = GroupReport::from_clients(self.plan.group_id, batch_count, reports);
        info!(
            group = self.plan.group_id,
            clients = report.clients,
            samples = report.samples.len(),
            error_abort = report.error_abort,
            error_reconnect = report.error_reconnect,
            "Client group finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::deadline::RunClock;
    use crate::bench::sample::is_sorted_by_start;
    use crate::bench::client::ThinkTime;
    use crate::workload::EchoWorkload;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::time::Instant;

    fn sample(start_ms: u64) -> LatencySample {
        LatencySample::new(Duration::from_millis(start_ms), Duration::from_millis(1))
    }

    #[test]
    fn batches_cover_every_client_once() {
        let plan = GroupPlan {
            group_id: 0,
            id_offset: 0,
            clients: 1000,
        };
        let batches = batch_ranges(&plan, 250);

        assert_eq!(batches.len(), 4);
        assert!(batches.iter().all(|b| b.end - b.start == 250));
        assert_eq!(batches[3], 750..1000);
    }

    #[test]
    fn last_batch_holds_the_remainder() {
        let plan = GroupPlan {
            group_id: 2,
            id_offset: 500,
            clients: 7,
        };
        assert_eq!(batch_ranges(&plan, 3), vec![500..503, 503..506, 506..507]);
        assert!(batch_ranges(&GroupPlan { clients: 0, ..plan }, 3).is_empty());
    }

    #[test]
    fn report_merges_samples_and_ors_flags() {
        let reports = vec![
            ClientReport {
                id: 1,
                samples: vec![sample(2), sample(6)],
                error_reconnect: true,
                ..Default::default()
            },
            ClientReport {
                id: 0,
                samples: vec![sample(1), sample(4), sample(8)],
                ..Default::default()
            },
        ];

        let report = GroupReport::from_clients(0, 1, reports);

        assert_eq!(report.clients, 2);
        assert_eq!(report.samples.len(), 5);
        assert!(is_sorted_by_start(&report.samples));
        assert!(report.error_reconnect);
        assert!(!report.error_abort);
    }

    #[tokio::test]
    async fn group_staggers_batches_and_merges() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if let Ok((mut stream, _)) = listener.accept().await {
                    tokio::spawn(async move {
                        let (mut reader, mut writer) = stream.split();
                        let _ = tokio::io::copy(&mut reader, &mut writer).await;
                    });
                }
            }
        });

        let ctx = ClientContext {
            host: Arc::from("127.0.0.1"),
            port,
            workload: Arc::new(EchoWorkload),
            clock: RunClock::start(Duration::ZERO, Duration::from_millis(400)),
            think: ThinkTime::new(Duration::from_millis(5), Duration::from_millis(20)).unwrap(),
            reconnect_backoff: Duration::ZERO,
            response_buffer: 100,
        };
        let plan = GroupPlan {
            group_id: 0,
            id_offset: 10,
            clients: 10,
        };
        let batch = BatchConfig {
            batch_size: 4,
            batch_delay: Duration::from_millis(50),
        };

        let started = Instant::now();
        let report = ClientGroup::new(plan, batch, ctx).run().await;

        assert_eq!(report.batches, 3);
        assert_eq!(report.clients, 10);
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(!report.error_abort);
        assert!(!report.error_reconnect);
        assert!(!report.samples.is_empty());
        assert!(is_sorted_by_start(&report.samples));
    }
}
