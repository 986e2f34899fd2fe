pub mod client;
pub mod deadline;
pub mod group;
pub mod merge;
pub mod run;
pub mod sample;

pub use client::{ClientContext, ClientReport, ClientState, FaultKind, ThinkTime, VirtualClient};
pub use deadline::{Deadline, Expired, RunClock};
pub use group::{batch_ranges, BatchConfig, ClientGroup, GroupPlan, GroupReport};
pub use merge::merge_sorted;
pub use run::{partition, unit_count, BenchmarkRun, RunOutcome, RunSettings};
pub use sample::{is_sorted_by_start, LatencySample};
