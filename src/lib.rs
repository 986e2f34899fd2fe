// wasmbench - Open-loop load generator for native vs Wasm service comparisons

pub mod bench;
pub mod config;
pub mod result;
pub mod utils;
pub mod workload;

// Re-export commonly used types
pub use bench::{BenchmarkRun, RunSettings};
pub use result::{ResultBundle, Variant};
pub use utils::error::{BenchError, Result, WorkloadError};
pub use workload::{Workload, WorkloadTable};
