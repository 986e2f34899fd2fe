//! Workload capabilities: what a virtual client sends and how it accepts a reply.
//!
//! A run receives a single `Arc<dyn Workload>` looked up from a
//! [`WorkloadTable`] built once at setup. The core never interprets payloads
//! itself.

mod echo;
mod ml;
mod nosql;

pub use echo::EchoWorkload;
pub use ml::MachineLearningWorkload;
pub use nosql::NoSqlWorkload;

use crate::utils::error::{BenchError, Result, WorkloadError};
use bytes::Bytes;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// How many bytes make up one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFrame {
    /// Read exactly this many bytes.
    Exact(usize),
    /// Accept whatever a single read returns (up to the response buffer).
    Any,
}

pub trait Workload: Send + Sync + fmt::Debug {
    /// Identifier used on the command line and in result file names
    fn name(&self) -> &'static str;

    /// Result sub-folder for this workload
    fn folder(&self) -> &'static str;

    /// Payload for the next request of `client_id`; `seq` counts that client's requests
    fn next_request(&self, client_id: u64, seq: u64, rng: &mut StdRng) -> Bytes;

    fn response_frame(&self, request: &[u8]) -> ResponseFrame;

    /// Validate a complete response to `request`
    fn check_response(
        &self,
        request: &[u8],
        response: &[u8],
    ) -> std::result::Result<(), WorkloadError>;
}

/// Lookup of workload identifiers to capabilities.
#[derive(Clone, Default)]
pub struct WorkloadTable {
    workloads: BTreeMap<&'static str, Arc<dyn Workload>>,
}

impl WorkloadTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding every workload shipped with the crate
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.register(Arc::new(MachineLearningWorkload));
        table.register(Arc::new(NoSqlWorkload));
        table.register(Arc::new(EchoWorkload));
        table
    }

    pub fn register(&mut self, workload: Arc<dyn Workload>) {
        self.workloads.insert(workload.name(), workload);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Workload>> {
        self.workloads
            .get(name)
            .cloned()
            .ok_or_else(|| BenchError::UnknownWorkload(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.workloads.keys().copied()
    }
}

impl fmt::Debug for WorkloadTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.workloads.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_resolves_known_names() {
        let table = WorkloadTable::builtin();
        assert_eq!(table.get("ml").unwrap().folder(), "machine_learning");
        assert_eq!(table.get("nosql").unwrap().folder(), "no_sql_db");
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["echo", "ml", "nosql"]);
    }

    #[test]
    fn unknown_workload_is_rejected() {
        let table = WorkloadTable::builtin();
        let err = table.get("rdb").unwrap_err();
        assert!(matches!(err, BenchError::UnknownWorkload(name) if name == "rdb"));
    }
}
