//! Persisted result bundle, the hand-off to the analysis tooling.

use crate::bench::run::{RunOutcome, RunSettings};
use crate::utils::error::{BenchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Deployment flavor of the measured service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Native,
    Wasm,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Native => "native",
            Variant::Wasm => "wasm",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "native" => Ok(Variant::Native),
            "wasm" => Ok(Variant::Wasm),
            other => Err(BenchError::Config(format!(
                "Invalid variant: {}. Must be 'native' or 'wasm'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBundle {
    pub run_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub workload: String,
    pub variant: Variant,
    /// Measurement phase in seconds, warmup excluded
    pub duration: f64,
    pub warmup: f64,
    pub connections: usize,
    pub units: usize,
    pub error_abort: bool,
    pub error_reconnect: bool,
    /// `(start_ns, duration_ns)`, sorted by start; the first start is 0
    pub latencies: Vec<(u64, u64)>,
}

/// Headline numbers logged at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BundleSummary {
    pub requests: usize,
    pub throughput: f64,
}

impl ResultBundle {
    pub fn from_outcome(workload: &str, settings: &RunSettings, outcome: &RunOutcome) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            workload: workload.to_string(),
            variant: settings.variant,
            duration: settings.duration.as_secs_f64(),
            warmup: settings.warmup().as_secs_f64(),
            connections: outcome.connections(),
            units: outcome.plans.len(),
            error_abort: outcome.error_abort,
            error_reconnect: outcome.error_reconnect,
            latencies: outcome.samples.iter().map(|s| s.as_nanos()).collect(),
        }
    }

    pub fn summary(&self) -> BundleSummary {
        let requests = self.latencies.len();
        let throughput = if self.duration > 0.0 {
            requests as f64 / self.duration
        } else {
            0.0
        };
        BundleSummary {
            requests,
            throughput,
        }
    }

    /// `<workload>_<variant>_d<duration>_c<connections>.json`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_d{}_c{}.json",
            self.workload, self.variant, self.duration, self.connections
        )
    }

    /// Write the bundle under `root/<folder>/`, creating the folder.
    pub fn persist(&self, root: &Path, folder: &str, pretty: bool) -> Result<PathBuf> {
        let dir = root.join(folder);
        std::fs::create_dir_all(&dir).map_err(|e| {
            BenchError::Persist(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let path = dir.join(self.file_name());
        let body = if pretty {
            serde_json::to_vec_pretty(self)?
        } else {
            serde_json::to_vec(self)?
        };
        std::fs::write(&path, body).map_err(|e| {
            BenchError::Persist(format!("Failed to write {}: {}", path.display(), e))
        })?;

        Ok(path)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read(path.as_ref()).map_err(|e| {
            BenchError::Persist(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(serde_json::from_slice(&content)?)
    }
}
