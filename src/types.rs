use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::BenchError;

/// Duration reported when a measurement could not be taken.
pub const FAILURE: f64 = -1.0;

/// Payload prefix the job prints as its very first action.
pub const STARTUP_MARKER_PREFIX: &str = "JOB_CONTAINER_STARTED_LOG:";

/// Fully-qualified reference to a managed batch job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRef {
    pub project: String,
    pub region: String,
    pub job: String,
}

impl JobRef {
    pub fn new(project: &str, region: &str, job: &str) -> Self {
        Self {
            project: project.to_string(),
            region: region.to_string(),
            job: job.to_string(),
        }
    }

    /// `projects/{project}/locations/{region}/jobs/{job}`
    pub fn resource_name(&self) -> String {
        format!(
            "projects/{}/locations/{}/jobs/{}",
            self.project, self.region, self.job
        )
    }
}

/// One run of a managed batch job, as last seen from the control plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Full resource name, e.g. `projects/p/locations/r/jobs/j/executions/j-abc12`.
    pub name: String,
    pub create_time: DateTime<Utc>,
    pub completion_time: Option<DateTime<Utc>>,
    pub failed_count: u32,
    pub succeeded_count: u32,
}

impl Execution {
    /// Short execution id: the last segment of the resource name.
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// A timestamped entry from the structured log store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub text_payload: Option<String>,
}

/// What the job poller waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Until the startup marker shows up in the log store.
    ColdStart,
    /// Until the execution reports a completion timestamp.
    TotalTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    /// The execution finished but some of its tasks failed. The duration is
    /// still measured, but it does not count as a success.
    CompletedWithFailures,
    Failed,
}

/// Why a measurement could not be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection refused, DNS failure and similar.
    Transport,
    /// The remote answered with a non-2xx status.
    HttpStatus,
    /// The request or poll exceeded its time budget.
    Timeout,
    /// The startup log is timestamped before the execution was created.
    ClockSkew,
    ControlPlane,
    Credential,
    Config,
}

/// Outcome of one timed operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub outcome: Outcome,
    /// Elapsed seconds, or [`FAILURE`] when no measurement was taken.
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn success(duration: f64, status: Option<u16>) -> Self {
        Self {
            outcome: Outcome::Succeeded,
            duration: duration.max(0.0),
            status,
            failure: None,
            error: None,
        }
    }

    pub fn completed_with_failures(duration: f64) -> Self {
        Self {
            outcome: Outcome::CompletedWithFailures,
            duration: duration.max(0.0),
            status: None,
            failure: None,
            error: None,
        }
    }

    pub fn failure(err: &BenchError) -> Self {
        Self {
            outcome: Outcome::Failed,
            duration: FAILURE,
            status: err.status(),
            failure: Some(err.kind()),
            error: Some(err.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    /// Measured seconds, if a measurement was taken at all.
    pub fn seconds(&self) -> Option<f64> {
        (self.duration >= 0.0).then_some(self.duration)
    }
}
