//! Named experiments built from the service prober and the job runner.
//!
//! Each experiment runs its steps strictly one after another and returns a
//! [`ScenarioReport`]; progress lines go to the writer passed in.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::job::JobRunner;
use crate::probe::HttpProber;
use crate::timer::Timer;
use crate::types::{JobRef, Mode, Outcome, ProbeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    ColdStart,
    RepeatedCalls,
    TotalTime,
}

impl Scenario {
    pub fn title(&self) -> &'static str {
        match self {
            Scenario::ColdStart => "Cold start comparison",
            Scenario::RepeatedCalls => "Repeated service calls",
            Scenario::TotalTime => "Total execution time comparison",
        }
    }
}

/// One labelled measurement inside a scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub label: String,
    #[serde(flatten)]
    pub result: ProbeResult,
}

/// Aggregate over the successful measurements of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub attempts: usize,
    pub successes: usize,
    pub failures: usize,
    /// Finished executions that reported failed tasks; not counted as successes.
    pub completed_with_failures: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    /// Wall-clock seconds for the whole scenario.
    pub total_seconds: f64,
}

impl Summary {
    /// Failed attempts are excluded from min/max/mean rather than counted as zero.
    pub fn from_results<'a, I>(results: I, total_seconds: f64) -> Self
    where
        I: IntoIterator<Item = &'a ProbeResult>,
    {
        let mut attempts = 0;
        let mut failures = 0;
        let mut completed_with_failures = 0;
        let mut durations = Vec::new();

        for result in results {
            attempts += 1;
            match result.outcome {
                Outcome::Succeeded => durations.push(result.duration),
                Outcome::CompletedWithFailures => completed_with_failures += 1,
                Outcome::Failed => failures += 1,
            }
        }

        let successes = durations.len();
        let min = durations.iter().copied().reduce(f64::min);
        let max = durations.iter().copied().reduce(f64::max);
        let mean = (successes > 0).then(|| durations.iter().sum::<f64>() / successes as f64);

        Self {
            attempts,
            successes,
            failures,
            completed_with_failures,
            min,
            max,
            mean,
            total_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub measurements: Vec<Measurement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

impl ScenarioReport {
    pub fn measurement(&self, label: &str) -> Option<&ProbeResult> {
        self.measurements
            .iter()
            .find(|m| m.label == label)
            .map(|m| &m.result)
    }
}

/// Everything one invocation measured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub started_at: DateTime<Utc>,
    pub scenarios: Vec<ScenarioReport>,
}

impl Report {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            scenarios: Vec::new(),
        }
    }
}

pub const SERVICE_LABEL: &str = "Service";
pub const JOB_LABEL: &str = "Job";

fn separator(out: &mut dyn Write) {
    let _ = writeln!(out, "\n{}\n", "-".repeat(40));
}

/// Probe the service once, then measure one job execution's cold start.
///
/// Whether the service is actually cold depends on how long it has been
/// idle; nothing here forces it to scale to zero.
pub fn cold_start_comparison(
    prober: &HttpProber,
    jobs: &JobRunner,
    service_url: &str,
    job: &JobRef,
    out: &mut dyn Write,
) -> ScenarioReport {
    comparison(prober, jobs, service_url, job, Mode::ColdStart, Scenario::ColdStart, out)
}

/// Probe the service `runs` times in sequence and summarize the latencies.
pub fn repeated_calls(
    prober: &HttpProber,
    service_url: &str,
    runs: usize,
    out: &mut dyn Write,
) -> ScenarioReport {
    let _ = writeln!(out, "Hitting {service_url} {runs} times...");
    let timer = Timer::start();
    let width = runs.to_string().len().max(2);

    let measurements: Vec<Measurement> = (1..=runs)
        .map(|i| {
            let label = format!("Run #{i:0width$}");
            let result = prober.probe(service_url, &label, out);
            Measurement { label, result }
        })
        .collect();

    let summary = Summary::from_results(measurements.iter().map(|m| &m.result), timer.stop());

    ScenarioReport {
        scenario: Scenario::RepeatedCalls,
        measurements,
        summary: Some(summary),
    }
}

/// Probe the service once, then measure one job execution end to end.
pub fn total_lifecycle_comparison(
    prober: &HttpProber,
    jobs: &JobRunner,
    service_url: &str,
    job: &JobRef,
    out: &mut dyn Write,
) -> ScenarioReport {
    comparison(prober, jobs, service_url, job, Mode::TotalTime, Scenario::TotalTime, out)
}

fn comparison(
    prober: &HttpProber,
    jobs: &JobRunner,
    service_url: &str,
    job: &JobRef,
    mode: Mode,
    scenario: Scenario,
    out: &mut dyn Write,
) -> ScenarioReport {
    let service = prober.probe(service_url, SERVICE_LABEL, out);
    separator(out);
    let job_result = jobs.trigger_and_wait(job, mode, out);

    ScenarioReport {
        scenario,
        measurements: vec![
            Measurement {
                label: SERVICE_LABEL.to_string(),
                result: service,
            },
            Measurement {
                label: JOB_LABEL.to_string(),
                result: job_result,
            },
        ],
        summary: None,
    }
}
