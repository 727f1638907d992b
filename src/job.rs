use std::io::Write;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cloud::{ControlPlane, LogStore};
use crate::errors::{BenchError, Result};
use crate::poll::Poller;
use crate::timer::seconds_between;
use crate::types::{Execution, JobRef, Mode, ProbeResult, STARTUP_MARKER_PREFIX};

/// The exact line a job prints first so its startup can be observed.
pub fn startup_marker(execution_id: &str) -> String {
    format!("{STARTUP_MARKER_PREFIX}{execution_id}")
}

/// Print the startup marker and flush immediately.
pub fn emit_startup_marker(execution_id: &str, out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "{}", startup_marker(execution_id))?;
    out.flush()
}

/// Log-store filter matching the startup marker of one execution of `job_name`.
pub fn startup_log_filter(job_name: &str, execution_id: &str) -> String {
    format!(
        "resource.type=\"cloud_run_job\"\n\
         resource.labels.job_name=\"{}\"\n\
         textPayload=\"{}\"",
        job_name,
        startup_marker(execution_id)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    /// Bound on waiting for the control plane to acknowledge a new execution.
    pub operation_timeout: Duration,
    pub cold_start: Poller,
    pub total_time: Poller,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(180),
            cold_start: Poller::new(Duration::from_secs(2), Some(Duration::from_secs(300))),
            total_time: Poller::new(Duration::from_secs(5), None),
        }
    }
}

/// Triggers job executions and measures them.
pub struct JobRunner {
    control: Box<dyn ControlPlane>,
    logs: Box<dyn LogStore>,
    settings: JobSettings,
}

impl JobRunner {
    pub fn new(
        control: Box<dyn ControlPlane>,
        logs: Box<dyn LogStore>,
        settings: JobSettings,
    ) -> Self {
        Self {
            control,
            logs,
            settings,
        }
    }

    /// Start one execution of `job` and measure it in the given mode.
    ///
    /// Errors never escape: they are reported on `out` and turned into a
    /// failed result. An execution that outlives a cold-start timeout is
    /// left running.
    pub fn trigger_and_wait(
        &self,
        job: &JobRef,
        mode: Mode,
        out: &mut dyn Write,
    ) -> ProbeResult {
        let _ = writeln!(out, "Testing job: {}", job.job);
        match self.try_trigger_and_wait(job, mode, out) {
            Ok(result) => result,
            Err(err) => {
                warn!(job = %job.job, ?mode, error = %err, "job measurement failed");
                let _ = writeln!(out, "An error occurred: {err}");
                ProbeResult::failure(&err)
            }
        }
    }

    fn try_trigger_and_wait(
        &self,
        job: &JobRef,
        mode: Mode,
        out: &mut dyn Write,
    ) -> Result<ProbeResult> {
        let execution = self.control.run_job(job, self.settings.operation_timeout)?;
        let _ = writeln!(
            out,
            "Job execution '{}' created at {}.",
            execution.id(),
            execution.create_time.to_rfc3339()
        );

        match mode {
            Mode::ColdStart => {
                let _ = writeln!(out, "Searching for startup log...");
                let duration = self.wait_for_startup(job, &execution, out)?;
                let _ = writeln!(out, "Job cold start was {duration:.4} seconds.");
                Ok(ProbeResult::success(duration, None))
            }
            Mode::TotalTime => {
                let _ = writeln!(out, "Polling for completion...");
                let finished = self.wait_for_completion(execution)?;
                let end = finished.completion_time.ok_or_else(|| BenchError::ControlPlane {
                    detail: format!("execution {} has no completion time", finished.id()),
                })?;
                let duration = seconds_between(finished.create_time, end);
                if finished.failed_count > 0 {
                    let _ = writeln!(
                        out,
                        "Job execution completed with failures in {duration:.4} seconds ({} failed).",
                        finished.failed_count
                    );
                    Ok(ProbeResult::completed_with_failures(duration))
                } else {
                    let _ = writeln!(out, "Job execution succeeded in {duration:.4} seconds.");
                    Ok(ProbeResult::success(duration, None))
                }
            }
        }
    }

    /// Poll the log store for the execution's startup marker.
    ///
    /// Returns seconds from the execution's creation to the first matching
    /// entry. A marker stamped before the creation time is a clock-skew error.
    pub fn wait_for_startup(
        &self,
        job: &JobRef,
        execution: &Execution,
        out: &mut dyn Write,
    ) -> Result<f64> {
        let marker = startup_marker(execution.id());
        let filter = startup_log_filter(&job.job, execution.id());

        let entry = self.settings.cold_start.poll("job startup log", || {
            let entries = self.logs.list_entries(&job.project, &filter)?;
            debug!(execution = execution.id(), count = entries.len(), "log query returned");
            Ok(entries
                .into_iter()
                .find(|e| e.text_payload.as_deref().map(str::trim_end) == Some(marker.as_str())))
        })?;

        let _ = writeln!(out, "Startup log found at {}.", entry.timestamp.to_rfc3339());
        let duration = seconds_between(execution.create_time, entry.timestamp);
        if duration < 0.0 {
            warn!(duration, "startup log is older than the execution");
            return Err(BenchError::ClockSkew {
                created: execution.create_time.to_rfc3339(),
                logged: entry.timestamp.to_rfc3339(),
                skew: -duration,
            });
        }
        Ok(duration)
    }

    /// Re-read the execution until it reports a completion time.
    pub fn wait_for_completion(&self, execution: Execution) -> Result<Execution> {
        let name = execution.name.clone();
        let mut latest = Some(execution);

        self.settings.total_time.poll("job completion", || {
            let current = match latest.take() {
                Some(known) => known,
                None => self.control.get_execution(&name)?,
            };
            Ok(current.completion_time.is_some().then_some(current))
        })
    }
}
