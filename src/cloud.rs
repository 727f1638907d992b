//! Control-plane and log-store access.
//!
//! The job poller only sees the [`ControlPlane`] and [`LogStore`] traits.
//! [`CloudRunApi`] and [`CloudLoggingApi`] implement them over the Cloud Run
//! Admin v2 and Cloud Logging v2 REST APIs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::credential::{CredentialSource, bearer_header};
use crate::errors::{BenchError, Result};
use crate::poll::Poller;
use crate::timer::Timer;
use crate::types::{Execution, JobRef, LogEntry};

pub const DEFAULT_RUN_ENDPOINT: &str = "https://run.googleapis.com";
pub const DEFAULT_LOGGING_ENDPOINT: &str = "https://logging.googleapis.com";

/// Starts job executions and reports their status.
pub trait ControlPlane {
    /// Start an execution of `job` and return once the control plane has
    /// acknowledged its creation, waiting at most `timeout`.
    fn run_job(&self, job: &JobRef, timeout: Duration) -> Result<Execution>;

    /// Current state of the execution with the given full resource name.
    fn get_execution(&self, name: &str) -> Result<Execution>;
}

/// Queries structured logs.
pub trait LogStore {
    /// Entries in `project` matching `filter`, oldest first.
    fn list_entries(&self, project: &str, filter: &str) -> Result<Vec<LogEntry>>;
}

/// Authenticated JSON-over-HTTP calls against one API endpoint.
struct RestClient {
    client: Client,
    endpoint: String,
    credential: Box<dyn CredentialSource>,
    timeout: Duration,
}

impl RestClient {
    fn new(
        client: Client,
        endpoint: &str,
        credential: Box<dyn CredentialSource>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credential,
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        self.send(self.client.get(&url), &url, self.timeout)
    }

    fn post<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T> {
        self.post_within(path, body, self.timeout)
    }

    /// POST whose timeout is capped at `limit`.
    fn post_within<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
        limit: Duration,
    ) -> Result<T> {
        let url = self.url(path);
        let request = self.client.post(&url).json(body);
        self.send(request, &url, self.timeout.min(limit))
    }

    fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        url: &str,
        timeout: Duration,
    ) -> Result<T> {
        let mut request = request.timeout(timeout);
        if let Some(value) = bearer_header(self.credential.as_ref())? {
            request = request.header(AUTHORIZATION, value);
        }

        debug!(%url, "control-plane request");
        let transport = |source| BenchError::Transport {
            url: url.to_string(),
            source,
        };
        let response = request.send().map_err(transport)?;
        let status = response.status();
        let body = response.text().map_err(transport)?;

        if !status.is_success() {
            return Err(BenchError::ControlPlane {
                detail: format!("HTTP {} from {}: {}", status.as_u16(), url, api_message(&body)),
            });
        }

        serde_json::from_str(&body).map_err(|e| BenchError::Decode {
            url: url.to_string(),
            detail: e.to_string(),
        })
    }
}

/// Pull `error.message` out of a Google API error body, falling back to the raw text.
fn api_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: RpcStatus,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.error.message.is_empty() => parsed.error.message,
        _ => body.trim().to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct RpcStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// Long-running operation returned by `jobs.run`.
#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    done: bool,
    metadata: Option<ExecutionResource>,
    response: Option<ExecutionResource>,
    error: Option<RpcStatus>,
}

impl Operation {
    fn execution(&self) -> Option<Execution> {
        self.response
            .as_ref()
            .and_then(ExecutionResource::to_execution)
            .or_else(|| self.metadata.as_ref().and_then(ExecutionResource::to_execution))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionResource {
    #[serde(default)]
    name: String,
    create_time: Option<DateTime<Utc>>,
    completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    failed_count: u32,
    #[serde(default)]
    succeeded_count: u32,
}

impl ExecutionResource {
    /// `None` until the resource has both a name and a creation time.
    fn to_execution(&self) -> Option<Execution> {
        if self.name.is_empty() {
            return None;
        }
        Some(Execution {
            name: self.name.clone(),
            create_time: self.create_time?,
            completion_time: self.completion_time,
            failed_count: self.failed_count,
            succeeded_count: self.succeeded_count,
        })
    }
}

/// Cloud Run Admin API v2.
pub struct CloudRunApi {
    rest: RestClient,
    operation_interval: Duration,
}

impl CloudRunApi {
    pub fn new(
        client: Client,
        endpoint: &str,
        credential: Box<dyn CredentialSource>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            rest: RestClient::new(client, endpoint, credential, request_timeout),
            operation_interval: Duration::from_secs(1),
        }
    }

    /// How often the `jobs.run` operation is re-read while waiting for creation.
    pub fn with_operation_interval(mut self, interval: Duration) -> Self {
        self.operation_interval = interval;
        self
    }
}

impl ControlPlane for CloudRunApi {
    fn run_job(&self, job: &JobRef, timeout: Duration) -> Result<Execution> {
        let path = format!("v2/{}:run", job.resource_name());
        let timer = Timer::start();
        let first: Operation = self.rest.post_within(&path, &serde_json::json!({}), timeout)?;
        if let Some(execution) = acknowledged(job, &first)? {
            return Ok(execution);
        }

        // The submit request counts against the same creation budget.
        let remaining = timeout.saturating_sub(timer.elapsed());
        let operation_path = format!("v2/{}", first.name);
        Poller::new(self.operation_interval, Some(remaining)).poll("execution creation", || {
            let operation: Operation = self.rest.get(&operation_path)?;
            acknowledged(job, &operation)
        })
    }

    fn get_execution(&self, name: &str) -> Result<Execution> {
        let resource: ExecutionResource = self.rest.get(&format!("v2/{name}"))?;
        resource.to_execution().ok_or_else(|| BenchError::ControlPlane {
            detail: format!("execution {name} has no creation time"),
        })
    }
}

/// The execution once `operation` acknowledges its creation, `None` while
/// the operation is still pending.
fn acknowledged(job: &JobRef, operation: &Operation) -> Result<Option<Execution>> {
    if let Some(status) = &operation.error {
        return Err(BenchError::ControlPlane {
            detail: format!("run {} failed ({}): {}", job.job, status.code, status.message),
        });
    }
    if let Some(execution) = operation.execution() {
        return Ok(Some(execution));
    }
    if operation.done {
        return Err(BenchError::ControlPlane {
            detail: format!("operation {} finished without an execution", operation.name),
        });
    }
    if operation.name.is_empty() {
        return Err(BenchError::ControlPlane {
            detail: "run response carried neither an execution nor an operation name".to_string(),
        });
    }
    Ok(None)
}

/// Cloud Logging API v2.
pub struct CloudLoggingApi {
    rest: RestClient,
    page_size: u32,
}

impl CloudLoggingApi {
    pub fn new(
        client: Client,
        endpoint: &str,
        credential: Box<dyn CredentialSource>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            rest: RestClient::new(client, endpoint, credential, request_timeout),
            page_size: 50,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListEntriesResponse {
    #[serde(default)]
    entries: Vec<LogEntry>,
}

impl LogStore for CloudLoggingApi {
    fn list_entries(&self, project: &str, filter: &str) -> Result<Vec<LogEntry>> {
        let body = serde_json::json!({
            "resourceNames": [format!("projects/{project}")],
            "filter": filter,
            "orderBy": "timestamp asc",
            "pageSize": self.page_size,
        });
        let response: ListEntriesResponse = self.rest.post("v2/entries:list", &body)?;
        Ok(response.entries)
    }
}
