use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cloud::{DEFAULT_LOGGING_ENDPOINT, DEFAULT_RUN_ENDPOINT};
use crate::errors::{BenchError, Result};
use crate::job::JobSettings;
use crate::poll::Poller;
use crate::types::JobRef;

pub const DEFAULT_REGION: &str = "us-west1";
pub const DEFAULT_JOB_NAME: &str = "cloud-job";
pub const DEFAULT_RUNS: usize = 50;

/// On-disk configuration. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub service_url: Option<String>,
    pub project: Option<String>,
    pub region: Option<String>,
    pub job_name: Option<String>,
    pub runs: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub operation_timeout_secs: Option<u64>,
    pub cold_start_interval_secs: Option<u64>,
    pub cold_start_budget_secs: Option<u64>,
    pub total_time_interval_secs: Option<u64>,
    pub run_api_endpoint: Option<String>,
    pub logging_api_endpoint: Option<String>,
    #[serde(default)]
    pub credentials: CredentialConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialConfig {
    /// Prints the identity token sent to the service.
    pub identity_command: Option<Vec<String>>,
    /// Prints the OAuth access token sent to the control plane and log store.
    pub access_command: Option<Vec<String>>,
    pub max_age_secs: Option<u64>,
}

/// Values given on the command line; they win over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub service_url: Option<String>,
    pub project: Option<String>,
    pub region: Option<String>,
    pub job_name: Option<String>,
    pub runs: Option<usize>,
    pub anonymous: bool,
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub service_url: Option<String>,
    pub project: Option<String>,
    pub region: String,
    pub job_name: String,
    pub runs: usize,
    pub request_timeout: Duration,
    pub job: JobSettings,
    pub run_api_endpoint: String,
    pub logging_api_endpoint: String,
    pub identity_command: Vec<String>,
    pub access_command: Vec<String>,
    pub credential_max_age: Duration,
    /// Skip credentials entirely (public endpoints, local testing).
    pub anonymous: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_url: None,
            project: None,
            region: DEFAULT_REGION.to_string(),
            job_name: DEFAULT_JOB_NAME.to_string(),
            runs: DEFAULT_RUNS,
            request_timeout: Duration::from_secs(300),
            job: JobSettings::default(),
            run_api_endpoint: DEFAULT_RUN_ENDPOINT.to_string(),
            logging_api_endpoint: DEFAULT_LOGGING_ENDPOINT.to_string(),
            identity_command: argv(&["gcloud", "auth", "print-identity-token"]),
            access_command: argv(&["gcloud", "auth", "print-access-token"]),
            credential_max_age: Duration::from_secs(300),
            anonymous: false,
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl Settings {
    /// Layer the config file over the built-in defaults.
    pub fn from_file(file: FileConfig) -> Self {
        let mut s = Settings::default();
        let secs = Duration::from_secs;

        s.service_url = file.service_url;
        s.project = file.project;
        if let Some(region) = file.region {
            s.region = region;
        }
        if let Some(job_name) = file.job_name {
            s.job_name = job_name;
        }
        if let Some(runs) = file.runs {
            s.runs = runs;
        }
        if let Some(t) = file.request_timeout_secs {
            s.request_timeout = secs(t);
        }
        if let Some(t) = file.operation_timeout_secs {
            s.job.operation_timeout = secs(t);
        }
        let cold = s.job.cold_start;
        s.job.cold_start = Poller::new(
            file.cold_start_interval_secs.map(secs).unwrap_or(cold.interval),
            file.cold_start_budget_secs.map(secs).or(cold.budget),
        );
        if let Some(t) = file.total_time_interval_secs {
            s.job.total_time.interval = secs(t);
        }
        if let Some(endpoint) = file.run_api_endpoint {
            s.run_api_endpoint = endpoint;
        }
        if let Some(endpoint) = file.logging_api_endpoint {
            s.logging_api_endpoint = endpoint;
        }
        if let Some(cmd) = file.credentials.identity_command {
            s.identity_command = cmd;
        }
        if let Some(cmd) = file.credentials.access_command {
            s.access_command = cmd;
        }
        if let Some(age) = file.credentials.max_age_secs {
            s.credential_max_age = secs(age);
        }
        s
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(url) = &overrides.service_url {
            self.service_url = Some(url.clone());
        }
        if let Some(project) = &overrides.project {
            self.project = Some(project.clone());
        }
        if let Some(region) = &overrides.region {
            self.region = region.clone();
        }
        if let Some(job_name) = &overrides.job_name {
            self.job_name = job_name.clone();
        }
        if let Some(runs) = overrides.runs {
            self.runs = runs;
        }
        self.anonymous |= overrides.anonymous;
    }

    pub fn service_url(&self) -> Result<&str> {
        self.service_url.as_deref().ok_or(BenchError::MissingSetting {
            key: "service_url",
            flag: "url",
        })
    }

    pub fn job_ref(&self) -> Result<JobRef> {
        let project = self.project.as_deref().ok_or(BenchError::MissingSetting {
            key: "project",
            flag: "project",
        })?;
        Ok(JobRef::new(project, &self.region, &self.job_name))
    }
}

/// `<config dir>/coldbench/config.toml`, e.g. `~/.config/coldbench/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("coldbench").join("config.toml"))
}

/// Read the config file.
///
/// An explicit `path` must exist. Without one, the default location is
/// used if present and an empty config otherwise.
pub fn load_config(path: Option<&Path>) -> Result<FileConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) if p.is_file() => p,
            _ => return Ok(FileConfig::default()),
        },
    };

    let text = std::fs::read_to_string(&path).map_err(|source| BenchError::ConfigRead {
        path: path.clone(),
        source,
    })?;
    parse_config(&text).map_err(|detail| BenchError::ConfigParse { path, detail })
}

pub fn parse_config(text: &str) -> std::result::Result<FileConfig, String> {
    toml::from_str(text).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_measurement_protocol() {
        let s = Settings::default();
        assert_eq!(s.runs, 50);
        assert_eq!(s.request_timeout, Duration::from_secs(300));
        assert_eq!(s.job.operation_timeout, Duration::from_secs(180));
        assert_eq!(s.job.cold_start.interval, Duration::from_secs(2));
        assert_eq!(s.job.cold_start.budget, Some(Duration::from_secs(300)));
        assert_eq!(s.job.total_time.interval, Duration::from_secs(5));
        assert_eq!(s.job.total_time.budget, None);
        assert_eq!(s.identity_command[0], "gcloud");
    }

    #[test]
    fn file_values_override_defaults() {
        let file = parse_config(
            r#"
            service_url = "https://svc.example.run.app"
            project = "demo-project"
            runs = 10
            cold_start_budget_secs = 60

            [credentials]
            identity_command = ["cat", "/tmp/token"]
            max_age_secs = 0
            "#,
        )
        .unwrap();
        let s = Settings::from_file(file);

        assert_eq!(s.service_url().unwrap(), "https://svc.example.run.app");
        assert_eq!(s.runs, 10);
        assert_eq!(s.job.cold_start.budget, Some(Duration::from_secs(60)));
        assert_eq!(s.job.cold_start.interval, Duration::from_secs(2));
        assert_eq!(s.identity_command, vec!["cat", "/tmp/token"]);
        assert_eq!(s.credential_max_age, Duration::ZERO);
        assert_eq!(s.region, DEFAULT_REGION);
    }

    #[test]
    fn overrides_win_over_file() {
        let file = parse_config("project = \"from-file\"\nruns = 10\n").unwrap();
        let mut s = Settings::from_file(file);
        s.apply(&Overrides {
            project: Some("from-cli".to_string()),
            runs: Some(5),
            anonymous: true,
            ..Overrides::default()
        });

        assert_eq!(s.job_ref().unwrap().project, "from-cli");
        assert_eq!(s.runs, 5);
        assert!(s.anonymous);
    }

    #[test]
    fn missing_project_is_error() {
        let s = Settings::default();
        let err = s.job_ref().unwrap_err();
        assert!(err.to_string().contains("--project"));
    }

    #[test]
    fn missing_url_is_error() {
        assert!(Settings::default().service_url().is_err());
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(parse_config("servce_url = \"typo\"").is_err());
    }

    #[test]
    fn explicit_missing_file_is_error() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let err = load_config(Some(&tmp.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, BenchError::ConfigRead { .. }));
    }

    #[test]
    fn explicit_file_is_read() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "job_name = \"batch\"\n").unwrap();
        let file = load_config(Some(&path)).unwrap();
        assert_eq!(file.job_name.as_deref(), Some("batch"));
    }

    #[test]
    fn invalid_file_names_path() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "runs = \"many\"\n").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }
}
