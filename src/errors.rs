use std::path::PathBuf;
use std::time::Duration;

use crate::types::FailureKind;

#[derive(thiserror::Error, Debug)]
pub enum BenchError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Control plane error: {detail}")]
    ControlPlane { detail: String },

    #[error("Gave up after {waited:?} waiting for {what}")]
    PollTimeout { what: String, waited: Duration },

    #[error("Startup log at {logged} precedes execution creation at {created} by {skew:.4} seconds")]
    ClockSkew {
        created: String,
        logged: String,
        skew: f64,
    },

    #[error("Credential command `{command}` failed: {detail}")]
    Credential { command: String, detail: String },

    #[error("Failed to decode response from {url}: {detail}")]
    Decode { url: String, detail: String },

    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {detail}")]
    ConfigParse { path: PathBuf, detail: String },

    #[error("Missing required setting '{key}' (set it in the config file or pass --{flag})")]
    MissingSetting { key: &'static str, flag: &'static str },
}

impl BenchError {
    /// Classify the error for reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            BenchError::Transport { source, .. } if source.is_timeout() => FailureKind::Timeout,
            BenchError::Transport { .. } => FailureKind::Transport,
            BenchError::HttpStatus { .. } => FailureKind::HttpStatus,
            BenchError::ControlPlane { .. } | BenchError::Decode { .. } => {
                FailureKind::ControlPlane
            }
            BenchError::PollTimeout { .. } => FailureKind::Timeout,
            BenchError::ClockSkew { .. } => FailureKind::ClockSkew,
            BenchError::Credential { .. } => FailureKind::Credential,
            BenchError::ConfigRead { .. }
            | BenchError::ConfigParse { .. }
            | BenchError::MissingSetting { .. } => FailureKind::Config,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            BenchError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T, E = BenchError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_keeps_code() {
        let err = BenchError::HttpStatus {
            url: "http://svc".to_string(),
            status: 503,
        };
        assert_eq!(err.kind(), FailureKind::HttpStatus);
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn poll_timeout_is_timeout_kind() {
        let err = BenchError::PollTimeout {
            what: "startup log".to_string(),
            waited: Duration::from_secs(300),
        };
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert_eq!(err.status(), None);
    }

    #[test]
    fn clock_skew_reports_gap() {
        let err = BenchError::ClockSkew {
            created: "2026-03-01T10:00:05+00:00".to_string(),
            logged: "2026-03-01T10:00:04.500+00:00".to_string(),
            skew: 0.5,
        };
        assert_eq!(err.kind(), FailureKind::ClockSkew);
        assert!(err.to_string().contains("by 0.5000 seconds"));
    }

    #[test]
    fn missing_setting_names_flag() {
        let err = BenchError::MissingSetting {
            key: "project",
            flag: "project",
        };
        assert!(err.to_string().contains("--project"));
        assert_eq!(err.kind(), FailureKind::Config);
    }
}
