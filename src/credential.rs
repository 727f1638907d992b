use std::cell::RefCell;
use std::process::Command;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::errors::{BenchError, Result};

/// Supplies the bearer token for each outgoing request.
///
/// Asked once per call, so an implementation can refresh an expired token
/// instead of holding one for the life of the process.
pub trait CredentialSource {
    /// Current token, or `None` to send the request unauthenticated.
    fn token(&self) -> Result<Option<String>>;
}

/// Sends requests without an `Authorization` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl CredentialSource for Anonymous {
    fn token(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// A fixed token, e.g. one passed in through the environment.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl CredentialSource for StaticToken {
    fn token(&self) -> Result<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}

/// Runs an external command (such as `gcloud auth print-identity-token`)
/// and uses its trimmed stdout as the token.
///
/// The token is reused until it is `max_age` old; a zero `max_age` runs the
/// command on every call.
#[derive(Debug)]
pub struct CommandCredential {
    argv: Vec<String>,
    max_age: Duration,
    cached: RefCell<Option<(String, Instant)>>,
}

impl CommandCredential {
    pub fn new<S: AsRef<str>>(argv: &[S], max_age: Duration) -> Self {
        Self {
            argv: argv.iter().map(|s| s.as_ref().to_string()).collect(),
            max_age,
            cached: RefCell::new(None),
        }
    }

    fn command_line(&self) -> String {
        self.argv.join(" ")
    }

    fn fetch(&self) -> Result<String> {
        let (program, args) = self.argv.split_first().ok_or_else(|| BenchError::Credential {
            command: String::new(),
            detail: "empty command".to_string(),
        })?;

        debug!(command = %self.command_line(), "fetching credential");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| BenchError::Credential {
                command: self.command_line(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(BenchError::Credential {
                command: self.command_line(),
                detail: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(BenchError::Credential {
                command: self.command_line(),
                detail: "printed an empty token".to_string(),
            });
        }
        Ok(token)
    }
}

impl CredentialSource for CommandCredential {
    fn token(&self) -> Result<Option<String>> {
        if let Some((token, fetched_at)) = self.cached.borrow().as_ref()
            && fetched_at.elapsed() < self.max_age
        {
            return Ok(Some(token.clone()));
        }

        let token = self.fetch()?;
        *self.cached.borrow_mut() = Some((token.clone(), Instant::now()));
        Ok(Some(token))
    }
}

/// `Authorization` header value for the current credential, if any.
pub fn bearer_header(source: &dyn CredentialSource) -> Result<Option<String>> {
    Ok(source.token()?.map(|t| format!("Bearer {t}")))
}
