use std::io::Write;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use tracing::{debug, warn};

use crate::credential::{CredentialSource, bearer_header};
use crate::errors::{BenchError, Result};
use crate::timer::Timer;
use crate::types::ProbeResult;

/// Build the blocking client shared by every probe and API call.
pub fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("coldbench/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|source| BenchError::Transport {
            url: String::new(),
            source,
        })
}

/// Times single authenticated GET requests against a service endpoint.
pub struct HttpProber {
    client: Client,
    credential: Box<dyn CredentialSource>,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(client: Client, credential: Box<dyn CredentialSource>, timeout: Duration) -> Self {
        Self {
            client,
            credential,
            timeout,
        }
    }

    /// Issue one GET to `url` and time it.
    ///
    /// Any 2xx response is a success; everything else, including credential
    /// lookup failures, yields a result carrying the failure sentinel. A
    /// one-line outcome prefixed with `label` is written to `out`.
    pub fn probe(&self, url: &str, label: &str, out: &mut dyn Write) -> ProbeResult {
        match self.try_probe(url) {
            Ok((duration, status)) => {
                let _ = writeln!(
                    out,
                    "{label}: responded in {duration:.4} seconds (HTTP {status})"
                );
                ProbeResult::success(duration, Some(status))
            }
            Err(err) => {
                warn!(%url, error = %err, "probe failed");
                let _ = writeln!(out, "{label}: FAILED - {err}");
                ProbeResult::failure(&err)
            }
        }
    }

    fn try_probe(&self, url: &str) -> Result<(f64, u16)> {
        let auth = bearer_header(self.credential.as_ref())?;

        let timer = Timer::start();
        let mut request = self.client.get(url).timeout(self.timeout);
        if let Some(value) = auth {
            request = request.header(AUTHORIZATION, value);
        }

        let transport = |source| BenchError::Transport {
            url: url.to_string(),
            source,
        };
        let response = request.send().map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(BenchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().map_err(transport)?;
        let duration = timer.stop();

        debug!(%url, status = status.as_u16(), bytes = body.len(), duration, "probe succeeded");
        Ok((duration, status.as_u16()))
    }
}
