use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use indicatif::ProgressBar;
use thiserror::Error;
use tracing::warn;

use crate::agent;
use crate::http::{Clock, HttpClient, HttpRequest, TransportError};
use crate::runner::ScanSession;
use crate::utils;

/// Fixed pause between the first failed attempt and the single retry.
pub const RETRY_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("transport failure: {cause}")]
    TransportFailure { cause: TransportError },
}

// either the response metadata or the terminal error, never both
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeResult {
    Response {
        status: u16,
        body_length: u64,
        redirect_url: Option<String>,
    },
    Failed(ErrorKind),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub request_url: String,
    pub result: ProbeResult,
}

impl ProbeOutcome {
    pub fn status_code(&self) -> Option<u16> {
        match &self.result {
            ProbeResult::Response { status, .. } => Some(*status),
            ProbeResult::Failed(_) => None,
        }
    }

    pub fn body_length(&self) -> Option<u64> {
        match &self.result {
            ProbeResult::Response { body_length, .. } => Some(*body_length),
            ProbeResult::Failed(_) => None,
        }
    }

    pub fn redirect_url(&self) -> Option<&str> {
        match &self.result {
            ProbeResult::Response { redirect_url, .. } => redirect_url.as_deref(),
            ProbeResult::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorKind> {
        match &self.result {
            ProbeResult::Response { .. } => None,
            ProbeResult::Failed(e) => Some(e),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error().is_some()
    }
}

// `status : url : length : redirect` with the redirect cut down for the console
impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            ProbeResult::Response {
                status,
                body_length,
                redirect_url,
            } => write!(
                f,
                "{} : {} : {} : {}",
                status,
                self.request_url,
                body_length,
                utils::truncate_redirect(redirect_url.as_deref().unwrap_or_default())
            ),
            ProbeResult::Failed(e) => write!(f, "ERR : {} : : {}", self.request_url, e),
        }
    }
}

#[derive(Clone, Copy)]
enum Attempt {
    First,
    Retry,
}

/// Runs one probe: GET, and on a transport failure one cooldown and one retry.
pub struct ProbeExecutor {
    client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    verbose: bool,
    pb: ProgressBar,
}

impl ProbeExecutor {
    pub fn new(
        client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        session: &ScanSession,
        pb: ProgressBar,
    ) -> Self {
        Self {
            client,
            clock,
            timeout: session.timeout(),
            verbose: session.verbose,
            pb,
        }
    }

    pub async fn probe(&self, request_url: &str) -> ProbeOutcome {
        let mut attempt = Attempt::First;
        let result = loop {
            let request = HttpRequest {
                url: request_url,
                user_agent: agent::select(),
                timeout: self.timeout,
            };
            match (self.client.get(request).await, attempt) {
                (Ok(resp), _) => {
                    break ProbeResult::Response {
                        status: resp.status,
                        body_length: resp.body_length,
                        redirect_url: utils::redirect_target(request_url, &resp.final_url),
                    }
                }
                (Err(e), Attempt::First) => {
                    warn!(
                        url = request_url,
                        error = %e,
                        "network connectivity issues, waiting {}s before retrying",
                        RETRY_COOLDOWN.as_secs()
                    );
                    self.clock.sleep(RETRY_COOLDOWN).await;
                    attempt = Attempt::Retry;
                }
                (Err(e), Attempt::Retry) => {
                    warn!(url = request_url, error = %e, "request failed after retry, giving up");
                    break ProbeResult::Failed(ErrorKind::TransportFailure { cause: e });
                }
            }
        };

        let outcome = ProbeOutcome {
            request_url: request_url.to_string(),
            result,
        };
        self.pb.inc(1);
        if self.verbose {
            self.pb.println(render_verbose(&outcome));
        }
        outcome
    }
}

fn render_verbose(outcome: &ProbeOutcome) -> String {
    let line = outcome.to_string();
    match outcome.status_code() {
        Some(200..=299) => line.bold().green().to_string(),
        Some(300..=399) => line.bold().cyan().to_string(),
        Some(_) => line.white().to_string(),
        None => line.bold().red().to_string(),
    }
}
