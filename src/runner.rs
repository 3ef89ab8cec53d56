use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use indicatif::ProgressBar;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::{watch, Semaphore};
use tokio::task;
use tokio::time::Instant;
use tracing::{error, info};

use crate::bruteforcer::{CancelSignal, TargetResultSet, TargetScanner};
use crate::http::{Clock, HttpClient, ReqwestHttpClient, TokioClock};
use crate::output::{ReportError, ReportSink};
use crate::probe::ProbeExecutor;
use crate::utils;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_THREADS_PER_TARGET: usize = 5;
const MAX_REDIRECTS: usize = 10;

pub fn default_process_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Settings shared by every component of one run. Built once, never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanSession {
    pub timeout_seconds: u64,
    pub threads_per_target: usize,
    pub process_count: usize,
    pub proxy: Option<String>,
    pub verbose: bool,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            threads_per_target: DEFAULT_THREADS_PER_TARGET,
            process_count: default_process_count(),
            proxy: None,
            verbose: false,
        }
    }
}

impl ScanSession {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.timeout_seconds == 0 {
            return Err(RunnerError::InvalidSession {
                message: "timeout must be at least 1 second".to_string(),
            });
        }
        if self.threads_per_target == 0 {
            return Err(RunnerError::InvalidSession {
                message: "threads per target must be at least 1".to_string(),
            });
        }
        if self.process_count == 0 {
            return Err(RunnerError::InvalidSession {
                message: "process count must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

// a normalized base url (scheme://host:port[/path]) with no trailing slash
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScanTarget(String);

impl ScanTarget {
    pub fn parse(url: &str) -> Result<Self, RunnerError> {
        let trimmed = url.trim().trim_end_matches('/');
        let parsed = reqwest::Url::parse(trimmed).map_err(|_| RunnerError::InvalidUrl {
            url: url.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(RunnerError::InvalidUrl {
                url: url.to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn host(&self) -> Option<String> {
        reqwest::Url::parse(&self.0)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
    }

    pub fn port(&self) -> Option<u16> {
        reqwest::Url::parse(&self.0)
            .ok()
            .and_then(|u| u.port_or_known_default())
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug)]
pub enum TargetSource {
    Urls(Vec<String>),
    FilePath(String),
}

#[derive(Clone, Debug)]
pub enum WordlistSource {
    FilePath(String),
    Inline(Vec<String>),
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no targets provided")]
    NoTargets,

    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("wordlist is empty")]
    EmptyWordlist,

    #[error("invalid scan settings: {message}")]
    InvalidSession { message: String },

    #[error("failed to open file for {kind}: {path}: {source}")]
    FileOpen {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read lines for {kind}: {path}: {source}")]
    FileRead {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to setup proxy: {proxy}: {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },
}

// why a single target produced no report; other targets are unaffected
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("report write failed: {0}")]
    Report(#[from] ReportError),

    #[error("scan task failed: {source}")]
    TaskJoin {
        #[source]
        source: task::JoinError,
    },
}

#[derive(Debug)]
pub struct ScanSummary {
    pub elapsed: Duration,
    pub results: HashMap<ScanTarget, TargetResultSet>,
    pub failures: Vec<(ScanTarget, TargetError)>,
}

impl ScanSummary {
    pub fn probes(&self) -> usize {
        self.results.values().map(|r| r.len()).sum()
    }

    pub fn cancelled(&self) -> bool {
        self.results.values().any(|r| !r.is_complete())
    }
}

/// Runs one [`TargetScanner`] per target, at most `process_count` at a time.
///
/// Each target gets its own queue, worker pool and accumulator; the only
/// thing the scans share is the read-only wordlist and the stateless client.
pub struct ScanOrchestrator {
    session: ScanSession,
    client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    pb: ProgressBar,
    cancel: CancelSignal,
}

impl ScanOrchestrator {
    pub fn new(session: ScanSession, client: Arc<dyn HttpClient>) -> Self {
        // nobody holds the sender, so this signal is never raised
        let (_, cancel) = watch::channel(false);
        Self {
            session,
            client,
            clock: Arc::new(TokioClock),
            pb: ProgressBar::hidden(),
            cancel,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    pub async fn run(
        &self,
        targets: &[ScanTarget],
        wordlist: &[String],
        sink: &mut dyn ReportSink,
    ) -> ScanSummary {
        let started_at = Instant::now();
        let wordlist: Arc<[String]> = Arc::from(wordlist.to_vec());
        let limiter = Arc::new(Semaphore::new(self.session.process_count.max(1)));

        let mut seen: HashSet<&ScanTarget> = HashSet::new();
        let mut scans = FuturesUnordered::new();
        for target in targets.iter().filter(|t| seen.insert(*t)) {
            let executor = Arc::new(ProbeExecutor::new(
                self.client.clone(),
                self.clock.clone(),
                &self.session,
                self.pb.clone(),
            ));
            let scanner = TargetScanner::new(
                target.clone(),
                executor,
                &self.session,
                self.cancel.clone(),
            );
            let limiter = limiter.clone();
            let wordlist = wordlist.clone();
            let handle = task::spawn(async move {
                let _permit = limiter.acquire_owned().await.ok();
                scanner.scan(wordlist).await
            });
            let target = target.clone();
            scans.push(async move { (target, handle.await) });
        }

        let mut results: HashMap<ScanTarget, TargetResultSet> = HashMap::new();
        let mut failures: Vec<(ScanTarget, TargetError)> = Vec::new();
        while let Some((target, joined)) = scans.next().await {
            let result_set = match joined {
                Ok(result_set) => result_set,
                Err(e) => {
                    error!(url = %target, error = %e, "target scan aborted");
                    failures.push((target, TargetError::TaskJoin { source: e }));
                    continue;
                }
            };
            if let Err(e) = sink.write(&result_set).await {
                error!(url = %target, error = %e, "failed to write report");
                failures.push((target.clone(), TargetError::Report(e)));
            }
            results.insert(target, result_set);
        }

        let elapsed = started_at.elapsed();
        sink.finish(elapsed).await;
        info!(
            targets = results.len(),
            failures = failures.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "scan completed"
        );
        ScanSummary {
            elapsed,
            results,
            failures,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Options {
    pub targets: TargetSource,
    pub wordlist: WordlistSource,
    pub session: ScanSession,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            targets: TargetSource::Urls(Vec::new()),
            wordlist: WordlistSource::Inline(Vec::new()),
            session: ScanSession::default(),
        }
    }
}

/// Loads targets and wordlist, builds the HTTP client, and drives a
/// [`ScanOrchestrator`]. Every error it returns happens before any probe is sent.
#[derive(Clone, Debug)]
pub struct Runner {
    options: Options,
    pb: ProgressBar,
    cancel: Option<CancelSignal>,
}

impl Runner {
    pub fn new(options: Options) -> Result<Self, RunnerError> {
        if let TargetSource::Urls(urls) = &options.targets {
            if urls.iter().all(|u| u.trim().is_empty()) {
                return Err(RunnerError::NoTargets);
            }
        }
        options.session.validate()?;
        Ok(Self {
            options,
            pb: ProgressBar::hidden(),
            cancel: None,
        })
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub async fn prepare(&self) -> Result<(Vec<ScanTarget>, Vec<String>), RunnerError> {
        let targets = load_targets(&self.options.targets).await?;
        let wordlist = load_wordlist(&self.options.wordlist).await?;
        Ok((targets, wordlist))
    }

    pub async fn run(&self, sink: &mut dyn ReportSink) -> Result<ScanSummary, RunnerError> {
        let (targets, wordlist) = self.prepare().await?;
        self.run_prepared(&targets, &wordlist, sink).await
    }

    pub async fn run_prepared(
        &self,
        targets: &[ScanTarget],
        wordlist: &[String],
        sink: &mut dyn ReportSink,
    ) -> Result<ScanSummary, RunnerError> {
        let client = build_http_client(&self.options.session)?;
        self.pb.set_length((targets.len() * wordlist.len()) as u64);

        let mut orchestrator =
            ScanOrchestrator::new(self.options.session.clone(), Arc::new(client))
                .with_progress(self.pb.clone());
        if let Some(cancel) = self.cancel.clone() {
            orchestrator = orchestrator.with_cancel(cancel);
        }
        Ok(orchestrator.run(targets, wordlist, sink).await)
    }
}

pub fn build_http_client(session: &ScanSession) -> Result<ReqwestHttpClient, RunnerError> {
    let mut builder = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(session.timeout())
        .danger_accept_invalid_hostnames(true)
        .danger_accept_invalid_certs(true);

    if let Some(proxy) = session.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
        let proxy = reqwest::Proxy::all(proxy).map_err(|e| RunnerError::ProxySetup {
            proxy: proxy.to_string(),
            source: e,
        })?;
        builder = builder.proxy(proxy);
    }

    let client = builder
        .build()
        .map_err(|e| RunnerError::HttpClientBuild { source: e })?;
    Ok(ReqwestHttpClient::new(client))
}

async fn read_lines(kind: &'static str, path: &str) -> Result<Vec<String>, RunnerError> {
    let path = crate::config::expand_tilde_string(path);
    let handle = File::open(&path).await.map_err(|e| RunnerError::FileOpen {
        kind,
        path: path.clone(),
        source: e,
    })?;
    let mut out = Vec::new();
    let mut lines = BufReader::new(handle).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => out.push(line),
            Ok(None) => break,
            Err(e) => {
                return Err(RunnerError::FileRead {
                    kind,
                    path,
                    source: e,
                })
            }
        }
    }
    Ok(out)
}

pub async fn load_targets(source: &TargetSource) -> Result<Vec<ScanTarget>, RunnerError> {
    let raw = match source {
        TargetSource::Urls(urls) => urls.clone(),
        TargetSource::FilePath(path) => read_lines("url_file", path).await?,
    };

    let targets = utils::normalize_targets(&raw)
        .iter()
        .map(|u| ScanTarget::parse(u))
        .collect::<Result<Vec<_>, _>>()?;
    if targets.is_empty() {
        return Err(RunnerError::NoTargets);
    }
    Ok(targets)
}

pub async fn load_wordlist(source: &WordlistSource) -> Result<Vec<String>, RunnerError> {
    let words = match source {
        WordlistSource::Inline(values) => utils::clean_wordlist(values),
        WordlistSource::FilePath(path) => utils::clean_wordlist(read_lines("wordlist", path).await?),
    };
    if words.is_empty() {
        return Err(RunnerError::EmptyWordlist);
    }
    Ok(words)
}
