use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use indicatif::ProgressBar;
use tokio::sync::watch;

use crate::bruteforcer::TargetResultSet;
use crate::http::{Clock, HttpClient, HttpRequest, HttpResponse, TransportError};
use crate::output::{MemorySink, ReportError, ReportSink};
use crate::probe::{ErrorKind, ProbeExecutor, ProbeOutcome, ProbeResult, RETRY_COOLDOWN};
use crate::runner::{ScanOrchestrator, ScanSession, ScanTarget, TargetError};

#[derive(Clone)]
struct Reply {
    status: u16,
    body_length: u64,
    final_url: Option<String>,
}

fn reply(status: u16, body_length: u64) -> Reply {
    Reply {
        status,
        body_length,
        final_url: None,
    }
}

// unknown urls answer 404 with an empty body
#[derive(Default)]
struct MockClient {
    replies: HashMap<String, Reply>,
    failing: HashSet<String>,
    failing_hosts: HashSet<String>,
    fail_once: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockClient {
    fn with_reply(mut self, url: &str, reply: Reply) -> Self {
        self.replies.insert(url.to_string(), reply);
        self
    }

    fn with_failure(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    fn with_failing_host(mut self, host: &str) -> Self {
        self.failing_hosts.insert(host.to_string());
        self
    }

    fn with_transient_failure(self, url: &str) -> Self {
        self.fail_once.lock().unwrap().insert(url.to_string());
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for MockClient {
    async fn get(&self, request: HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        let url = request.url.to_string();
        assert!(crate::agent::USER_AGENTS.contains(&request.user_agent));
        self.calls.lock().unwrap().push(url.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let host = reqwest::Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default();
        if self.failing.contains(&url) || self.failing_hosts.contains(&host) {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        if self.fail_once.lock().unwrap().remove(&url) {
            return Err(TransportError::Timeout);
        }

        let reply = self.replies.get(&url).cloned().unwrap_or_else(|| reply(404, 0));
        Ok(HttpResponse {
            status: reply.status,
            body_length: reply.body_length,
            final_url: reply.final_url.unwrap_or(url),
        })
    }
}

// records every cooldown and returns immediately
#[derive(Default)]
struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

struct FailingSink {
    fail_host: String,
    written: Vec<ScanTarget>,
}

#[async_trait]
impl ReportSink for FailingSink {
    async fn write(&mut self, results: &TargetResultSet) -> Result<(), ReportError> {
        if results.target.host().as_deref() == Some(self.fail_host.as_str()) {
            return Err(ReportError::Write {
                path: format!("{}.csv", self.fail_host).into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        self.written.push(results.target.clone());
        Ok(())
    }
}

fn session(threads_per_target: usize, process_count: usize) -> ScanSession {
    ScanSession {
        timeout_seconds: 1,
        threads_per_target,
        process_count,
        proxy: None,
        verbose: false,
    }
}

fn target(url: &str) -> ScanTarget {
    ScanTarget::parse(url).unwrap()
}

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|w| w.to_string()).collect()
}

fn numbered_words(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("dir{i}")).collect()
}

fn orchestrator(
    session: ScanSession,
    client: &Arc<MockClient>,
    clock: &Arc<RecordingClock>,
) -> ScanOrchestrator {
    let client: Arc<dyn HttpClient> = client.clone();
    let clock: Arc<dyn Clock> = clock.clone();
    ScanOrchestrator::new(session, client).with_clock(clock)
}

fn outcome_for<'a>(results: &'a TargetResultSet, url: &str) -> &'a ProbeOutcome {
    results
        .outcomes
        .iter()
        .find(|o| o.request_url == url)
        .unwrap()
}

fn request_urls(results: &TargetResultSet) -> HashSet<String> {
    results
        .outcomes
        .iter()
        .map(|o| o.request_url.clone())
        .collect()
}

#[tokio::test]
async fn every_segment_is_probed_exactly_once() {
    let client = Arc::new(MockClient::default());
    let clock = Arc::new(RecordingClock::default());
    let wordlist = numbered_words(40);
    let base = target("http://example.com:80");

    let mut sink = MemorySink::default();
    let summary = orchestrator(session(4, 2), &client, &clock)
        .run(&[base.clone()], &wordlist, &mut sink)
        .await;

    let results = &summary.results[&base];
    assert_eq!(results.len(), wordlist.len());
    assert!(results.is_complete());
    let expected: HashSet<String> = wordlist
        .iter()
        .map(|w| format!("http://example.com:80/{w}"))
        .collect();
    assert_eq!(request_urls(results), expected);
    assert_eq!(client.total_calls(), wordlist.len());
    assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn repeated_scans_yield_the_same_outcome_set() {
    let client = Arc::new(
        MockClient::default()
            .with_reply("http://example.com:80/dir3", reply(200, 42))
            .with_delay(Duration::from_millis(1)),
    );
    let clock = Arc::new(RecordingClock::default());
    let wordlist = numbered_words(15);
    let base = target("http://example.com:80");
    let orch = orchestrator(session(3, 1), &client, &clock);

    let first = orch
        .run(&[base.clone()], &wordlist, &mut MemorySink::default())
        .await;
    let second = orch
        .run(&[base.clone()], &wordlist, &mut MemorySink::default())
        .await;

    let as_set = |r: &TargetResultSet| -> HashSet<String> {
        r.outcomes.iter().map(|o| o.to_string()).collect()
    };
    assert_eq!(as_set(&first.results[&base]), as_set(&second.results[&base]));
}

#[tokio::test]
async fn transient_failure_is_retried_once_after_cooldown() {
    let client = Arc::new(
        MockClient::default()
            .with_reply("http://example.com:80/login", reply(200, 512))
            .with_transient_failure("http://example.com:80/login"),
    );
    let clock = Arc::new(RecordingClock::default());
    let base = target("http://example.com:80");

    let summary = orchestrator(session(2, 1), &client, &clock)
        .run(
            &[base.clone()],
            &words(&["login", "admin"]),
            &mut MemorySink::default(),
        )
        .await;

    let login = outcome_for(&summary.results[&base], "http://example.com:80/login");
    assert_eq!(login.status_code(), Some(200));
    assert_eq!(login.body_length(), Some(512));
    assert_eq!(client.calls_for("http://example.com:80/login"), 2);
    assert_eq!(client.calls_for("http://example.com:80/admin"), 1);
    assert_eq!(clock.sleeps(), vec![RETRY_COOLDOWN]);
}

#[tokio::test]
async fn persistent_failure_yields_one_failed_outcome() {
    let client = Arc::new(MockClient::default().with_failure("http://example.com:80/backup"));
    let clock = Arc::new(RecordingClock::default());
    let base = target("http://example.com:80");

    let summary = orchestrator(session(1, 1), &client, &clock)
        .run(&[base.clone()], &words(&["backup"]), &mut MemorySink::default())
        .await;

    let results = &summary.results[&base];
    assert_eq!(results.len(), 1);
    assert_eq!(results.failures(), 1);
    let backup = outcome_for(results, "http://example.com:80/backup");
    assert_eq!(
        backup.result,
        ProbeResult::Failed(ErrorKind::TransportFailure {
            cause: TransportError::Connect("connection refused".to_string()),
        })
    );
    assert_eq!(client.calls_for("http://example.com:80/backup"), 2);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(30)]);
}

#[tokio::test]
async fn redirect_is_recorded_only_when_final_url_differs() {
    let client = Arc::new(
        MockClient::default()
            .with_reply(
                "http://example.com:80/admin",
                Reply {
                    status: 200,
                    body_length: 900,
                    final_url: Some("http://example.com/admin/login".to_string()),
                },
            )
            .with_reply(
                "http://example.com:80/docs",
                Reply {
                    status: 200,
                    body_length: 100,
                    final_url: Some("http://example.com/docs/".to_string()),
                },
            ),
    );
    let clock = Arc::new(RecordingClock::default());
    let base = target("http://example.com:80");

    let summary = orchestrator(session(2, 1), &client, &clock)
        .run(
            &[base.clone()],
            &words(&["admin", "docs", "missing"]),
            &mut MemorySink::default(),
        )
        .await;

    let results = &summary.results[&base];
    assert_eq!(
        outcome_for(results, "http://example.com:80/admin").redirect_url(),
        Some("http://example.com/admin/login")
    );
    assert_eq!(
        outcome_for(results, "http://example.com:80/docs").redirect_url(),
        None
    );
    assert_eq!(
        outcome_for(results, "http://example.com:80/missing").redirect_url(),
        None
    );
}

#[tokio::test]
async fn executor_compares_final_url_without_trailing_slash() {
    let moved = Arc::new(MockClient::default().with_reply(
        "http://a/x",
        Reply {
            status: 200,
            body_length: 10,
            final_url: Some("http://a/y".to_string()),
        },
    ));
    let slashed = Arc::new(MockClient::default().with_reply(
        "http://a/x",
        Reply {
            status: 200,
            body_length: 10,
            final_url: Some("http://a/x/".to_string()),
        },
    ));
    let clock: Arc<dyn Clock> = Arc::new(RecordingClock::default());

    let executor = ProbeExecutor::new(moved, clock.clone(), &session(1, 1), ProgressBar::hidden());
    assert_eq!(
        executor.probe("http://a/x").await.redirect_url(),
        Some("http://a/y")
    );

    let executor = ProbeExecutor::new(slashed, clock, &session(1, 1), ProgressBar::hidden());
    assert_eq!(executor.probe("http://a/x").await.redirect_url(), None);
}

#[tokio::test]
async fn in_flight_probes_never_exceed_worker_count() {
    let client = Arc::new(MockClient::default().with_delay(Duration::from_millis(10)));
    let clock = Arc::new(RecordingClock::default());
    let base = target("http://example.com:80");

    let summary = orchestrator(session(3, 1), &client, &clock)
        .run(&[base.clone()], &numbered_words(30), &mut MemorySink::default())
        .await;

    assert_eq!(summary.results[&base].len(), 30);
    assert!(client.max_in_flight() <= 3);
    assert!(client.max_in_flight() >= 2);
}

#[tokio::test]
async fn process_count_bounds_parallel_targets() {
    let client = Arc::new(MockClient::default().with_delay(Duration::from_millis(5)));
    let clock = Arc::new(RecordingClock::default());
    let targets = vec![
        target("http://a.example.com:80"),
        target("http://b.example.com:80"),
        target("http://c.example.com:80"),
    ];

    let summary = orchestrator(session(2, 1), &client, &clock)
        .run(&targets, &numbered_words(10), &mut MemorySink::default())
        .await;

    assert_eq!(summary.results.len(), 3);
    assert_eq!(summary.probes(), 30);
    assert!(client.max_in_flight() <= 2);
}

#[tokio::test]
async fn end_to_end_single_target() {
    let client = Arc::new(
        MockClient::default()
            .with_reply("http://example.com:80/login", reply(200, 120)),
    );
    let clock = Arc::new(RecordingClock::default());
    let base = target("http://example.com:80");

    let mut sink = MemorySink::default();
    let summary = orchestrator(session(5, 2), &client, &clock)
        .run(
            &[base.clone()],
            &words(&["admin", "login", "backup"]),
            &mut sink,
        )
        .await;

    assert_eq!(sink.results.len(), 1);
    assert!(sink.elapsed.is_some());
    let results = &sink.results[0];
    assert_eq!(results.target, base);
    assert_eq!(results.len(), 3);
    let ok: Vec<&ProbeOutcome> = results
        .outcomes
        .iter()
        .filter(|o| o.status_code() == Some(200))
        .collect();
    assert_eq!(ok.len(), 1);
    assert_eq!(ok[0].request_url, "http://example.com:80/login");
    assert_eq!(ok[0].body_length(), Some(120));
    assert_eq!(
        outcome_for(results, "http://example.com:80/backup").status_code(),
        Some(404)
    );
    assert!(summary.failures.is_empty());
    assert!(!summary.cancelled());
}

#[tokio::test]
async fn failing_target_does_not_affect_others() {
    let client = Arc::new(MockClient::default().with_failing_host("down.example.com"));
    let clock = Arc::new(RecordingClock::default());
    let up = target("http://up.example.com:80");
    let down = target("http://down.example.com:80");

    let mut sink = MemorySink::default();
    let summary = orchestrator(session(2, 2), &client, &clock)
        .run(
            &[up.clone(), down.clone()],
            &words(&["admin", "login"]),
            &mut sink,
        )
        .await;

    assert_eq!(sink.results.len(), 2);
    let up_results = &summary.results[&up];
    assert_eq!(up_results.len(), 2);
    assert_eq!(up_results.failures(), 0);
    let down_results = &summary.results[&down];
    assert_eq!(down_results.len(), 2);
    assert_eq!(down_results.failures(), 2);
    // one cooldown per failed segment, none for the healthy target
    assert_eq!(clock.sleeps().len(), 2);
}

#[tokio::test]
async fn duplicate_targets_are_scanned_once() {
    let client = Arc::new(MockClient::default());
    let clock = Arc::new(RecordingClock::default());
    let base = target("http://example.com:80");

    let mut sink = MemorySink::default();
    let summary = orchestrator(session(2, 2), &client, &clock)
        .run(
            &[base.clone(), base.clone()],
            &words(&["admin"]),
            &mut sink,
        )
        .await;

    assert_eq!(sink.results.len(), 1);
    assert_eq!(summary.results.len(), 1);
    assert_eq!(client.total_calls(), 1);
}

#[tokio::test]
async fn report_failure_is_isolated_to_its_target() {
    let client = Arc::new(MockClient::default());
    let clock = Arc::new(RecordingClock::default());
    let good = target("http://good.example.com:80");
    let bad = target("http://bad.example.com:80");

    let mut sink = FailingSink {
        fail_host: "bad.example.com".to_string(),
        written: Vec::new(),
    };
    let summary = orchestrator(session(2, 2), &client, &clock)
        .run(&[good.clone(), bad.clone()], &words(&["admin"]), &mut sink)
        .await;

    assert_eq!(sink.written, vec![good]);
    assert_eq!(summary.results.len(), 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].0, bad);
}

#[tokio::test]
async fn cancellation_reports_partial_results() {
    let client = Arc::new(MockClient::default().with_delay(Duration::from_millis(20)));
    let clock = Arc::new(RecordingClock::default());
    let base = target("http://example.com:80");
    let wordlist = numbered_words(200);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let orch = orchestrator(session(2, 1), &client, &clock).with_cancel(cancel_rx);

    let mut sink = MemorySink::default();
    let bases = [base.clone()];
    let (summary, _) = tokio::join!(orch.run(&bases, &wordlist, &mut sink), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel_tx.send(true).unwrap();
    });

    assert!(summary.cancelled());
    assert_eq!(sink.results.len(), 1);
    let results = &summary.results[&base];
    assert!(results.abandoned > 0);
    assert!(!results.is_complete());
    assert_eq!(results.len() + results.abandoned, wordlist.len());
    assert!(client.total_calls() < wordlist.len());
}

// panics on one exact url, answers 200 otherwise
struct PanickingClient {
    trigger: &'static str,
}

#[async_trait]
impl HttpClient for PanickingClient {
    async fn get(&self, request: HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        if request.url == self.trigger {
            panic!("client blew up on {}", request.url);
        }
        Ok(HttpResponse {
            status: 200,
            body_length: 1,
            final_url: request.url.to_string(),
        })
    }
}

fn panicking_orchestrator(session: ScanSession, trigger: &'static str) -> ScanOrchestrator {
    let client: Arc<dyn HttpClient> = Arc::new(PanickingClient { trigger });
    let clock: Arc<dyn Clock> = Arc::new(RecordingClock::default());
    ScanOrchestrator::new(session, client).with_clock(clock)
}

#[tokio::test]
async fn worker_panic_fails_the_target_instead_of_hanging() {
    let orch = panicking_orchestrator(session(1, 2), "http://example.com:80/boom");
    let base = target("http://example.com:80");

    let mut sink = MemorySink::default();
    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        orch.run(&[base.clone()], &words(&["a", "boom", "b"]), &mut sink),
    )
    .await
    .expect("scan did not finish after a worker panicked");

    assert!(sink.results.is_empty());
    assert!(sink.elapsed.is_some());
    assert!(summary.results.is_empty());
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].0, base);
    assert!(matches!(
        &summary.failures[0].1,
        TargetError::TaskJoin { source } if source.is_panic()
    ));
}

#[tokio::test]
async fn worker_panic_leaves_other_targets_untouched() {
    let orch = panicking_orchestrator(session(3, 2), "http://broken.example.com:80/boom");
    let healthy = target("http://healthy.example.com:80");
    let broken = target("http://broken.example.com:80");

    let mut sink = MemorySink::default();
    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        orch.run(
            &[healthy.clone(), broken.clone()],
            &words(&["a", "boom", "b", "c"]),
            &mut sink,
        ),
    )
    .await
    .expect("scan did not finish after a worker panicked");

    assert_eq!(sink.results.len(), 1);
    assert_eq!(sink.results[0].target, healthy);
    assert_eq!(summary.results[&healthy].len(), 4);
    assert!(summary.results[&healthy].is_complete());
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].0, broken);
}
