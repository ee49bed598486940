use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nmap_batch_rs::logger::{LogFormat, ResultLogger};
use nmap_batch_rs::sink::MemorySink;
use nmap_batch_rs::types::PortRecord;
use nmap_batch_rs::{
    DispatchError, ScanClient, ScanDispatcher, ScanEngine, ScanError, ScanRequest, ScanResult,
};
use tokio_util::sync::CancellationToken;

/// Fake nmap: sleeps, then fails for targets listed in `failing`, panics for
/// targets listed in `panicking`, and reports port 22 open otherwise.
#[derive(Default)]
struct FakeEngine {
    delay: Duration,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    calls: AtomicUsize,
    running: AtomicUsize,
    finished: AtomicUsize,
    peak: AtomicUsize,
    seen_args: Mutex<Vec<String>>,
}

impl FakeEngine {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn failing(mut self, target: &str) -> Self {
        self.failing.insert(target.to_string());
        self
    }

    fn panicking(mut self, target: &str) -> Self {
        self.panicking.insert(target.to_string());
        self
    }
}

/// Decrements the in-flight count however the scan future ends, abort included.
struct Running<'a>(&'a AtomicUsize);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScanEngine for FakeEngine {
    async fn run(&self, request: &ScanRequest) -> Result<ScanResult, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        let _running = Running(&self.running);
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Ok(mut a) = self.seen_args.lock() {
            a.push(format!("{} {}", request.port_range, request.arguments));
        }

        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);

        if self.panicking.contains(&request.target) {
            panic!("engine crashed on {}", request.target);
        }
        if self.failing.contains(&request.target) {
            return Err(ScanError::NoData(request.target.clone()));
        }
        Ok(ScanResult {
            address: Some(request.target.clone()),
            status: Some("up".to_string()),
            ports: vec![PortRecord {
                port: 22,
                protocol: "tcp".to_string(),
                state: "open".to_string(),
                name: "ssh".to_string(),
                product: "OpenSSH".to_string(),
                version: "9.6".to_string(),
            }],
            ..ScanResult::default()
        })
    }
}

fn dispatcher(engine: Arc<FakeEngine>) -> ScanDispatcher {
    ScanDispatcher::new(
        ScanClient::new(engine)
            .with_arguments("-D RND:10 -f -T1")
            .with_sink(MemorySink::new()),
    )
}

fn targets(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn key_set_equals_requested_targets() {
    let engine = Arc::new(FakeEngine::default().failing("10.0.0.2"));
    let batch = dispatcher(engine)
        .dispatch_all(&targets(&["10.0.0.1", "10.0.0.2"]), "1-1024")
        .await;

    assert_eq!(
        batch.keys().cloned().collect::<Vec<_>>(),
        vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]
    );
}

#[tokio::test]
async fn one_failure_does_not_affect_the_other() {
    let engine = Arc::new(FakeEngine::default().failing("10.0.0.2"));
    let batch = dispatcher(engine)
        .dispatch_all(&targets(&["10.0.0.1", "10.0.0.2"]), "1-1024")
        .await;

    let ok = batch["10.0.0.1"].as_ref().expect("10.0.0.1 should succeed");
    assert_eq!(ok.address.as_deref(), Some("10.0.0.1"));
    assert_eq!(ok.ports[0].port, 22);
    assert!(batch["10.0.0.2"].is_none());
}

#[tokio::test]
async fn panicking_task_is_isolated() {
    let engine = Arc::new(FakeEngine::default().panicking("10.0.0.3"));
    let batch = dispatcher(engine)
        .dispatch_all(&targets(&["10.0.0.1", "10.0.0.3"]), "80")
        .await;

    assert_eq!(batch.len(), 2);
    assert!(batch["10.0.0.1"].is_some());
    assert!(batch["10.0.0.3"].is_none());
}

#[tokio::test]
async fn zero_targets_spawn_nothing() {
    let engine = Arc::new(FakeEngine::default());
    let batch = dispatcher(engine.clone()).dispatch_all(&[], "1-1024").await;

    assert!(batch.is_empty());
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scans_run_side_by_side() {
    let engine = Arc::new(FakeEngine::with_delay(Duration::from_millis(300)));
    let list = targets(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5"]);

    let start = Instant::now();
    let batch = dispatcher(engine.clone()).dispatch_all(&list, "1-1024").await;
    let elapsed = start.elapsed();

    assert_eq!(batch.len(), 5);
    assert!(batch.values().all(Option::is_some));
    assert_eq!(engine.peak.load(Ordering::SeqCst), 5);
    assert!(elapsed < Duration::from_millis(1200), "took {elapsed:?}");
}

#[tokio::test]
async fn concurrency_cap_is_respected() {
    let engine = Arc::new(FakeEngine::with_delay(Duration::from_millis(50)));
    let list = targets(&["a", "b", "c", "d", "e", "f"]);

    let batch = dispatcher(engine.clone())
        .with_max_concurrency(Some(2))
        .dispatch_all(&list, "22")
        .await;

    assert_eq!(batch.len(), 6);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 6);
    assert!(engine.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn every_scan_gets_port_range_and_arguments() {
    let engine = Arc::new(FakeEngine::default());
    dispatcher(engine.clone())
        .dispatch_all(&targets(&["10.0.0.1", "10.0.0.2"]), "22,80")
        .await;

    let seen = engine.seen_args.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|s| s == "22,80 -D RND:10 -f -T1"));
}

#[tokio::test]
async fn cancellation_abandons_in_flight_scans() {
    let engine = Arc::new(FakeEngine::with_delay(Duration::from_secs(30)));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let res = dispatcher(engine.clone())
        .dispatch_all_with_cancel(&targets(&["10.0.0.1", "10.0.0.2"]), "1-1024", cancel)
        .await;

    assert_eq!(res.unwrap_err(), DispatchError::Cancelled);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(engine.calls.load(Ordering::SeqCst), 2);

    // Aborted tasks are dropped the next time the runtime gets to them.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.running.load(Ordering::SeqCst), 0);
    assert_eq!(engine.finished.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelled_batch_writes_no_logs() {
    let engine = Arc::new(FakeEngine::with_delay(Duration::from_secs(30)));
    let tmp = tempfile::tempdir().unwrap();
    let log_dir = tmp.path().join("logs");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    // Same order as the binary: logs are only opened for a finished batch.
    let outcome = match dispatcher(engine.clone())
        .dispatch_all_with_cancel(&targets(&["10.0.0.1", "10.0.0.2"]), "1-1024", cancel)
        .await
    {
        Ok(batch) => {
            let logger = ResultLogger::new(&log_dir).unwrap();
            Ok(logger.log_batch(&batch, &[LogFormat::Json], true).unwrap())
        }
        Err(e) => Err(e),
    };

    assert_eq!(outcome.unwrap_err(), DispatchError::Cancelled);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.finished.load(Ordering::SeqCst), 0);
    assert!(!log_dir.exists());
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn uncancelled_token_returns_full_batch() {
    let engine = Arc::new(FakeEngine::default());
    let batch = dispatcher(engine)
        .dispatch_all_with_cancel(&targets(&["10.0.0.1"]), "1-1024", CancellationToken::new())
        .await
        .unwrap();
    assert!(batch["10.0.0.1"].is_some());
}
