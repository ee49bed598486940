use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::client::ScanClient;
use crate::error::DispatchError;
use crate::sink::Level;
use crate::types::{ScanBatchResult, ScanRequest};

/// Fans a [`ScanClient`] out over many targets at once.
///
/// By default every target gets its own task immediately, so a batch of N
/// targets starts N nmap processes. That is fine for a handful of hosts and a
/// resource problem for hundreds; set [`with_max_concurrency`] to cap it.
///
/// [`with_max_concurrency`]: ScanDispatcher::with_max_concurrency
#[derive(Clone)]
pub struct ScanDispatcher {
    client: ScanClient,
    max_concurrency: Option<usize>,
}

impl ScanDispatcher {
    pub fn new(client: ScanClient) -> Self {
        Self {
            client,
            max_concurrency: None,
        }
    }

    /// `None` means unbounded. `Some(0)` is treated as `Some(1)`.
    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit.map(|n| n.max(1));
        self
    }

    /// Scan every target concurrently and wait for all of them.
    ///
    /// - Blank targets are dropped; duplicates are not merged before scanning.
    /// - The returned map has exactly one key per distinct remaining target.
    ///   `None` marks a failed scan, including a scan task that panicked.
    /// - A duplicated target keeps a successful result over a failed one.
    pub async fn dispatch_all(&self, targets: &[String], port_range: &str) -> ScanBatchResult {
        // Without a token the dispatch cannot be cancelled.
        self.dispatch_internal(targets, port_range, None)
            .await
            .unwrap_or_default()
    }

    /// Variant that abandons in-flight scans when `cancel` fires.
    ///
    /// Cancellation aborts every outstanding task (killing its nmap process)
    /// and discards results already collected.
    pub async fn dispatch_all_with_cancel(
        &self,
        targets: &[String],
        port_range: &str,
        cancel: CancellationToken,
    ) -> Result<ScanBatchResult, DispatchError> {
        self.dispatch_internal(targets, port_range, Some(cancel))
            .await
    }

    async fn dispatch_internal(
        &self,
        targets: &[String],
        port_range: &str,
        cancel_opt: Option<CancellationToken>,
    ) -> Result<ScanBatchResult, DispatchError> {
        let targets: Vec<&String> = targets.iter().filter(|t| !t.trim().is_empty()).collect();
        let mut batch: ScanBatchResult = targets.iter().map(|t| ((*t).clone(), None)).collect();
        if targets.is_empty() {
            return Ok(batch);
        }

        let sink = self.client.sink();
        let cancel = cancel_opt.unwrap_or_default();
        let sem = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));
        let mut set = JoinSet::new();

        sink.emit(
            Level::Info,
            &format!(
                "dispatching {} scan(s) over ports {port_range} with `{}`",
                targets.len(),
                self.client.arguments()
            ),
        );

        for target in targets {
            let key = target.clone();
            let request =
                ScanRequest::new(target.trim(), port_range, self.client.arguments().to_string());
            let client = self.client.clone();
            let sem = sem.clone();

            set.spawn(async move {
                let _permit = match sem {
                    Some(s) => s.acquire_owned().await.ok(),
                    None => None,
                };
                let result = client.scan(&request).await;
                (key, result)
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    set.abort_all();
                    sink.emit(Level::Warn, "dispatch cancelled; abandoning in-flight scans");
                    return Err(DispatchError::Cancelled);
                }
                joined = set.join_next() => match joined {
                    Some(Ok((key, result))) => {
                        let slot = batch.entry(key).or_default();
                        if result.is_some() {
                            *slot = result;
                        }
                    }
                    Some(Err(e)) => {
                        // The key stays `None`; the panicking target is already seeded.
                        sink.emit(Level::Error, &format!("scan task failed: {e}"));
                    }
                    None => break,
                },
            }
        }

        let failed = batch.values().filter(|r| r.is_none()).count();
        if failed > 0 {
            sink.emit(
                Level::Warn,
                &format!("{failed} of {} target(s) returned no results", batch.len()),
            );
        }
        Ok(batch)
    }
}
