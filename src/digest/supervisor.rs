//! The long-running digest scheduler.
//!
//! One supervisor per process: polls file selection, runs the coordinator
//! one file at a time, sweeps stale in-progress rows on a cadence, backs off
//! on repeated failure, and reacts to filesystem events for immediate
//! processing. The per-file lock serializes the event path against the main
//! loop.

use crate::PipelineDeps;
use crate::catalog::DigestStatus;
use crate::digest::coordinator::{CoordinateOptions, Coordinator};
use crate::digest::{Registry, selection};
use crate::scan::Scanner;
use crate::watcher::FileChangeEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Process-wide slot; only one supervisor may run at a time.
static SUPERVISOR_ACTIVE: AtomicBool = AtomicBool::new(false);

/// RAII release of the supervisor slot, panic-safe.
struct ActiveGuard;

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        SUPERVISOR_ACTIVE.store(false, Ordering::Release);
    }
}

pub struct Supervisor {
    deps: PipelineDeps,
    registry: Arc<Registry>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(deps: PipelineDeps, registry: Arc<Registry>, cancel: CancellationToken) -> Self {
        Self {
            deps,
            registry,
            cancel,
        }
    }

    /// Start the supervisor, optionally wired to a watcher event stream.
    pub fn spawn(
        self,
        events: Option<broadcast::Receiver<FileChangeEvent>>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(events).await })
    }

    async fn run(self, events: Option<broadcast::Receiver<FileChangeEvent>>) {
        if SUPERVISOR_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::error!("a digest supervisor is already running in this process");
            return;
        }
        let _guard = ActiveGuard;

        tracing::info!("digest supervisor starting");

        // Warm-up before the first iteration.
        if !self.sleep(self.deps.config.digest.start_delay).await {
            tracing::info!("digest supervisor cancelled during warm-up");
            return;
        }

        let event_task = events.map(|receiver| {
            let deps = self.deps.clone();
            let registry = self.registry.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(event_loop(deps, registry, cancel, receiver))
        });

        self.main_loop().await;

        if let Some(task) = event_task {
            task.abort();
        }

        tracing::info!("digest supervisor stopped");
    }

    async fn main_loop(&self) {
        let coordinator = Coordinator::new(self.deps.clone(), self.registry.clone());
        let config = &self.deps.config.digest;
        let mut last_sweep: Option<tokio::time::Instant> = None;
        let mut consecutive_failures = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let sweep_due =
                last_sweep.is_none_or(|at| at.elapsed() >= config.stale_sweep_interval);
            if sweep_due {
                match self
                    .deps
                    .catalog
                    .digests
                    .reset_stale(config.stale_threshold)
                    .await
                {
                    Ok(0) => {}
                    Ok(reclaimed) => {
                        tracing::info!(reclaimed, "stale in-progress digests reset to todo");
                    }
                    Err(error) => tracing::warn!(%error, "stale sweep failed"),
                }
                last_sweep = Some(tokio::time::Instant::now());
            }

            let next = selection::select_files_needing_work(
                &self.deps.catalog,
                &self.registry,
                config,
                1,
            )
            .await;

            let path = match next {
                Ok(batch) => batch.into_iter().next(),
                Err(error) => {
                    tracing::warn!(%error, "file selection failed");
                    if !self.sleep(config.idle_sleep).await {
                        break;
                    }
                    continue;
                }
            };

            let Some(path) = path else {
                consecutive_failures = 0;
                if !self.sleep(config.idle_sleep).await {
                    break;
                }
                continue;
            };

            if let Err(error) = coordinator
                .process(&path, CoordinateOptions::default())
                .await
            {
                tracing::warn!(path = %path, %error, "coordinator pass failed");
            }

            if !self.sleep(config.file_delay).await {
                break;
            }

            if self.file_has_failures(&path).await {
                consecutive_failures += 1;
                let delay = failure_backoff(
                    consecutive_failures,
                    config.failure_base_delay,
                    config.failure_max_delay,
                );
                tracing::debug!(
                    path = %path,
                    consecutive_failures,
                    delay_ms = delay.as_millis() as u64,
                    "backing off after digest failures"
                );
                if !self.sleep(delay).await {
                    break;
                }
            } else {
                consecutive_failures = 0;
            }
        }
    }

    async fn file_has_failures(&self, path: &str) -> bool {
        match self.deps.catalog.digests.list_for_file(path).await {
            Ok(rows) => rows
                .iter()
                .any(|row| row.status == DigestStatus::Failed),
            Err(error) => {
                tracing::warn!(path, %error, "failed to inspect digests after pass");
                false
            }
        }
    }

    /// Cancellable sleep. Returns false when the stop signal fired.
    async fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.cancel.is_cancelled();
        }

        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor").finish_non_exhaustive()
    }
}

/// React to watcher events: re-observe the path, then process it, with a
/// full reset when the event invalidates existing digests. The per-file lock
/// keeps this from interfering with the main loop.
async fn event_loop(
    deps: PipelineDeps,
    registry: Arc<Registry>,
    cancel: CancellationToken,
    mut receiver: broadcast::Receiver<FileChangeEvent>,
) {
    let scanner = Scanner::new(deps.clone(), registry.clone());
    let coordinator = Coordinator::new(deps.clone(), registry.clone());

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = receiver.recv() => event,
        };

        let event = match event {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "watcher event stream lagged; periodic scan will catch up");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if let Err(error) = handle_event(&deps, &registry, &scanner, &coordinator, &event).await {
            tracing::warn!(path = %event.path, %error, "failed to handle file change event");
        }
    }
}

async fn handle_event(
    deps: &PipelineDeps,
    registry: &Registry,
    scanner: &Scanner,
    coordinator: &Coordinator,
    event: &FileChangeEvent,
) -> crate::Result<()> {
    tracing::debug!(
        path = %event.path,
        is_new = event.is_new,
        invalidate = event.should_invalidate_digests,
        removed = event.removed,
        renamed_from = event.renamed_from.as_deref().unwrap_or(""),
        "file change event"
    );

    if event.removed {
        scanner.remove_path(&event.path).await?;
        return Ok(());
    }

    // A rename carries records, digest history, and blobs to the new path
    // instead of re-deriving everything.
    let record = if let Some(old_path) = &event.renamed_from {
        scanner.rename_path(old_path, &event.path).await?
    } else {
        scanner.scan_path(&event.path).await?
    };

    let Some(record) = record else {
        return Ok(());
    };
    if record.is_folder {
        return Ok(());
    }

    if event.should_invalidate_digests {
        coordinator
            .process(
                &event.path,
                CoordinateOptions {
                    reset: true,
                    digester: None,
                },
            )
            .await?;
        return Ok(());
    }

    // Only jump the queue when selection would offer the path anyway.
    let batch = selection::select_files_needing_work(
        &deps.catalog,
        registry,
        &deps.config.digest,
        deps.config.digest.selection_limit,
    )
    .await?;

    if batch.iter().any(|path| path == &event.path) {
        coordinator
            .process(&event.path, CoordinateOptions::default())
            .await?;
    }

    Ok(())
}

/// Exponential backoff with a cap: `min(base × 2^(n−1), max)`.
pub(crate) fn failure_backoff(consecutive_failures: u32, base: Duration, max: Duration) -> Duration {
    if consecutive_failures == 0 {
        return Duration::ZERO;
    }

    let shift = (consecutive_failures - 1).min(16);
    base.saturating_mul(2u32.saturating_pow(shift)).min(max)
}
