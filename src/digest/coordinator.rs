//! Per-file digest driver.
//!
//! Processes exactly one file per call: takes the file's advisory lock,
//! walks the registry in order, runs whichever digesters still have pending
//! outputs, and persists the results. Within one file digesters run strictly
//! sequentially and observe each other's completed rows; across files there
//! is no ordering.

use crate::PipelineDeps;
use crate::blob;
use crate::catalog::{DigestPatch, DigestRecord, DigestStatus, FileRecord};
use crate::digest::digester::{DigestContext, DigestOutput, OutputSpec, OutputStatus};
use crate::digest::{
    MAX_ATTEMPTS_SUFFIX, NOT_APPLICABLE, OUTPUT_NOT_PRODUCED, Registry, text_source,
};
use crate::error::Result;
use std::sync::Arc;

/// Characters kept for the file's denormalized text preview.
const PREVIEW_CHARS: usize = 280;

/// Options for one coordinator pass.
#[derive(Debug, Clone, Default)]
pub struct CoordinateOptions {
    /// Rewind digests to `todo` (clearing outputs and blobs) before the walk.
    pub reset: bool,
    /// Restrict the reset to one output name. `None` resets everything,
    /// including the file's whole blob namespace.
    pub digester: Option<String>,
}

/// What a coordinator pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The walk ran; counts are per digester, not per output.
    Processed {
        completed: usize,
        failed: usize,
        skipped: usize,
    },
    /// Another worker holds the file's lock. Normal control flow.
    LockHeld,
    /// The path has no catalog record.
    MissingFile,
}

pub struct Coordinator {
    deps: PipelineDeps,
    registry: Arc<Registry>,
}

impl Coordinator {
    pub fn new(deps: PipelineDeps, registry: Arc<Registry>) -> Self {
        Self { deps, registry }
    }

    /// Process one file under its lock. Lock refusal is a silent no-op.
    pub async fn process(&self, path: &str, options: CoordinateOptions) -> Result<ProcessOutcome> {
        let owner = format!("pid{}:{}", std::process::id(), uuid::Uuid::new_v4());
        let stale_after = self.deps.config.digest.stale_threshold;

        if !self
            .deps
            .catalog
            .locks
            .try_acquire(path, &owner, stale_after)
            .await?
        {
            tracing::debug!(path, "file lock held elsewhere, skipping");
            return Ok(ProcessOutcome::LockHeld);
        }

        let result = self.process_locked(path, &options).await;

        // The lock must come off on every exit path; a failed release is
        // recovered later by the stale-steal.
        if let Err(error) = self.deps.catalog.locks.release(path, &owner).await {
            tracing::warn!(path, %error, "failed to release file lock");
        }

        result
    }

    async fn process_locked(
        &self,
        path: &str,
        options: &CoordinateOptions,
    ) -> Result<ProcessOutcome> {
        let Some(file) = self.deps.catalog.files.get_by_path(path).await? else {
            tracing::warn!(path, "file not found in catalog, skipping");
            return Ok(ProcessOutcome::MissingFile);
        };

        if options.reset {
            self.apply_reset(&file, options.digester.as_deref()).await?;
        }

        let mut completed = 0usize;
        let mut failed = 0usize;
        let mut skipped = 0usize;

        for digester in self.registry.all() {
            let digests = self.deps.catalog.digests.list_for_file(path).await?;
            let specs = digester.outputs();

            let row_for = |name: &str| {
                digests
                    .iter()
                    .find(|record| record.digester == name)
                    .cloned()
            };

            if specs.iter().any(|spec| {
                row_for(spec.name).is_some_and(|row| row.status == DigestStatus::InProgress)
            }) {
                tracing::debug!(path, digester = digester.name(), "output in progress elsewhere, skipping");
                continue;
            }

            let mut pending: Vec<(OutputSpec, DigestRecord)> = Vec::new();
            for spec in &specs {
                let row = match row_for(spec.name) {
                    Some(row) => row,
                    None => {
                        // Placeholder missing (e.g. file predates the
                        // digester); materialize it now.
                        self.deps
                            .catalog
                            .digests
                            .upsert_if_missing(path, spec.name)
                            .await?;
                        self.deps
                            .catalog
                            .digests
                            .get_by_file_and_name(path, spec.name)
                            .await?
                            .ok_or_else(|| {
                                anyhow::anyhow!("digest row vanished for {}", spec.name)
                            })?
                    }
                };

                let needs_work = match row.status {
                    DigestStatus::Todo => true,
                    DigestStatus::Failed => {
                        !row.is_exhausted(self.deps.config.digest.max_attempts)
                    }
                    _ => false,
                };
                if needs_work {
                    pending.push((*spec, row));
                }
            }

            if pending.is_empty() {
                completed += 1;
                continue;
            }

            let ctx = DigestContext {
                file: &file,
                digests: &digests,
                deps: &self.deps,
            };

            let applies = match digester.applies(&ctx).await {
                Ok(applies) => applies,
                Err(error) => {
                    // A broken predicate consumes an attempt like a run
                    // failure would, so it terminates at the cap.
                    tracing::warn!(path, digester = digester.name(), %error, "applies check failed");
                    self.consume_attempt_and_fail(&pending, &error.to_string())
                        .await?;
                    failed += 1;
                    continue;
                }
            };

            if !applies {
                for (_, row) in &pending {
                    self.mark_skipped(row, NOT_APPLICABLE).await?;
                }
                skipped += 1;
                continue;
            }

            for (_, row) in &pending {
                self.deps
                    .catalog
                    .digests
                    .mark_in_progress(&row.id, self.deps.config.digest.max_attempts)
                    .await?;
            }

            match digester.run(&ctx).await {
                Err(error) => {
                    tracing::warn!(path, digester = digester.name(), %error, "digester failed");
                    self.fail_pending(&pending, &error.to_string()).await?;
                    failed += 1;
                }
                Ok(outputs) => {
                    let mut produced: Vec<&'static str> = Vec::new();
                    let mut any_failed = false;

                    for output in outputs {
                        let Some((spec, row)) =
                            pending.iter().find(|(spec, _)| spec.name == output.name)
                        else {
                            // Unknown or non-pending output name: contract
                            // violation, logged and ignored.
                            tracing::warn!(
                                path,
                                digester = digester.name(),
                                output = output.name,
                                "digester produced an output it does not own this cycle"
                            );
                            continue;
                        };

                        produced.push(spec.name);
                        any_failed |= output.status == OutputStatus::Failed;
                        self.persist_output(&file, spec, row, &output).await?;
                    }

                    for (_, row) in pending
                        .iter()
                        .filter(|(spec, _)| !produced.contains(&spec.name))
                    {
                        self.mark_skipped(row, OUTPUT_NOT_PRODUCED).await?;
                    }

                    if any_failed {
                        failed += 1;
                    } else {
                        completed += 1;
                    }
                }
            }
        }

        self.refresh_preview(&file).await?;

        tracing::debug!(path, completed, failed, skipped, "coordinator pass finished");
        Ok(ProcessOutcome::Processed {
            completed,
            failed,
            skipped,
        })
    }

    /// Rewind digest rows (one digester's or all) and drop their artifacts.
    async fn apply_reset(&self, file: &FileRecord, digester: Option<&str>) -> Result<()> {
        let rows = self.deps.catalog.digests.list_for_file(&file.path).await?;

        for row in rows
            .iter()
            .filter(|row| digester.is_none_or(|name| row.digester == name))
        {
            self.deps.catalog.digests.reset_row(&row.id).await?;
            self.deps
                .blobs
                .delete_prefix(&blob::digester_prefix(&file.path, &row.digester))
                .await?;

            if self.registry.is_screenshot_output(&row.digester) {
                self.deps
                    .catalog
                    .files
                    .set_screenshot_key(&file.path, None)
                    .await?;
            }
        }

        if digester.is_none() {
            self.deps
                .blobs
                .delete_prefix(&blob::file_prefix(&file.path))
                .await?;
        }

        tracing::info!(path = %file.path, digester = digester.unwrap_or("all"), "digests reset");
        Ok(())
    }

    /// Persist one produced output onto its row, maintaining the screenshot
    /// pointer for screenshot-flagged outputs.
    async fn persist_output(
        &self,
        file: &FileRecord,
        spec: &OutputSpec,
        row: &DigestRecord,
        output: &DigestOutput,
    ) -> Result<()> {
        match output.status {
            OutputStatus::Completed => {
                self.deps
                    .catalog
                    .digests
                    .update(
                        &row.id,
                        DigestPatch {
                            status: Some(DigestStatus::Completed),
                            content: output.content.clone(),
                            blob_key: output.blob_key.clone(),
                            attempts: Some(0),
                            clear_content: output.content.is_none(),
                            clear_blob_key: output.blob_key.is_none(),
                            clear_error: true,
                            ..Default::default()
                        },
                    )
                    .await?;

                if spec.is_screenshot && let Some(blob_key) = &output.blob_key {
                    self.deps
                        .catalog
                        .files
                        .set_screenshot_key(&file.path, Some(blob_key))
                        .await?;
                }
            }
            OutputStatus::Skipped => {
                let reason = output.error.clone().unwrap_or_else(|| NOT_APPLICABLE.to_string());
                self.mark_skipped(row, &reason).await?;
            }
            OutputStatus::Failed => {
                let message = output
                    .error
                    .clone()
                    .unwrap_or_else(|| "digester reported failure".to_string());
                let single = [(*spec, row.clone())];
                self.fail_pending(&single, &message).await?;
            }
        }

        Ok(())
    }

    /// Mark rows failed. Attempts were already consumed by mark_in_progress;
    /// the terminal marker lands once they are exhausted.
    async fn fail_pending(
        &self,
        pending: &[(OutputSpec, DigestRecord)],
        message: &str,
    ) -> Result<()> {
        let max_attempts = self.deps.config.digest.max_attempts;

        for (_, row) in pending {
            let consumed = (row.attempts + 1).min(max_attempts);
            let mut error = message.to_string();
            if consumed >= max_attempts {
                error.push_str(MAX_ATTEMPTS_SUFFIX);
            }

            self.deps
                .catalog
                .digests
                .update(
                    &row.id,
                    DigestPatch {
                        status: Some(DigestStatus::Failed),
                        error: Some(error),
                        clear_content: true,
                        clear_blob_key: true,
                        ..Default::default()
                    },
                )
                .await?;
        }

        Ok(())
    }

    /// Failure path for rows that never reached in_progress (broken
    /// `applies`): consume the attempt and fail in one go.
    async fn consume_attempt_and_fail(
        &self,
        pending: &[(OutputSpec, DigestRecord)],
        message: &str,
    ) -> Result<()> {
        for (_, row) in pending {
            self.deps
                .catalog
                .digests
                .mark_in_progress(&row.id, self.deps.config.digest.max_attempts)
                .await?;
        }
        self.fail_pending(pending, message).await
    }

    async fn mark_skipped(&self, row: &DigestRecord, reason: &str) -> Result<()> {
        self.deps
            .catalog
            .digests
            .update(
                &row.id,
                DigestPatch {
                    status: Some(DigestStatus::Skipped),
                    error: Some(reason.to_string()),
                    attempts: Some(0),
                    clear_content: true,
                    clear_blob_key: true,
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Keep the file's denormalized text preview in sync with the best
    /// current text source.
    async fn refresh_preview(&self, file: &FileRecord) -> Result<()> {
        let digests = self.deps.catalog.digests.list_for_file(&file.path).await?;
        let preview = text_source::resolve(file, &digests, &self.deps.config.data_root)
            .await?
            .map(|source| truncate_preview(&source.text));

        let current = self
            .deps
            .catalog
            .files
            .get_by_path(&file.path)
            .await?
            .and_then(|record| record.preview);

        if preview != current {
            self.deps
                .catalog
                .files
                .set_preview(&file.path, preview.as_deref())
                .await?;
        }

        Ok(())
    }
}

fn truncate_preview(text: &str) -> String {
    text.trim().chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digester::Digester;
    use crate::digest::testing::{TestPipeline, registry_with};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Digester that fails every run with a fixed message.
    struct AlwaysFails;

    #[async_trait]
    impl Digester for AlwaysFails {
        fn name(&self) -> &'static str {
            "always-fails"
        }

        fn label(&self) -> &'static str {
            "always fails"
        }

        async fn applies(&self, _ctx: &DigestContext<'_>) -> crate::Result<bool> {
            Ok(true)
        }

        async fn run(&self, _ctx: &DigestContext<'_>) -> crate::Result<Vec<DigestOutput>> {
            Err(anyhow::anyhow!("service unavailable").into())
        }
    }

    /// Two declared outputs, only one produced.
    struct HalfProducer;

    #[async_trait]
    impl Digester for HalfProducer {
        fn name(&self) -> &'static str {
            "half"
        }

        fn label(&self) -> &'static str {
            "half producer"
        }

        fn outputs(&self) -> Vec<OutputSpec> {
            vec![
                OutputSpec::content("half-content"),
                OutputSpec::screenshot("half-screenshot"),
            ]
        }

        async fn applies(&self, _ctx: &DigestContext<'_>) -> crate::Result<bool> {
            Ok(true)
        }

        async fn run(&self, _ctx: &DigestContext<'_>) -> crate::Result<Vec<DigestOutput>> {
            Ok(vec![
                DigestOutput::completed("half-content").with_content("{\"v\":1}"),
            ])
        }
    }

    /// Counts run invocations; completes on every pass.
    struct CountingDigester(Arc<AtomicUsize>);

    #[async_trait]
    impl Digester for CountingDigester {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn label(&self) -> &'static str {
            "counting"
        }

        async fn applies(&self, _ctx: &DigestContext<'_>) -> crate::Result<bool> {
            Ok(true)
        }

        async fn run(&self, _ctx: &DigestContext<'_>) -> crate::Result<Vec<DigestOutput>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                DigestOutput::completed("counting").with_content("{\"ok\":true}"),
            ])
        }
    }

    #[tokio::test]
    async fn failing_digester_is_terminal_after_max_attempts() {
        let registry = registry_with(&[Arc::new(AlwaysFails)]);
        let pipeline = TestPipeline::with_registry(registry).await;
        pipeline.add_text_file("inbox/note.txt", "hello").await;
        let coordinator = pipeline.coordinator();

        for pass in 1..=4 {
            coordinator
                .process("inbox/note.txt", CoordinateOptions::default())
                .await
                .expect("pass should succeed");

            let row = pipeline.digest("inbox/note.txt", "always-fails").await;
            assert_eq!(row.status, DigestStatus::Failed);
            assert_eq!(row.attempts, pass);
        }

        let row = pipeline.digest("inbox/note.txt", "always-fails").await;
        assert!(
            row.error
                .as_deref()
                .expect("error should be set")
                .ends_with(MAX_ATTEMPTS_SUFFIX)
        );

        // A fifth pass finds nothing pending and changes nothing.
        let before = pipeline.digest("inbox/note.txt", "always-fails").await;
        coordinator
            .process("inbox/note.txt", CoordinateOptions::default())
            .await
            .expect("pass should succeed");
        let after = pipeline.digest("inbox/note.txt", "always-fails").await;
        assert_eq!(before, after);

        // And file selection no longer offers the file.
        let selected = crate::digest::selection::select_files_needing_work(
            &pipeline.deps.catalog,
            &pipeline.registry,
            &pipeline.deps.config.digest,
            10,
        )
        .await
        .expect("selection should succeed");
        assert!(selected.is_empty());
    }

    #[tokio::test]
    async fn unproduced_outputs_are_skipped_and_screenshot_pointer_untouched() {
        let registry = registry_with(&[Arc::new(HalfProducer)]);
        let pipeline = TestPipeline::with_registry(registry).await;
        pipeline.add_text_file("inbox/note.txt", "hello").await;

        pipeline
            .coordinator()
            .process("inbox/note.txt", CoordinateOptions::default())
            .await
            .expect("pass should succeed");

        let content = pipeline.digest("inbox/note.txt", "half-content").await;
        assert_eq!(content.status, DigestStatus::Completed);
        assert_eq!(content.attempts, 0);

        let screenshot = pipeline.digest("inbox/note.txt", "half-screenshot").await;
        assert_eq!(screenshot.status, DigestStatus::Skipped);
        assert_eq!(screenshot.error.as_deref(), Some(OUTPUT_NOT_PRODUCED));

        let file = pipeline.file("inbox/note.txt").await;
        assert_eq!(file.screenshot_key, None);
    }

    #[tokio::test]
    async fn second_pass_on_unchanged_file_is_a_no_op() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(&[Arc::new(CountingDigester(counter.clone()))]);
        let pipeline = TestPipeline::with_registry(registry).await;
        pipeline.add_text_file("inbox/note.txt", "hello").await;
        let coordinator = pipeline.coordinator();

        coordinator
            .process("inbox/note.txt", CoordinateOptions::default())
            .await
            .expect("first pass should succeed");
        let first = pipeline
            .deps
            .catalog
            .digests
            .list_for_file("inbox/note.txt")
            .await
            .expect("list should succeed");

        coordinator
            .process("inbox/note.txt", CoordinateOptions::default())
            .await
            .expect("second pass should succeed");
        let second = pipeline
            .deps
            .catalog
            .digests
            .list_for_file("inbox/note.txt")
            .await
            .expect("list should succeed");

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn in_progress_rows_are_left_for_the_sweep() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(&[Arc::new(CountingDigester(counter.clone()))]);
        let pipeline = TestPipeline::with_registry(registry).await;
        pipeline.add_text_file("inbox/note.txt", "hello").await;

        let row = pipeline.digest("inbox/note.txt", "counting").await;
        pipeline
            .deps
            .catalog
            .digests
            .mark_in_progress(&row.id, 4)
            .await
            .expect("mark should succeed");

        pipeline
            .coordinator()
            .process("inbox/note.txt", CoordinateOptions::default())
            .await
            .expect("pass should succeed");

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        let row = pipeline.digest("inbox/note.txt", "counting").await;
        assert_eq!(row.status, DigestStatus::InProgress);
    }

    #[tokio::test]
    async fn lock_contention_is_a_silent_no_op() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(&[Arc::new(CountingDigester(counter.clone()))]);
        let pipeline = TestPipeline::with_registry(registry).await;
        pipeline.add_text_file("inbox/note.txt", "hello").await;

        pipeline
            .deps
            .catalog
            .locks
            .try_acquire(
                "inbox/note.txt",
                "other-worker",
                std::time::Duration::from_secs(600),
            )
            .await
            .expect("acquire should succeed");

        let outcome = pipeline
            .coordinator()
            .process("inbox/note.txt", CoordinateOptions::default())
            .await
            .expect("process should succeed");

        assert_eq!(outcome, ProcessOutcome::LockHeld);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        let row = pipeline.digest("inbox/note.txt", "counting").await;
        assert_eq!(row.status, DigestStatus::Todo);
    }

    #[tokio::test]
    async fn missing_file_is_reported_not_crashed() {
        let registry = registry_with(&[Arc::new(AlwaysFails)]);
        let pipeline = TestPipeline::with_registry(registry).await;

        let outcome = pipeline
            .coordinator()
            .process("inbox/ghost.txt", CoordinateOptions::default())
            .await
            .expect("process should succeed");

        assert_eq!(outcome, ProcessOutcome::MissingFile);
    }
}
