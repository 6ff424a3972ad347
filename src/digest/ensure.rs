//! Placeholder materialization and registry/catalog reconciliation.

use crate::catalog::{Catalog, DigestPatch, DigestStatus};
use crate::digest::{DIGESTER_UNREGISTERED, Registry};
use crate::error::Result;

/// Make the catalog reflect the current registry for one file: a `todo` row
/// exists for every registered output name, and non-terminal rows belonging
/// to unregistered digesters are quarantined as skipped. Idempotent.
pub async fn ensure_placeholders(
    catalog: &Catalog,
    registry: &Registry,
    file_path: &str,
) -> Result<u64> {
    let mut created = 0u64;

    for name in registry.all_output_names() {
        if catalog.digests.upsert_if_missing(file_path, name).await? {
            created += 1;
        }
    }

    let registered = registry.all_output_names();
    for record in catalog.digests.list_for_file(file_path).await? {
        if registered.contains(&record.digester.as_str()) {
            continue;
        }
        if !matches!(record.status, DigestStatus::Todo | DigestStatus::Failed) {
            continue;
        }

        tracing::info!(
            path = %file_path,
            digester = %record.digester,
            "quarantining digest of unregistered digester"
        );

        catalog
            .digests
            .update(
                &record.id,
                DigestPatch {
                    status: Some(DigestStatus::Skipped),
                    error: Some(DIGESTER_UNREGISTERED.to_string()),
                    attempts: Some(0),
                    ..Default::default()
                },
            )
            .await?;
    }

    Ok(created)
}

/// Run [`ensure_placeholders`] over every non-folder file. Returns the
/// number of placeholder rows created.
pub async fn ensure_all_files(catalog: &Catalog, registry: &Registry) -> Result<u64> {
    let mut created = 0u64;

    for file in catalog.files.list_non_folders().await? {
        created += ensure_placeholders(catalog, registry, &file.path).await?;
    }

    if created > 0 {
        tracing::info!(created, "materialized digest placeholders");
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::testing::{TestPipeline, registry_with};

    #[tokio::test]
    async fn placeholders_cover_every_registered_output() {
        let pipeline = TestPipeline::new().await;
        pipeline.add_text_file("inbox/note.txt", "hello").await;

        let rows = pipeline
            .deps
            .catalog
            .digests
            .list_for_file("inbox/note.txt")
            .await
            .expect("list should succeed");

        let names: Vec<_> = rows.iter().map(|row| row.digester.as_str()).collect();
        for expected in pipeline.registry.all_output_names() {
            assert!(names.contains(&expected), "missing placeholder {expected}");
        }
        assert!(rows.iter().all(|row| row.status == DigestStatus::Todo));

        // A second ensure creates nothing new.
        let created = ensure_placeholders(
            &pipeline.deps.catalog,
            &pipeline.registry,
            "inbox/note.txt",
        )
        .await
        .expect("ensure should succeed");
        assert_eq!(created, 0);
    }

    #[tokio::test]
    async fn unregistered_rows_are_quarantined() {
        let pipeline = TestPipeline::new().await;
        pipeline.add_text_file("inbox/note.txt", "hello").await;

        // A row from a digester that is no longer part of the registry.
        pipeline
            .deps
            .catalog
            .digests
            .insert("inbox/note.txt", "legacy-thumbnails")
            .await
            .expect("insert should succeed");

        ensure_placeholders(
            &pipeline.deps.catalog,
            &pipeline.registry,
            "inbox/note.txt",
        )
        .await
        .expect("ensure should succeed");

        let legacy = pipeline
            .deps
            .catalog
            .digests
            .get_by_file_and_name("inbox/note.txt", "legacy-thumbnails")
            .await
            .expect("fetch should succeed")
            .expect("row should exist");
        assert_eq!(legacy.status, DigestStatus::Skipped);
        assert_eq!(legacy.error.as_deref(), Some(DIGESTER_UNREGISTERED));
    }

    #[tokio::test]
    async fn completed_rows_of_unregistered_digesters_are_left_alone() {
        let pipeline = TestPipeline::new().await;
        pipeline.add_text_file("inbox/note.txt", "hello").await;

        let row = pipeline
            .deps
            .catalog
            .digests
            .insert("inbox/note.txt", "legacy-thumbnails")
            .await
            .expect("insert should succeed");
        pipeline
            .deps
            .catalog
            .digests
            .update(
                &row.id,
                DigestPatch {
                    status: Some(DigestStatus::Completed),
                    content: Some("kept".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("update should succeed");

        let registry = registry_with(&[]);
        ensure_placeholders(&pipeline.deps.catalog, &registry, "inbox/note.txt")
            .await
            .expect("ensure should succeed");

        let legacy = pipeline
            .deps
            .catalog
            .digests
            .get_by_file_and_name("inbox/note.txt", "legacy-thumbnails")
            .await
            .expect("fetch should succeed")
            .expect("row should exist");
        assert_eq!(legacy.status, DigestStatus::Completed);
        assert_eq!(legacy.content.as_deref(), Some("kept"));
    }
}
