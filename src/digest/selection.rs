//! File selection: which files still have digest work to do.

use crate::catalog::Catalog;
use crate::config::DigestConfig;
use crate::digest::Registry;
use crate::error::Result;
use anyhow::Context as _;
use sqlx::Row as _;

/// Up to `limit` non-folder paths with at least one actionable digest row,
/// oldest activity first.
///
/// A row is actionable iff its digester is currently registered, its status
/// is todo or failed, and it has attempts left. The query joins files against
/// actionable rows only, so exhausted or fully-completed files never surface
/// no matter how many terminal rows they carry.
pub async fn select_files_needing_work(
    catalog: &Catalog,
    registry: &Registry,
    config: &DigestConfig,
    limit: i64,
) -> Result<Vec<String>> {
    let output_names = registry.all_output_names();
    if output_names.is_empty() {
        return Ok(Vec::new());
    }

    let name_placeholders = vec!["?"; output_names.len()].join(", ");
    let mut query = format!(
        "SELECT f.path AS path FROM files f \
         WHERE f.is_folder = 0 \
         AND EXISTS (SELECT 1 FROM digests d WHERE d.file_path = f.path \
             AND d.digester IN ({name_placeholders}) \
             AND (d.status = 'todo' OR (d.status = 'failed' AND d.attempts < ?)))"
    );

    for _ in &config.excluded_path_prefixes {
        query.push_str(" AND NOT (f.path LIKE ? || '%')");
    }

    query.push_str(
        " ORDER BY COALESCE(f.last_scanned_at, f.created_at) ASC, f.path ASC LIMIT ?",
    );

    let mut sql = sqlx::query(&query);
    for name in &output_names {
        sql = sql.bind(*name);
    }
    sql = sql.bind(config.max_attempts);
    for prefix in &config.excluded_path_prefixes {
        sql = sql.bind(prefix);
    }
    sql = sql.bind(limit.max(0));

    let rows = sql
        .fetch_all(catalog.pool())
        .await
        .context("failed to select files needing work")?;

    rows.iter()
        .map(|row| row.try_get("path").context("failed to read selected path"))
        .collect::<anyhow::Result<Vec<String>>>()
        .map_err(Into::into)
}
