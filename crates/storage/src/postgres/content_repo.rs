//! Content repository implementation for PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument, warn};

use vellum_core::error::{StorageError, StorageResult};
use vellum_core::models::{ContentRecord, UserId};
use vellum_core::ports::{ContentRepository, CountStrategy, FetchSpec, FetchedRows, TotalCount};

use super::database::Database;
use super::helpers::{map_query_error, parse_source_type};
use super::query_builder::{ExecutablePlan, Relations, SqlParam, build_estimate_plan, build_plan};

/// Bind every plan parameter, in placeholder order.
macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                SqlParam::BigInt(v) => query.bind(*v),
                SqlParam::Float(v) => query.bind(*v),
                SqlParam::Text(v) => query.bind(v.as_str()),
                SqlParam::TextArray(v) => query.bind(v.as_slice()),
                SqlParam::Timestamp(v) => query.bind(*v),
            };
        }
        query
    }};
}

// =============================================================================
// Repository Implementation
// =============================================================================

/// PostgreSQL implementation of ContentRepository.
pub struct PgContentRepository {
    pool: PgPool,
    relations: Relations,
}

impl PgContentRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
            relations: Relations::default(),
        }
    }

    /// Use non-default relation names.
    pub fn with_relations(mut self, relations: Relations) -> Self {
        self.relations = relations;
        self
    }

    async fn run_page(&self, plan: &ExecutablePlan) -> StorageResult<FetchedRows> {
        let rows: Vec<ContentRow> = bind_params!(sqlx::query_as(&plan.sql), &plan.params)
            .fetch_all(&self.pool)
            .await
            .map_err(map_query_error)?;

        let total = rows
            .first()
            .and_then(|r| r.total_count)
            .map(|n| TotalCount::Exact(n.max(0) as u64));
        let rows = rows
            .into_iter()
            .map(ContentRow::into_record)
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(FetchedRows { rows, total })
    }

    /// Planner row estimate for the filtered listing.
    async fn estimate_rows(&self, plan: &ExecutablePlan) -> StorageResult<u64> {
        let explain: serde_json::Value = bind_params!(sqlx::query_scalar(&plan.sql), &plan.params)
            .fetch_one(&self.pool)
            .await
            .map_err(map_query_error)?;

        parse_plan_rows(&explain).ok_or_else(|| {
            StorageError::SerializationError("EXPLAIN output has no root 'Plan Rows'".to_string())
        })
    }
}

#[async_trait]
impl ContentRepository for PgContentRepository {
    #[instrument(skip_all, fields(sort = %spec.sort, count = ?spec.count))]
    async fn fetch_page(&self, spec: &FetchSpec<'_>) -> StorageResult<FetchedRows> {
        let mut with_count = !matches!(spec.count, CountStrategy::Omitted);
        let mut estimate = None;

        if let CountStrategy::Estimated { threshold } = spec.count {
            if let Some(plan) = build_estimate_plan(spec, &self.relations) {
                let rows = self.estimate_rows(&plan).await?;
                debug!(estimate = rows, threshold, "Planner estimate");
                if rows >= threshold {
                    with_count = false;
                    estimate = Some(rows);
                }
            }
        }

        let Some(plan) = build_plan(spec, &self.relations, with_count) else {
            warn!("Empty predicate set reached storage, returning no rows");
            return Ok(FetchedRows::default());
        };
        debug!(
            partition = plan.target.as_str(),
            params = plan.params.len(),
            counted = with_count,
            "Executing page statement"
        );

        let mut fetched = self.run_page(&plan).await?;
        if let Some(rows) = estimate {
            fetched.total = Some(TotalCount::Estimated(rows));
        }
        Ok(fetched)
    }
}

/// Read the root `Plan Rows` of an `EXPLAIN (FORMAT JSON)` document.
pub(crate) fn parse_plan_rows(explain: &serde_json::Value) -> Option<u64> {
    let rows = explain.get(0)?.get("Plan")?.get("Plan Rows")?.as_f64()?;
    (rows.is_finite() && rows >= 0.0).then(|| rows.round() as u64)
}

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct ContentRow {
    id: i64,
    source_type: String,
    creator_id: i64,
    created_at: DateTime<Utc>,
    quality_score: Option<f64>,
    tags: Vec<String>,
    title: String,
    total_count: Option<i64>,
}

impl ContentRow {
    fn into_record(self) -> StorageResult<ContentRecord> {
        Ok(ContentRecord {
            id: self.id,
            source_type: parse_source_type(&self.source_type, "content.source_type")?,
            creator_id: UserId(self.creator_id),
            created_at: self.created_at,
            quality_score: self.quality_score,
            tags: self.tags,
            title: self.title,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plan_rows() {
        let explain = json!([{
            "Plan": {
                "Node Type": "Append",
                "Plan Rows": 1250000.0,
                "Plans": [{ "Node Type": "Seq Scan", "Plan Rows": 900000 }]
            }
        }]);
        assert_eq!(parse_plan_rows(&explain), Some(1_250_000));
    }

    #[test]
    fn test_parse_plan_rows_rejects_unexpected_shapes() {
        assert_eq!(parse_plan_rows(&json!({})), None);
        assert_eq!(parse_plan_rows(&json!([{ "Plan": {} }])), None);
        assert_eq!(parse_plan_rows(&json!([{ "Plan": { "Plan Rows": -1 } }])), None);
    }

    #[test]
    fn test_row_mapping() {
        let row = ContentRow {
            id: 9,
            source_type: "regular".into(),
            creator_id: 3,
            created_at: Utc::now(),
            quality_score: None,
            tags: vec!["a".into()],
            title: "t".into(),
            total_count: Some(12),
        };
        let record = row.into_record().unwrap();
        assert_eq!(record.creator_id, UserId(3));
        assert_eq!(record.key().id, 9);
    }
}
