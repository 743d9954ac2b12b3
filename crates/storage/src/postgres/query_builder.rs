//! Page statement composition.
//!
//! Turns a [`FetchSpec`] into one SQL statement plus its bind parameters.
//!
//! SAFETY: The dynamic SQL built here is safe from injection because:
//! 1. Relation and column names come from [`Relations`] and [`SortField::column`],
//!    never from request strings
//! 2. Operators, sort directions and NULL placement are chosen from enums
//! 3. `LIMIT`/`OFFSET` are integers formatted by the builder
//! 4. Every filter and cursor VALUE is a `$n` parameter bound separately

use chrono::{DateTime, Utc};

use vellum_core::error::{StorageError, StorageResult};
use vellum_core::models::SourceType;
use vellum_core::ports::{
    CanonicalPredicateSet, CreatorPredicate, FetchSpec, FetchWindow, KeysetPosition,
    OrderDirection, PageDirection, PartitionTarget, Sort, SortField, SortValue, TagMatch,
};

/// `source_type` is a `TEXT` column: keyset and partition predicates bind it
/// as text, and the `source_type DESC` tie-break relies on `'auto' < 'regular'`.
const SELECT_COLUMNS: &str = "id, source_type, creator_id, created_at, quality_score, tags, title";

// =============================================================================
// Relations
// =============================================================================

/// Names of the partitioned relation and its two partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relations {
    /// Parent relation spanning both partitions.
    pub combined: String,
    pub regular: String,
    pub auto: String,
}

impl Default for Relations {
    fn default() -> Self {
        Self {
            combined: "content_items".to_string(),
            regular: "content_items_regular".to_string(),
            auto: "content_items_auto".to_string(),
        }
    }
}

impl Relations {
    /// Relation names from configuration. They are interpolated into SQL, so
    /// only plain (optionally schema-qualified) identifiers are accepted.
    pub fn new(
        combined: impl Into<String>,
        regular: impl Into<String>,
        auto: impl Into<String>,
    ) -> StorageResult<Self> {
        let relations = Self {
            combined: combined.into(),
            regular: regular.into(),
            auto: auto.into(),
        };
        for name in [&relations.combined, &relations.regular, &relations.auto] {
            if !is_identifier(name) {
                return Err(StorageError::QueryError(format!(
                    "invalid relation name '{}'",
                    name
                )));
            }
        }
        Ok(relations)
    }

    pub fn for_target(&self, target: PartitionTarget) -> &str {
        match target {
            PartitionTarget::Single(SourceType::Regular) => &self.regular,
            PartitionTarget::Single(SourceType::Auto) => &self.auto,
            PartitionTarget::Combined => &self.combined,
        }
    }
}

// =============================================================================
// Plans
// =============================================================================

/// A bind parameter of a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    BigInt(i64),
    Float(f64),
    Text(String),
    TextArray(Vec<String>),
    Timestamp(DateTime<Utc>),
}

/// What a plan returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// Page rows, with `total_count` projected.
    Page { counted: bool },
    /// `EXPLAIN (FORMAT JSON)` of the filtered relation.
    Estimate,
}

/// One SQL statement ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutablePlan {
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub target: PartitionTarget,
    pub kind: PlanKind,
}

/// Build the page statement for `spec`.
///
/// Returns `None` for an empty predicate set: nothing can match and no
/// statement must be issued.
pub fn build_plan(
    spec: &FetchSpec<'_>,
    relations: &Relations,
    with_count: bool,
) -> Option<ExecutablePlan> {
    let target = spec.predicates.partition_target()?;
    let mut builder = WhereBuilder::default();
    builder.filters(spec.predicates, target);

    let (order_by, window_sql) = match &spec.window {
        FetchWindow::Offset { offset, limit } => (
            order_by(spec.sort, PageDirection::Forward),
            format!("LIMIT {} OFFSET {}", limit, offset),
        ),
        FetchWindow::Keyset {
            after,
            direction,
            limit,
        } => {
            if let Some(position) = after {
                builder.keyset(spec.sort, position, *direction);
            }
            (order_by(spec.sort, *direction), format!("LIMIT {}", limit))
        }
    };

    let count_sql = if with_count {
        "COUNT(*) OVER()"
    } else {
        "NULL::BIGINT"
    };

    let sql = format!(
        "SELECT {}, {} AS total_count FROM {}{} ORDER BY {} {}",
        SELECT_COLUMNS,
        count_sql,
        relations.for_target(target),
        builder.where_clause(),
        order_by,
        window_sql
    );

    Some(ExecutablePlan {
        sql,
        params: builder.params,
        target,
        kind: PlanKind::Page {
            counted: with_count,
        },
    })
}

/// Build the planner-estimate statement for the filters of `spec`.
///
/// Window and keyset position are ignored: the estimate covers the whole
/// filtered listing.
pub fn build_estimate_plan(
    spec: &FetchSpec<'_>,
    relations: &Relations,
) -> Option<ExecutablePlan> {
    let target = spec.predicates.partition_target()?;
    let mut builder = WhereBuilder::default();
    builder.filters(spec.predicates, target);

    let sql = format!(
        "EXPLAIN (FORMAT JSON) SELECT 1 FROM {}{}",
        relations.for_target(target),
        builder.where_clause()
    );

    Some(ExecutablePlan {
        sql,
        params: builder.params,
        target,
        kind: PlanKind::Estimate,
    })
}

fn order_by(sort: Sort, direction: PageDirection) -> String {
    let column = sort.field.column();
    match direction {
        PageDirection::Forward => format!(
            "{} {} NULLS LAST, id DESC, source_type DESC",
            column,
            sql_direction(sort.order)
        ),
        PageDirection::Backward => format!(
            "{} {} NULLS FIRST, id ASC, source_type ASC",
            column,
            sql_direction(sort.order.reversed())
        ),
    }
}

fn sql_direction(order: OrderDirection) -> &'static str {
    match order {
        OrderDirection::Asc => "ASC",
        OrderDirection::Desc => "DESC",
    }
}

// =============================================================================
// WHERE Builder
// =============================================================================

#[derive(Default)]
struct WhereBuilder {
    conditions: Vec<String>,
    params: Vec<SqlParam>,
}

impl WhereBuilder {
    /// Register a parameter and return its placeholder.
    fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    fn filters(&mut self, predicates: &CanonicalPredicateSet, target: PartitionTarget) {
        self.sources(predicates, target);

        if let Some(tags) = &predicates.tags {
            let placeholder = self.bind(SqlParam::TextArray(tags.tags.clone()));
            let operator = match tags.mode {
                TagMatch::Any => "&&",
                TagMatch::All => "@>",
            };
            self.conditions
                .push(format!("tags {} {}::text[]", operator, placeholder));
        }

        if let Some(term) = &predicates.search_term {
            let placeholder = self.bind(SqlParam::Text(format!("%{}%", escape_like(term))));
            self.conditions.push(format!("title ILIKE {}", placeholder));
        }

        if let Some(min) = predicates.quality.min {
            let placeholder = self.bind(SqlParam::Float(min));
            self.conditions
                .push(format!("quality_score >= {}", placeholder));
        }
        if let Some(max) = predicates.quality.max {
            let placeholder = self.bind(SqlParam::Float(max));
            self.conditions
                .push(format!("quality_score <= {}", placeholder));
        }
    }

    fn sources(&mut self, predicates: &CanonicalPredicateSet, target: PartitionTarget) {
        match target {
            // The partition itself is the source_type condition
            PartitionTarget::Single(_) => {
                if let Some(source) = predicates.sources.first() {
                    if let Some(condition) = self.creator(source.creator) {
                        self.conditions.push(condition);
                    }
                }
            }
            PartitionTarget::Combined => {
                if predicates
                    .sources
                    .iter()
                    .all(|s| s.creator == CreatorPredicate::Any)
                {
                    return;
                }
                let mut disjuncts = Vec::with_capacity(predicates.sources.len());
                for source in &predicates.sources {
                    let st = self.bind(SqlParam::Text(source.source_type.as_str().to_string()));
                    disjuncts.push(match self.creator(source.creator) {
                        Some(creator) => format!("(source_type = {} AND {})", st, creator),
                        None => format!("(source_type = {})", st),
                    });
                }
                self.conditions.push(format!("({})", disjuncts.join(" OR ")));
            }
        }
    }

    fn creator(&mut self, creator: CreatorPredicate) -> Option<String> {
        match creator {
            CreatorPredicate::Any => None,
            CreatorPredicate::Is(user) => {
                Some(format!("creator_id = {}", self.bind(SqlParam::BigInt(user.0))))
            }
            CreatorPredicate::IsNot(user) => {
                Some(format!("creator_id <> {}", self.bind(SqlParam::BigInt(user.0))))
            }
        }
    }

    /// Rows strictly after (forward) or before (backward) `position` in the
    /// order `column <dir> NULLS LAST, id DESC, source_type DESC`.
    fn keyset(&mut self, sort: Sort, position: &KeysetPosition, direction: PageDirection) {
        let column = sort.field.column();
        let value = sort_value_param(&position.value).map(|p| self.bind(p));
        let id = self.bind(SqlParam::BigInt(position.id));
        let st = self.bind(SqlParam::Text(position.source_type.as_str().to_string()));

        let condition = match (value, direction, sort.order) {
            (Some(v), PageDirection::Forward, OrderDirection::Desc) => {
                let after = format!("({}, id, source_type) < ({}, {}, {})", column, v, id, st);
                or_null(after, column, sort.field)
            }
            (Some(v), PageDirection::Forward, OrderDirection::Asc) => {
                let after = format!(
                    "{c} > {v} OR ({c} = {v} AND (id, source_type) < ({id}, {st}))",
                    c = column,
                    v = v,
                    id = id,
                    st = st
                );
                or_null(after, column, sort.field)
            }
            (Some(v), PageDirection::Backward, OrderDirection::Desc) => {
                format!("({}, id, source_type) > ({}, {}, {})", column, v, id, st)
            }
            (Some(v), PageDirection::Backward, OrderDirection::Asc) => format!(
                "({c} < {v} OR ({c} = {v} AND (id, source_type) > ({id}, {st})))",
                c = column,
                v = v,
                id = id,
                st = st
            ),
            (None, PageDirection::Forward, _) => format!(
                "({} IS NULL AND (id, source_type) < ({}, {}))",
                column, id, st
            ),
            (None, PageDirection::Backward, _) => format!(
                "({} IS NOT NULL OR (id, source_type) > ({}, {}))",
                column, id, st
            ),
        };
        self.conditions.push(condition);
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').count() <= 2
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        })
}

/// Forward pages of a nullable field continue into the trailing NULL block.
fn or_null(after: String, column: &str, field: SortField) -> String {
    if field.is_nullable() {
        format!("({} OR {} IS NULL)", after, column)
    } else {
        format!("({})", after)
    }
}

fn sort_value_param(value: &SortValue) -> Option<SqlParam> {
    match value {
        SortValue::Timestamp(ts) => Some(SqlParam::Timestamp(*ts)),
        SortValue::Float(v) => Some(SqlParam::Float(*v)),
        SortValue::Text(s) => Some(SqlParam::Text(s.clone())),
        SortValue::Null => None,
    }
}

/// Escape `ILIKE` metacharacters so the term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::models::UserId;
    use vellum_core::ports::{
        CountStrategy, FilterRequest, QualityRange, SourceTypeSelector, resolve,
    };

    const ME: UserId = UserId(7);

    fn predicates(tokens: &[&str]) -> CanonicalPredicateSet {
        resolve(&FilterRequest {
            source_types: Some(SourceTypeSelector::parse(tokens).unwrap()),
            user_id: Some(ME),
            ..Default::default()
        })
        .unwrap()
    }

    fn offset_spec(predicates: &CanonicalPredicateSet) -> FetchSpec<'_> {
        FetchSpec {
            predicates,
            sort: Sort::default(),
            window: FetchWindow::Offset {
                offset: 40,
                limit: 20,
            },
            count: CountStrategy::Exact,
        }
    }

    #[test]
    fn test_empty_selection_builds_nothing() {
        let set = predicates(&[]);
        assert!(build_plan(&offset_spec(&set), &Relations::default(), true).is_none());
        assert!(build_estimate_plan(&offset_spec(&set), &Relations::default()).is_none());
    }

    #[test]
    fn test_offset_plan_shape() {
        let set = predicates(&["user-regular", "community-regular", "user-auto", "community-auto"]);
        let plan = build_plan(&offset_spec(&set), &Relations::default(), true).unwrap();

        assert_eq!(
            plan.sql,
            "SELECT id, source_type, creator_id, created_at, quality_score, tags, title, \
             COUNT(*) OVER() AS total_count FROM content_items \
             ORDER BY created_at DESC NULLS LAST, id DESC, source_type DESC LIMIT 20 OFFSET 40"
        );
        assert!(plan.params.is_empty());
        assert_eq!(plan.target, PartitionTarget::Combined);
    }

    // Test critique: un seul type de source cible directement la partition
    #[test]
    fn test_single_partition_target() {
        let set = predicates(&["user-auto"]);
        let plan = build_plan(&offset_spec(&set), &Relations::default(), true).unwrap();

        assert!(plan.sql.contains("FROM content_items_auto WHERE creator_id = $1 ORDER BY"));
        assert!(!plan.sql.contains("source_type ="));
        assert_eq!(plan.params, vec![SqlParam::BigInt(7)]);
        assert_eq!(plan.target, PartitionTarget::Single(SourceType::Auto));
    }

    #[test]
    fn test_combined_disjunction() {
        let set = predicates(&["user-regular", "community-regular", "community-auto"]);
        let plan = build_plan(&offset_spec(&set), &Relations::default(), true).unwrap();

        assert!(plan.sql.contains(
            "FROM content_items WHERE ((source_type = $1) OR (source_type = $2 AND creator_id <> $3))"
        ));
        assert_eq!(
            plan.params,
            vec![
                SqlParam::Text("regular".into()),
                SqlParam::Text("auto".into()),
                SqlParam::BigInt(7),
            ]
        );
    }

    #[test]
    fn test_filters_are_pushed_into_where() {
        let set = resolve(&FilterRequest {
            tags: vec!["b".into(), "a".into()],
            tag_match: TagMatch::All,
            search_term: Some("50%_off\\".into()),
            quality: QualityRange {
                min: Some(0.5),
                max: None,
            },
            ..Default::default()
        })
        .unwrap();
        let plan = build_plan(&offset_spec(&set), &Relations::default(), true).unwrap();

        assert!(plan
            .sql
            .contains("WHERE tags @> $1::text[] AND title ILIKE $2 AND quality_score >= $3"));
        assert_eq!(
            plan.params,
            vec![
                SqlParam::TextArray(vec!["a".into(), "b".into()]),
                SqlParam::Text("%50\\%\\_off\\\\%".into()),
                SqlParam::Float(0.5),
            ]
        );
    }

    #[test]
    fn test_keyset_plan_has_no_count_and_no_offset() {
        let set = predicates(&["user-regular"]);
        let position = KeysetPosition {
            value: SortValue::Text("m".into()),
            id: 10,
            source_type: SourceType::Regular,
        };
        let spec = FetchSpec {
            predicates: &set,
            sort: Sort::new(SortField::Title, OrderDirection::Desc),
            window: FetchWindow::Keyset {
                after: Some(position),
                direction: PageDirection::Forward,
                limit: 21,
            },
            count: CountStrategy::Omitted,
        };
        let plan = build_plan(&spec, &Relations::default(), false).unwrap();

        assert!(plan.sql.contains("NULL::BIGINT AS total_count"));
        assert!(!plan.sql.contains("OVER()"));
        assert!(!plan.sql.contains("OFFSET"));
        assert!(plan.sql.contains(
            "WHERE creator_id = $1 AND ((title, id, source_type) < ($2, $3, $4)) \
             ORDER BY title DESC NULLS LAST, id DESC, source_type DESC LIMIT 21"
        ));
        assert_eq!(plan.params.len(), 4);
    }

    #[test]
    fn test_nullable_keyset_predicates() {
        let set = predicates(&["user-regular", "community-regular"]);
        let sort = Sort::new(SortField::QualityScore, OrderDirection::Asc);
        let set = &set;
        let spec_for = move |value: SortValue, direction: PageDirection| FetchSpec {
            predicates: set,
            sort,
            window: FetchWindow::Keyset {
                after: Some(KeysetPosition {
                    value,
                    id: 3,
                    source_type: SourceType::Regular,
                }),
                direction,
                limit: 11,
            },
            count: CountStrategy::Omitted,
        };

        let forward = build_plan(&spec_for(SortValue::Float(0.4), PageDirection::Forward), &Relations::default(), false).unwrap();
        assert!(forward.sql.contains(
            "(quality_score > $1 OR (quality_score = $1 AND (id, source_type) < ($2, $3)) OR quality_score IS NULL)"
        ));

        let in_nulls = build_plan(&spec_for(SortValue::Null, PageDirection::Forward), &Relations::default(), false).unwrap();
        assert!(in_nulls
            .sql
            .contains("(quality_score IS NULL AND (id, source_type) < ($1, $2))"));

        let backward = build_plan(&spec_for(SortValue::Null, PageDirection::Backward), &Relations::default(), false).unwrap();
        assert!(backward
            .sql
            .contains("(quality_score IS NOT NULL OR (id, source_type) > ($1, $2))"));
        assert!(backward
            .sql
            .contains("ORDER BY quality_score DESC NULLS FIRST, id ASC, source_type ASC"));
    }

    #[test]
    fn test_estimate_plan() {
        let set = predicates(&["community-regular"]);
        let plan = build_estimate_plan(&offset_spec(&set), &Relations::default()).unwrap();
        assert_eq!(
            plan.sql,
            "EXPLAIN (FORMAT JSON) SELECT 1 FROM content_items_regular WHERE creator_id <> $1"
        );
        assert_eq!(plan.kind, PlanKind::Estimate);
    }

    #[test]
    fn test_custom_relation_names() {
        let relations = Relations {
            combined: "feed".into(),
            regular: "feed_regular".into(),
            auto: "feed_auto".into(),
        };
        let set = predicates(&["user-regular", "community-regular"]);
        let plan = build_plan(&offset_spec(&set), &relations, true).unwrap();
        assert!(plan.sql.contains("FROM feed_regular ORDER BY"));
    }

    #[test]
    fn test_configured_relation_names() {
        let relations = Relations::new("media.items", "media.items_regular", "items_auto").unwrap();
        assert_eq!(relations.for_target(PartitionTarget::Combined), "media.items");
        assert_eq!(
            relations.for_target(PartitionTarget::Single(SourceType::Auto)),
            "items_auto"
        );

        assert!(Relations::new("items; DROP TABLE x", "a", "b").is_err());
        assert!(Relations::new("", "a", "b").is_err());
        assert!(Relations::new("a.b.c", "a", "b").is_err());
        assert!(Relations::new("items", "1items", "b").is_err());
    }
}
