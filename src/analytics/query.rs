//! Pipeline builders and runners for the five review analytics.
//!
//! Each operation is split in two: a pure `*_pipeline` builder returning the
//! stage list, and a `query_*` runner that executes it against any
//! [`DocumentStore`] and decodes the rows. Runners validate their arguments
//! before touching the store.

use serde_json::Value;
use tracing::debug;

use super::bucketing::{fill_requested_years, review_year_expr};
use super::derive::{SUSPICIOUS_MAX_RATIO, SUSPICIOUS_MIN_RATING};
use super::types::*;
use crate::pipeline::{Accumulator, CmpOp, Expr, Filter, Pipeline, Projection, SortOrder};
use crate::store::DocumentStore;

/// Fixed size of the reviewer and suspicious-review reports.
pub const REPORT_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rating_accumulators() -> [(&'static str, Accumulator); 2] {
    [
        ("average_rating", Accumulator::Avg(Expr::field("overall"))),
        ("total_reviews", Accumulator::count()),
    ]
}

fn unhelpful_votes() -> Expr {
    Expr::elem_at(Expr::field("helpful"), 0)
}

fn helpful_votes() -> Expr {
    Expr::elem_at(Expr::field("helpful"), 1)
}

fn total_votes() -> Expr {
    Expr::add([unhelpful_votes(), helpful_votes()])
}

fn run<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
    op: &'static str,
    pipeline: &Pipeline,
) -> QueryResult<Vec<Value>> {
    debug!(op, collection, pipeline = %pipeline, "Executing analytics pipeline");
    let rows = store.aggregate(collection, pipeline)?;
    debug!(op, rows = rows.len(), "Pipeline returned");
    Ok(rows)
}

fn rating_row(row: &Value) -> ProductRating {
    ProductRating {
        asin: key_text(&row["_id"]),
        average_rating: row["average_rating"].as_f64(),
        total_reviews: int_field(row, "total_reviews"),
    }
}

// ---------------------------------------------------------------------------
// 1. Product rating summary
// ---------------------------------------------------------------------------

pub fn product_rating_pipeline(asin: &str) -> Pipeline {
    Pipeline::new()
        .filter(Filter::eq("asin", asin))
        .group(Expr::field("asin"), rating_accumulators())
}

/// Average rating and review count for `asin`; `None` when it has no reviews.
pub fn query_product_rating<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
    asin: &str,
) -> QueryResult<Option<ProductRating>> {
    let rows = run(store, collection, "product_rating", &product_rating_pipeline(asin))?;
    Ok(rows.first().map(rating_row))
}

// ---------------------------------------------------------------------------
// 2. Top-N products
// ---------------------------------------------------------------------------

/// Ties on average rating are broken by ASIN ascending.
pub fn top_products_pipeline(n: usize) -> Pipeline {
    Pipeline::new()
        .group(Expr::field("asin"), rating_accumulators())
        .sort([
            ("average_rating", SortOrder::Descending),
            ("_id", SortOrder::Ascending),
        ])
        .limit(n)
}

/// The `n` best-rated products. `n` must be positive.
pub fn query_top_products<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
    n: i64,
) -> QueryResult<Vec<ProductRating>> {
    let limit = usize::try_from(n)
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| QueryError::InvalidArgument(format!("n must be a positive integer, got {n}")))?;
    let rows = run(store, collection, "top_products", &top_products_pipeline(limit))?;
    Ok(rows.iter().map(rating_row).collect())
}

// ---------------------------------------------------------------------------
// 3. Most active reviewers
// ---------------------------------------------------------------------------

/// Ties on review count are broken by reviewer id ascending.
pub fn active_reviewers_pipeline() -> Pipeline {
    Pipeline::new()
        .group(
            Expr::field("reviewerID"),
            [
                ("reviewer_name", Accumulator::First(Expr::field("reviewerName"))),
                ("total_reviews", Accumulator::count()),
            ],
        )
        .sort([
            ("total_reviews", SortOrder::Descending),
            ("_id", SortOrder::Ascending),
        ])
        .limit(REPORT_LIMIT)
}

pub fn query_active_reviewers<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
) -> QueryResult<Vec<ReviewerActivity>> {
    let rows = run(store, collection, "active_reviewers", &active_reviewers_pipeline())?;
    Ok(rows
        .iter()
        .map(|row| ReviewerActivity {
            reviewer_id: key_text(&row["_id"]),
            reviewer_name: row["reviewer_name"].as_str().map(str::to_string),
            total_reviews: int_field(row, "total_reviews"),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// 4. Reviews over time
// ---------------------------------------------------------------------------

pub fn reviews_by_year_pipeline(asin: &str) -> Pipeline {
    Pipeline::new()
        .filter(Filter::eq("asin", asin))
        .project([("year", Projection::Computed(review_year_expr()))])
        .group(Expr::field("year"), [("count", Accumulator::count())])
        .sort([("_id", SortOrder::Ascending)])
}

/// Review counts of `asin` for each requested year, 0 where it had none.
///
/// An empty `years` list is rejected without querying.
pub fn query_reviews_over_time<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
    asin: &str,
    years: &[i32],
) -> QueryResult<ReviewTimeline> {
    if years.is_empty() {
        return Err(QueryError::InvalidArgument("no valid years provided".into()));
    }
    let rows = run(store, collection, "reviews_over_time", &reviews_by_year_pipeline(asin))?;
    Ok(ReviewTimeline {
        asin: asin.to_string(),
        years: fill_requested_years(years, &rows),
    })
}

// ---------------------------------------------------------------------------
// 5. Suspicious reviews
// ---------------------------------------------------------------------------

/// High ratings whose helpfulness ratio is under 10%.
///
/// The zero-vote guard runs as its own match stage before the ratio is
/// projected, so the divide never sees a zero denominator.
pub fn suspicious_reviews_pipeline() -> Pipeline {
    Pipeline::new()
        .filter(Filter::and([
            Filter::gte("overall", SUSPICIOUS_MIN_RATING),
            Filter::exists("helpful"),
            Filter::size("helpful", 2),
        ]))
        .filter(Filter::expr(Expr::cmp(CmpOp::Gt, total_votes(), Expr::lit(0))))
        .project([
            ("asin", Projection::Include),
            ("overall", Projection::Include),
            ("helpful", Projection::Include),
            ("reviewText", Projection::Include),
            (
                "helpfulness_ratio",
                Projection::Computed(Expr::divide(helpful_votes(), total_votes())),
            ),
        ])
        .filter(Filter::lt("helpfulness_ratio", SUSPICIOUS_MAX_RATIO))
        .sort([("helpfulness_ratio", SortOrder::Ascending)])
        .limit(REPORT_LIMIT)
}

pub fn query_suspicious_reviews<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
) -> QueryResult<Vec<SuspiciousReview>> {
    let rows = run(store, collection, "suspicious_reviews", &suspicious_reviews_pipeline())?;
    Ok(rows
        .iter()
        .map(|row| SuspiciousReview {
            asin: row.get("asin").map(key_text),
            overall: row.get("overall").and_then(Value::as_f64),
            helpful: row.get("helpful").cloned().unwrap_or(Value::Null),
            helpfulness_ratio: row
                .get("helpfulness_ratio")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            review_text: row
                .get("reviewText")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
