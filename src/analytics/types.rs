//! Shared types for the review analytics.
//!
//! Result rows are plain serializable structs so the interactive menu can
//! render them as text or as JSON.

use serde::Serialize;
use serde_json::Value;

use crate::store::StoreError;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Analytics-specific error.
#[derive(Debug)]
pub enum QueryError {
    /// An argument was rejected before any pipeline ran.
    InvalidArgument(String),
    /// The store failed to run the pipeline.
    Store(StoreError),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Store(e) => write!(f, "analytics query failed: {e}"),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidArgument(_) => None,
            Self::Store(e) => Some(e),
        }
    }
}

impl From<StoreError> for QueryError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Convenience alias.
pub type QueryResult<T> = std::result::Result<T, QueryError>;

// ---------------------------------------------------------------------------
// Result rows
// ---------------------------------------------------------------------------

/// Average rating and review count of one product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRating {
    pub asin: String,
    /// `None` when none of the product's reviews carry a numeric rating.
    pub average_rating: Option<f64>,
    pub total_reviews: i64,
}

/// One reviewer and how many reviews they wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewerActivity {
    pub reviewer_id: String,
    /// Name on the reviewer's first stored review, if it had one.
    pub reviewer_name: Option<String>,
    pub total_reviews: i64,
}

/// Review count of a product in one calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearCount {
    pub year: i32,
    pub count: i64,
}

/// Reviews of a product for the requested years, in request order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewTimeline {
    pub asin: String,
    pub years: Vec<YearCount>,
}

/// A highly rated review that almost nobody found helpful.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspiciousReview {
    pub asin: Option<String>,
    pub overall: Option<f64>,
    /// `[unhelpful_votes, helpful_votes]` exactly as stored.
    pub helpful: Value,
    pub helpfulness_ratio: f64,
    pub review_text: Option<String>,
}

impl SuspiciousReview {
    /// First characters of the review text followed by a truncation marker.
    pub fn text_sample(&self) -> String {
        super::derive::text_sample(self.review_text.as_deref().unwrap_or(""))
    }

    /// Ratio as a percentage string, e.g. `5.00%`.
    pub fn ratio_pct(&self) -> String {
        super::derive::format_pct(self.helpfulness_ratio)
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

/// Render a group key or field as display text. Strings are shown bare,
/// anything else (numbers, null from a missing key) as JSON.
pub(crate) fn key_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn int_field(row: &Value, name: &str) -> i64 {
    row.get(name)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(0)
}
