//! Review analytics over a document store.
//!
//! Builds the aggregation pipelines behind the interactive menu and decodes
//! their rows into typed results.
//!
//! # Module structure
//!
//! - [`types`] — result rows and the error type
//! - [`bucketing`] — UTC calendar years of review timestamps
//! - [`derive`] — helpfulness ratio, percentages, text samples
//! - [`years`] — interactive year collection state machine
//! - [`query`] — pipeline builders and store runners

pub mod bucketing;
pub mod derive;
pub mod query;
pub mod types;
pub mod years;

pub use query::{
    query_active_reviewers, query_product_rating, query_reviews_over_time,
    query_suspicious_reviews, query_top_products,
};
pub use types::{
    ProductRating, QueryError, QueryResult, ReviewTimeline, ReviewerActivity, SuspiciousReview,
    YearCount,
};
pub use years::{MAX_YEARS, YearCollector, YearInput};
