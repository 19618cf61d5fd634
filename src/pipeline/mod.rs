//! Declarative aggregation pipelines.
//!
//! A pipeline is an ordered list of stage descriptors (match, group, sort,
//! limit, project). Building one is pure; executing one is the store's job.
//!
//! # Module structure
//!
//! - [`expr`] — expressions and match filters
//! - [`stage`] — stage descriptors and the [`Pipeline`] builder
//! - [`eval`] — in-process evaluator shared by the bundled stores

pub mod eval;
pub mod expr;
pub mod stage;

pub use eval::{EvalError, EvalResult, run_pipeline};
pub use expr::{CmpOp, Expr, Filter};
pub use stage::{Accumulator, Pipeline, Projection, SortOrder, Stage};
