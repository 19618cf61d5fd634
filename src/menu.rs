//! Interactive query menu.
//!
//! [`QuerySession`] drives the six-choice menu over any line reader and
//! writer, so the binary wires it to stdin/stdout and tests script it with
//! byte buffers. End of input at any prompt ends the session cleanly.
//!
//! Input mistakes (unknown choice, bad N, bad year) print a notice and
//! reprompt. Store failures propagate and end the session.

use std::io::{BufRead, Write};
use std::ops::ControlFlow;

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};

use crate::analytics::{
    self, ProductRating, QueryError, ReviewTimeline, ReviewerActivity, SuspiciousReview,
    YearCollector, YearInput,
};
use crate::store::DocumentStore;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Query(#[from] QueryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Menu, prompts and human-readable reports.
    #[default]
    Text,
    /// No menu or prompts; one JSON object per result or notice.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    ProductRating,
    TopProducts,
    ActiveReviewers,
    ReviewsOverTime,
    SuspiciousReviews,
    Exit,
}

impl MenuChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(Self::ProductRating),
            "2" => Some(Self::TopProducts),
            "3" => Some(Self::ActiveReviewers),
            "4" => Some(Self::ReviewsOverTime),
            "5" => Some(Self::SuspiciousReviews),
            "6" => Some(Self::Exit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProductRating => "product_rating",
            Self::TopProducts => "top_products",
            Self::ActiveReviewers => "active_reviewers",
            Self::ReviewsOverTime => "reviews_over_time",
            Self::SuspiciousReviews => "suspicious_reviews",
            Self::Exit => "exit",
        }
    }
}

const MENU: &str = "\nReview Query Interface
1. Get product rating by ASIN
2. Find top N products
3. List most active reviewers
4. Show reviews over time
5. Flag suspicious reviews
6. Exit";

/// Parse the top-N answer; the error is the notice to show.
pub fn parse_top_n(input: &str) -> Result<i64, &'static str> {
    let n: i64 = input
        .trim()
        .parse()
        .map_err(|_| "Please enter a valid number.")?;
    if n < 1 {
        return Err("Please enter a positive integer.");
    }
    Ok(n)
}

pub struct QuerySession<'a, S: DocumentStore + ?Sized, R, W> {
    store: &'a S,
    collection: &'a str,
    input: R,
    out: W,
    format: OutputFormat,
}

impl<'a, S, R, W> QuerySession<'a, S, R, W>
where
    S: DocumentStore + ?Sized,
    R: BufRead,
    W: Write,
{
    pub fn new(store: &'a S, collection: &'a str, input: R, out: W, format: OutputFormat) -> Self {
        Self {
            store,
            collection,
            input,
            out,
            format,
        }
    }

    /// Run until the user exits or input ends.
    pub fn run(&mut self) -> Result<(), SessionError> {
        loop {
            if self.format == OutputFormat::Text {
                writeln!(self.out, "{MENU}")?;
            }
            let Some(line) = self.prompt("\nEnter your choice (1-6): ")? else {
                debug!("input closed at menu");
                return Ok(());
            };
            let Some(choice) = MenuChoice::parse(&line) else {
                self.notice("Invalid choice. Please try again.")?;
                continue;
            };
            info!(choice = choice.as_str(), "Menu selection");
            if self.dispatch(choice)?.is_break() {
                return Ok(());
            }
        }
    }

    fn dispatch(&mut self, choice: MenuChoice) -> Result<ControlFlow<()>, SessionError> {
        match choice {
            MenuChoice::ProductRating => {
                let Some(asin) = self.prompt("Enter product ASIN: ")? else {
                    return Ok(ControlFlow::Break(()));
                };
                let asin = asin.trim();
                let rating = analytics::query_product_rating(self.store, self.collection, asin)?;
                self.show_product_rating(asin, rating.as_ref())?;
            }
            MenuChoice::TopProducts => {
                let Some(raw) = self.prompt("Enter number of top products to show: ")? else {
                    return Ok(ControlFlow::Break(()));
                };
                match parse_top_n(&raw) {
                    Ok(n) => {
                        let top = analytics::query_top_products(self.store, self.collection, n)?;
                        self.show_top_products(n, &top)?;
                    }
                    Err(msg) => self.notice(msg)?,
                }
            }
            MenuChoice::ActiveReviewers => {
                let rows = analytics::query_active_reviewers(self.store, self.collection)?;
                self.show_active_reviewers(&rows)?;
            }
            MenuChoice::ReviewsOverTime => {
                let Some(asin) = self.prompt("Enter product ASIN: ")? else {
                    return Ok(ControlFlow::Break(()));
                };
                let asin = asin.trim().to_string();
                let years = self.collect_years()?;
                if years.is_empty() {
                    self.notice("No valid years provided.")?;
                } else {
                    let timeline = analytics::query_reviews_over_time(
                        self.store,
                        self.collection,
                        &asin,
                        &years,
                    )?;
                    self.show_timeline(&timeline)?;
                }
            }
            MenuChoice::SuspiciousReviews => {
                let rows = analytics::query_suspicious_reviews(self.store, self.collection)?;
                self.show_suspicious(&rows)?;
            }
            MenuChoice::Exit => {
                match self.format {
                    OutputFormat::Text => writeln!(self.out, "Goodbye!")?,
                    OutputFormat::Json => self.emit(json!({ "operation": "exit" }))?,
                }
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Ask for up to five distinct years. Closed input stops collection
    /// like an empty line.
    fn collect_years(&mut self) -> Result<Vec<i32>, SessionError> {
        let mut collector = YearCollector::new();
        while !collector.is_done() {
            let prompt = format!("Enter year {} (or press Enter to stop): ", collector.next_slot());
            let Some(line) = self.prompt(&prompt)? else {
                break;
            };
            match collector.feed(&line) {
                YearInput::Duplicate(year) => {
                    self.notice(&format!("You already entered {year}. Skipping duplicate."))?;
                }
                YearInput::Invalid(_) => {
                    self.notice("Invalid input. Please enter a numeric year or press Enter to stop.")?;
                }
                YearInput::Accepted(_) | YearInput::Finished => {}
            }
        }
        Ok(collector.finish())
    }

    // -- I/O helpers -------------------------------------------------------

    /// Show `text` (text mode only) and read one line. `None` on end of input.
    fn prompt(&mut self, text: &str) -> Result<Option<String>, SessionError> {
        if self.format == OutputFormat::Text {
            write!(self.out, "{text}")?;
            self.out.flush()?;
        }
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    fn notice(&mut self, msg: &str) -> Result<(), SessionError> {
        match self.format {
            OutputFormat::Text => writeln!(self.out, "{msg}")?,
            OutputFormat::Json => self.emit(json!({ "notice": msg }))?,
        }
        Ok(())
    }

    fn emit(&mut self, value: Value) -> Result<(), SessionError> {
        writeln!(self.out, "{value}")?;
        self.out.flush()?;
        Ok(())
    }

    fn emit_result(
        &mut self,
        op: MenuChoice,
        extra: Value,
        result: impl Serialize,
    ) -> Result<(), SessionError> {
        let mut obj = json!({ "operation": op.as_str() });
        if let (Value::Object(dst), Value::Object(src)) = (&mut obj, extra) {
            dst.extend(src);
        }
        obj["result"] = serde_json::to_value(result).map_err(std::io::Error::other)?;
        self.emit(obj)
    }

    // -- Rendering ---------------------------------------------------------

    fn show_product_rating(
        &mut self,
        asin: &str,
        rating: Option<&ProductRating>,
    ) -> Result<(), SessionError> {
        if self.format == OutputFormat::Json {
            return self.emit_result(MenuChoice::ProductRating, json!({ "asin": asin }), rating);
        }
        let out = &mut self.out;
        match rating {
            Some(r) => {
                writeln!(out, "\nProduct ASIN: {asin}")?;
                writeln!(out, "Average Rating: {}", fmt_avg(r.average_rating))?;
                writeln!(out, "Total Reviews: {}", r.total_reviews)?;
            }
            None => writeln!(out, "No reviews found for product with ASIN: {asin}")?,
        }
        Ok(())
    }

    fn show_top_products(&mut self, n: i64, rows: &[ProductRating]) -> Result<(), SessionError> {
        if self.format == OutputFormat::Json {
            return self.emit_result(MenuChoice::TopProducts, json!({ "n": n }), rows);
        }
        let out = &mut self.out;
        writeln!(out, "\nTop {n} Products:")?;
        if rows.is_empty() {
            writeln!(out, "No products found in the database.")?;
        }
        for (i, p) in rows.iter().enumerate() {
            writeln!(out, "{}. ASIN: {}", i + 1, p.asin)?;
            writeln!(out, "   Average Rating: {}", fmt_avg(p.average_rating))?;
            writeln!(out, "   Total Reviews: {}", p.total_reviews)?;
        }
        Ok(())
    }

    fn show_active_reviewers(&mut self, rows: &[ReviewerActivity]) -> Result<(), SessionError> {
        if self.format == OutputFormat::Json {
            return self.emit_result(MenuChoice::ActiveReviewers, json!({}), rows);
        }
        let out = &mut self.out;
        writeln!(out, "\nMost Active Reviewers:")?;
        if rows.is_empty() {
            writeln!(out, "No reviewers found.")?;
        }
        for (i, r) in rows.iter().enumerate() {
            writeln!(out, "{}. Reviewer ID: {}", i + 1, r.reviewer_id)?;
            writeln!(out, "   Name: {}", r.reviewer_name.as_deref().unwrap_or("N/A"))?;
            writeln!(out, "   Total Reviews: {}", r.total_reviews)?;
        }
        Ok(())
    }

    fn show_timeline(&mut self, timeline: &ReviewTimeline) -> Result<(), SessionError> {
        if self.format == OutputFormat::Json {
            return self.emit_result(
                MenuChoice::ReviewsOverTime,
                json!({ "asin": timeline.asin }),
                &timeline.years,
            );
        }
        let out = &mut self.out;
        writeln!(out, "\nReviews over time for product {}:", timeline.asin)?;
        for y in &timeline.years {
            writeln!(out, "{}: {} reviews", y.year, y.count)?;
        }
        Ok(())
    }

    fn show_suspicious(&mut self, rows: &[SuspiciousReview]) -> Result<(), SessionError> {
        if self.format == OutputFormat::Json {
            let rows: Vec<Value> = rows
                .iter()
                .map(|r| {
                    json!({
                        "asin": r.asin,
                        "overall": r.overall,
                        "helpful": r.helpful,
                        "helpfulness_ratio": r.helpfulness_ratio,
                        "helpfulness_pct": r.ratio_pct(),
                        "text_sample": r.text_sample(),
                    })
                })
                .collect();
            return self.emit_result(MenuChoice::SuspiciousReviews, json!({}), rows);
        }
        let out = &mut self.out;
        writeln!(
            out,
            "\nTop 10 Suspicious Reviews (rating >= 4.5, <10% found it helpful):"
        )?;
        if rows.is_empty() {
            writeln!(out, "No suspicious reviews found.")?;
        }
        for (i, r) in rows.iter().enumerate() {
            writeln!(out, "\n{}. ASIN: {}", i + 1, r.asin.as_deref().unwrap_or("N/A"))?;
            match r.overall {
                Some(v) => writeln!(out, "   Rating: {v:?}")?,
                None => writeln!(out, "   Rating: N/A")?,
            }
            writeln!(
                out,
                "   Helpfulness (unhelpful, helpful): {}",
                fmt_helpful(&r.helpful)
            )?;
            writeln!(out, "   Helpfulness Ratio: {}", r.ratio_pct())?;
            writeln!(out, "   Review Text: {}", r.text_sample())?;
        }
        Ok(())
    }
}

fn fmt_avg(avg: Option<f64>) -> String {
    avg.map_or_else(|| "N/A".to_string(), |v| format!("{v:.2}"))
}

/// `[95, 5]` style, matching how the pair was stored.
fn fmt_helpful(v: &Value) -> String {
    match v {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(Value::to_string).collect();
            format!("[{}]", parts.join(", "))
        }
        other => other.to_string(),
    }
}
