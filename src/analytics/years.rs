//! Interactive year selection for the review timeline.
//!
//! [`YearCollector`] is a small state machine fed one raw input line at a
//! time. It stays `Collecting` until it holds [`MAX_YEARS`] distinct years or
//! receives an empty line. Duplicates and non-numeric input are reported but
//! do not use up a slot.

/// Most years a single timeline request may ask for.
pub const MAX_YEARS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Collecting,
    Done,
}

/// What the collector made of one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearInput {
    /// New year stored in the next slot.
    Accepted(i32),
    /// Year already collected; slot not consumed.
    Duplicate(i32),
    /// Not an integer year; slot not consumed.
    Invalid(String),
    /// Collection is over (empty line, or all slots were already used).
    Finished,
}

#[derive(Debug, Clone)]
pub struct YearCollector {
    state: CollectorState,
    years: Vec<i32>,
    limit: usize,
}

impl Default for YearCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl YearCollector {
    pub fn new() -> Self {
        Self::with_limit(MAX_YEARS)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            state: if limit == 0 {
                CollectorState::Done
            } else {
                CollectorState::Collecting
            },
            years: Vec::with_capacity(limit),
            limit,
        }
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == CollectorState::Done
    }

    /// 1-based number of the slot the next accepted year would fill.
    pub fn next_slot(&self) -> usize {
        self.years.len() + 1
    }

    /// Years accepted so far, in entry order.
    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn feed(&mut self, raw: &str) -> YearInput {
        if self.is_done() {
            return YearInput::Finished;
        }
        let input = raw.trim();
        if input.is_empty() {
            self.state = CollectorState::Done;
            return YearInput::Finished;
        }
        let Ok(year) = input.parse::<i32>() else {
            return YearInput::Invalid(input.to_string());
        };
        if self.years.contains(&year) {
            return YearInput::Duplicate(year);
        }
        self.years.push(year);
        if self.years.len() >= self.limit {
            self.state = CollectorState::Done;
        }
        YearInput::Accepted(year)
    }

    /// Stop collecting (e.g. input stream closed) and hand over the years.
    pub fn finish(self) -> Vec<i32> {
        self.years
    }
}
