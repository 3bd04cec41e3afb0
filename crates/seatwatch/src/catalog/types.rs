/// Types for course queries and scraped seat data
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An academic term. Each term starts in a fixed month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    Fall,
    Winter,
    Summer,
}

impl Term {
    /// Month the term starts in (1-based).
    pub fn month(self) -> u32 {
        match self {
            Term::Winter => 1,
            Term::Summer => 5,
            Term::Fall => 9,
        }
    }

    /// Two-digit month code used in the catalog's `term_in` parameter.
    pub fn month_code(self) -> &'static str {
        match self {
            Term::Winter => "01",
            Term::Summer => "05",
            Term::Fall => "09",
        }
    }

    /// Returns the `YYYYMM` catalog key for the next occurrence of this term.
    ///
    /// Past terms are never interesting, so if `today` is already past the
    /// term's starting month the term is assumed to be next year's.
    /// Asking about Winter in December gives January of next year.
    pub fn catalog_key(self, today: NaiveDate) -> String {
        let year = if today.month() > self.month() {
            today.year() + 1
        } else {
            today.year()
        };
        format!("{}{}", year, self.month_code())
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Term::Fall => "Fall",
            Term::Winter => "Winter",
            Term::Summer => "Summer",
        };
        f.write_str(name)
    }
}

impl FromStr for Term {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fall" => Ok(Term::Fall),
            "winter" => Ok(Term::Winter),
            "summer" => Ok(Term::Summer),
            other => Err(format!("unknown term '{other}' (expected Fall, Winter or Summer)")),
        }
    }
}

/// The section a user wants to watch, e.g. SENG 275 A01 in the Fall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseQuery {
    pub subject_code: String,
    pub course_number: u32,
    pub section: String,
    pub term: Term,
}

impl CourseQuery {
    /// Builds a query, normalising subject code and section to upper case.
    pub fn new(subject_code: &str, course_number: u32, section: &str, term: Term) -> Self {
        Self {
            subject_code: subject_code.trim().to_uppercase(),
            course_number,
            section: section.trim().to_uppercase(),
            term,
        }
    }
}

impl fmt::Display for CourseQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.subject_code, self.course_number, self.section
        )
    }
}

/// Capacity / actual / remaining, in the order the catalog lists them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatCounts {
    pub capacity: u32,
    pub actual: u32,
    pub remaining: u32,
}

impl SeatCounts {
    pub fn new(capacity: u32, actual: u32, remaining: u32) -> Self {
        Self {
            capacity,
            actual,
            remaining,
        }
    }
}

/// Seat and waitlist counts for one section at one point in time.
///
/// Values are taken as the page reports them; `remaining = capacity - actual`
/// is not checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatSnapshot {
    pub seats: SeatCounts,
    pub waitlist: SeatCounts,
}

impl SeatSnapshot {
    /// The all-zero snapshot reported for a missing section under the `zero` policy.
    pub fn zero() -> Self {
        Self::default()
    }
}

impl fmt::Display for SeatSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, counts) in [("Seats", self.seats), ("Waitlist", self.waitlist)] {
            writeln!(f, "{label}")?;
            writeln!(f, "\tCapacity:  {}", counts.capacity)?;
            writeln!(f, "\tActual:  {}", counts.actual)?;
            writeln!(f, "\tRemaining:  {}", counts.remaining)?;
        }
        Ok(())
    }
}
