pub mod grammar;
pub mod tables;

use std::time::Duration;

pub use grammar::{DurationExpr, Interval, Unit};

/// The text is not one of the recognized duration shapes.
///
/// This is a classification outcome, not a failure of the parser: callers use
/// it to collect the raw strings that need manual handling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no duration pattern matches {input:?}")]
pub struct NoMatch {
    pub input: String,
}

/// A recognized duration, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ParsedDuration(f64);

impl ParsedDuration {
    pub fn seconds(self) -> f64 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::try_from_secs_f64(self.0).unwrap_or(Duration::MAX)
    }
}

/// Parser for the free-text "Duration" field of sighting reports.
///
/// Holds no state; one instance can be shared across threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct DurationParser;

impl DurationParser {
    pub fn new() -> Self {
        DurationParser
    }

    pub fn parse_tree(&self, text: &str) -> Result<DurationExpr, NoMatch> {
        let input = normalize(text);
        grammar::duration(&input).ok_or(NoMatch { input })
    }

    pub fn parse(&self, text: &str) -> Result<ParsedDuration, NoMatch> {
        self.parse_tree(text).map(|expr| ParsedDuration(expr.seconds()))
    }
}

/// Lower-case, trim and collapse runs of whitespace.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
