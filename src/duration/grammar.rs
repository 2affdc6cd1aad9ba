//! Recursive-descent rules for duration expressions.
//!
//! ```text
//! duration       <- exact_duration EOF / free_appx EOF
//! exact_duration <- hedge_mark? interval unit
//! interval       <- number (separator number)?
//! number         <- numeral / number_word
//! unit           <- hour / minute / second
//! ```
//!
//! Whitespace between tokens is skipped. Choices are ordered and never
//! revisited once an alternative has matched.

use std::sync::LazyLock;

use regex::Regex;

use super::tables::{APPROXIMATIONS, HEDGE_MARKS, INTERVAL_SEPARATORS, NUMBER_WORDS};

static NUMERAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]*\.?[0-9]*").unwrap());
static HOUR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i:hours|hour|hrs|hr|h)").unwrap());
static MINUTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i:minutes|minute|mins|min|m)").unwrap());
static SECOND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i:seconds|second|secs|sec|s)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Hour,
    Minute,
    Second,
}

impl Unit {
    pub fn seconds(self) -> f64 {
        match self {
            Unit::Hour => 3600.0,
            Unit::Minute => 60.0,
            Unit::Second => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interval {
    Single(f64),
    Range(f64, f64),
}

impl Interval {
    /// A range counts as its midpoint.
    pub fn value(self) -> f64 {
        match self {
            Interval::Single(v) => v,
            Interval::Range(lo, hi) => (lo + hi) / 2.0,
        }
    }
}

/// Parse tree of a recognized duration.
#[derive(Debug, Clone, PartialEq)]
pub enum DurationExpr {
    Exact {
        hedge: Option<&'static str>,
        interval: Interval,
        unit: Unit,
    },
    Approximate {
        phrase: &'static str,
        seconds: f64,
    },
}

impl DurationExpr {
    pub fn seconds(&self) -> f64 {
        match self {
            DurationExpr::Exact { interval, unit, .. } => interval.value() * unit.seconds(),
            DurationExpr::Approximate { seconds, .. } => *seconds,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn literal(&mut self, lit: &str) -> bool {
        self.skip_ws();
        match self.rest.strip_prefix(lit) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    fn pattern(&mut self, re: &Regex) -> Option<&'a str> {
        self.skip_ws();
        let m = re.find(self.rest)?;
        if m.is_empty() {
            return None;
        }
        let (token, rest) = self.rest.split_at(m.end());
        self.rest = rest;
        Some(token)
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.rest.is_empty()
    }
}

/// Match `input` (already normalized) against the whole grammar.
pub fn duration(input: &str) -> Option<DurationExpr> {
    let cursor = Cursor { rest: input };
    exact_duration(cursor).or_else(|| free_approximation(cursor))
}

fn exact_duration(mut cur: Cursor) -> Option<DurationExpr> {
    let hedge = hedge_mark(&mut cur);
    let interval = interval(&mut cur)?;
    let unit = unit(&mut cur)?;
    if !cur.at_end() {
        return None;
    }
    Some(DurationExpr::Exact {
        hedge,
        interval,
        unit,
    })
}

fn free_approximation(cur: Cursor) -> Option<DurationExpr> {
    APPROXIMATIONS.iter().find_map(|&(phrase, seconds)| {
        let mut look = cur;
        (look.literal(phrase) && look.at_end())
            .then_some(DurationExpr::Approximate { phrase, seconds })
    })
}

fn hedge_mark(cur: &mut Cursor) -> Option<&'static str> {
    HEDGE_MARKS.iter().copied().find(|mark| cur.literal(mark))
}

fn interval(cur: &mut Cursor) -> Option<Interval> {
    let first = number(cur)?;

    let mut look = *cur;
    if INTERVAL_SEPARATORS.iter().any(|sep| look.literal(sep)) {
        if let Some(second) = number(&mut look) {
            *cur = look;
            return Some(Interval::Range(first, second));
        }
    }
    Some(Interval::Single(first))
}

fn number(cur: &mut Cursor) -> Option<f64> {
    let mut look = *cur;
    if let Some(token) = look.pattern(&NUMERAL_RE) {
        // "." alone is a numeral token but not a number
        let value = token.parse::<f64>().ok()?;
        *cur = look;
        return Some(value);
    }
    NUMBER_WORDS
        .iter()
        .find(|(word, _)| cur.literal(word))
        .map(|&(_, value)| value)
}

fn unit(cur: &mut Cursor) -> Option<Unit> {
    [
        (&*HOUR_RE, Unit::Hour),
        (&*MINUTE_RE, Unit::Minute),
        (&*SECOND_RE, Unit::Second),
    ]
    .into_iter()
    .find_map(|(re, unit)| cur.pattern(re).map(|_| unit))
}
