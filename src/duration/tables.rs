//! Fixed vocabularies of the duration grammar.
//!
//! Every list is an ordered choice: the first entry that matches wins, so a
//! spelling must come before any of its own prefixes.

pub const HEDGE_MARKS: &[&str] = &[
    "~", ">", "<", "around", "approximately", "approx.", "approx", "aprox.", "aprox",
    "appx.", "appx", "app.", "app", "apx.", "apx", "about", "at least", "over",
    "more than", "less than", "abt",
];

pub const INTERVAL_SEPARATORS: &[&str] = &["-", "to", "or"];

pub const NUMBER_WORDS: &[(&str, f64)] = &[
    ("one", 1.0),
    ("two", 2.0),
    ("three", 3.0),
    ("four", 4.0),
    ("five", 5.0),
    ("six", 6.0),
    ("seven", 7.0),
    ("eight", 8.0),
    ("nine", 9.0),
    ("ten", 10.0),
    ("fifteen", 15.0),
];

/// Whole-string idioms and how many seconds they stand for.
pub const APPROXIMATIONS: &[(&str, f64)] = &[
    ("seconds", 5.0),
    ("few seconds", 5.0),
    ("a few seconds", 5.0),
    ("several seconds", 10.0),
    ("a minute", 60.0),
    ("minutes", 180.0),
    ("few minutes", 180.0),
    ("a few minutes", 180.0),
    ("several minutes", 300.0),
    ("half hour", 1800.0),
    ("half an hour", 1800.0),
    ("a half hour", 1800.0),
    ("an hour", 3600.0),
    ("hours", 10800.0),
    ("few hours", 10800.0),
    ("a few hours", 10800.0),
    ("several hours", 14400.0),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn no_entry_shadowed_by_earlier_prefix(list: &[&str]) {
        for (i, later) in list.iter().enumerate() {
            for earlier in &list[..i] {
                assert!(
                    !later.starts_with(earlier) || later == earlier,
                    "{:?} can never match, {:?} comes first",
                    later,
                    earlier
                );
            }
        }
    }

    #[test]
    fn hedge_marks_ordered_longest_first() {
        no_entry_shadowed_by_earlier_prefix(HEDGE_MARKS);
    }

    #[test]
    fn number_words_ordered_longest_first() {
        let words: Vec<&str> = NUMBER_WORDS.iter().map(|(w, _)| *w).collect();
        no_entry_shadowed_by_earlier_prefix(&words);
    }

    #[test]
    fn approximation_phrases_are_normalized() {
        for (phrase, seconds) in APPROXIMATIONS {
            assert_eq!(*phrase, phrase.trim().to_lowercase());
            assert!(!phrase.contains("  "));
            assert!(*seconds > 0.0);
        }
    }
}
