use std::sync::LazyLock;

use regex::Regex;

static WELL_FORMED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9\-.,' ]*$").unwrap());

/// Only letters, digits, `-.,'` and spaces, and more than one character once trimmed.
pub fn is_well_formed(city: &str) -> bool {
    WELL_FORMED_RE.is_match(city) && city.trim().len() > 1
}

/// `"Foo (near Bar)"` -> `"Foo"`. `None` when there is no `(`.
pub fn strip_parenthetical(city: &str) -> Option<&str> {
    city.find('(').map(|i| city[..i].trim_end())
}

/// `"Foo/Bar"` -> `("Foo", "Bar")`, split at the first `/`.
pub fn split_slash(city: &str) -> Option<(&str, &str)> {
    city.split_once('/')
        .map(|(first, second)| (first.trim_end(), second.trim_start()))
}
