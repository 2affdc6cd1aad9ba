use super::{Confidence, GeoCandidate, GeoResult};

pub const US_STATES: &[(&str, &str)] = &[
    ("Alabama", "AL"),
    ("Alaska", "AK"),
    ("Arizona", "AZ"),
    ("Arkansas", "AR"),
    ("California", "CA"),
    ("Colorado", "CO"),
    ("Connecticut", "CT"),
    ("Delaware", "DE"),
    ("District of Columbia", "DC"),
    ("Florida", "FL"),
    ("Georgia", "GA"),
    ("Hawaii", "HI"),
    ("Idaho", "ID"),
    ("Illinois", "IL"),
    ("Indiana", "IN"),
    ("Iowa", "IA"),
    ("Kansas", "KS"),
    ("Kentucky", "KY"),
    ("Louisiana", "LA"),
    ("Maine", "ME"),
    ("Maryland", "MD"),
    ("Massachusetts", "MA"),
    ("Michigan", "MI"),
    ("Minnesota", "MN"),
    ("Mississippi", "MS"),
    ("Missouri", "MO"),
    ("Montana", "MT"),
    ("Nebraska", "NE"),
    ("Nevada", "NV"),
    ("New Hampshire", "NH"),
    ("New Jersey", "NJ"),
    ("New Mexico", "NM"),
    ("New York", "NY"),
    ("North Carolina", "NC"),
    ("North Dakota", "ND"),
    ("Ohio", "OH"),
    ("Oklahoma", "OK"),
    ("Oregon", "OR"),
    ("Pennsylvania", "PA"),
    ("Rhode Island", "RI"),
    ("South Carolina", "SC"),
    ("South Dakota", "SD"),
    ("Tennessee", "TN"),
    ("Texas", "TX"),
    ("Utah", "UT"),
    ("Vermont", "VT"),
    ("Virginia", "VA"),
    ("Washington", "WA"),
    ("West Virginia", "WV"),
    ("Wisconsin", "WI"),
    ("Wyoming", "WY"),
];

pub fn state_code(name: &str) -> Option<&'static str> {
    US_STATES
        .iter()
        .find(|(state, _)| state.eq_ignore_ascii_case(name))
        .map(|&(_, code)| code)
}

fn is_us(candidate: &GeoCandidate) -> bool {
    candidate.country_code.eq_ignore_ascii_case("us")
}

fn in_us_state(candidate: &GeoCandidate, region: &str) -> bool {
    is_us(candidate)
        && candidate
            .state
            .as_deref()
            .and_then(state_code)
            .is_some_and(|code| code.eq_ignore_ascii_case(region))
}

fn in_region(candidate: &GeoCandidate, region: &str) -> bool {
    candidate.country_code.eq_ignore_ascii_case(region)
        || candidate
            .state
            .as_deref()
            .is_some_and(|state| state.eq_ignore_ascii_case(region))
}

/// Pick the candidate that best fits `region`, highest tier first.
///
/// | tier | rule                                              |
/// |------|---------------------------------------------------|
/// | 3    | in the US, state name maps to `region`            |
/// | 2    | country code or state name equals `region`        |
/// | 1    | anywhere in the US                                |
/// | 0    | first candidate                                   |
/// | -1   | no candidates                                     |
pub fn rank(candidates: &[GeoCandidate], region: &str) -> GeoResult {
    if let Some(c) = candidates.iter().find(|c| in_us_state(c, region)) {
        return GeoResult::at(c, Confidence::Certain);
    }
    if let Some(c) = candidates.iter().find(|c| in_region(c, region)) {
        return GeoResult::at(c, Confidence::RegionMatch);
    }
    if let Some(c) = candidates.iter().find(|c| is_us(c)) {
        return GeoResult::at(c, Confidence::UsCity);
    }
    candidates
        .first()
        .map_or_else(GeoResult::missing, |c| GeoResult::at(c, Confidence::FirstResult))
}
